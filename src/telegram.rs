//! Telegram capability: WebApp login verification and the outbound Bot API
//! client.
//!
//! Verification follows the documented WebApp scheme: the secret is
//! HMAC-SHA256 of the bot token keyed with the literal string "WebAppData",
//! and the delivered `hash` must match HMAC-SHA256 of the remaining fields
//! sorted by key and joined as `key=value` lines.
//! See: https://core.telegram.org/bots/webapps#validating-data-received-via-the-web-app

use std::collections::BTreeMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::OnceCell;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Parse `initData` (URL query encoding) into sorted key/value pairs.
fn parse_init_data(init_data: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for part in init_data.split('&') {
        let Some(idx) = part.find('=') else { continue };
        let key = urlencoding::decode(&part[..idx]);
        let value = urlencoding::decode(&part[idx + 1..]);
        if let (Ok(key), Ok(value)) = (key, value) {
            fields.insert(key.into_owned(), value.into_owned());
        }
    }
    fields
}

/// Verify the signature on a WebApp `initData` payload.
///
/// Exact hex match is the contract; the comparison is constant-time as a
/// hardening measure.
pub fn check_webapp_data(init_data: &str, bot_token: &str) -> bool {
    let fields = parse_init_data(init_data);
    let Some(sent_hash) = fields.get("hash") else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(b"WebAppData") else {
        return false;
    };
    mac.update(bot_token.as_bytes());
    let secret = mac.finalize().into_bytes();

    let canonical = fields
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    let Ok(mut mac) = HmacSha256::new_from_slice(&secret) else {
        return false;
    };
    mac.update(canonical.as_bytes());
    let calculated = hex::encode(mac.finalize().into_bytes());

    calculated.as_bytes().ct_eq(sent_hash.as_bytes()).into()
}

/// Identity asserted by a verified WebApp payload.
#[derive(Debug, Clone, Serialize)]
pub struct TelegramUser {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize)]
struct RawWebAppUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

/// Extract the embedded `user` identity from `initData`.
///
/// Returns None when the field is absent or malformed; callers treat that
/// as a hard registration failure, never as anonymous access.
pub fn extract_user(init_data: &str) -> Option<TelegramUser> {
    let fields = parse_init_data(init_data);
    let raw: RawWebAppUser = serde_json::from_str(fields.get("user")?).ok()?;
    Some(TelegramUser {
        id: raw.id.to_string(),
        username: raw.username,
        first_name: raw.first_name,
        last_name: raw.last_name,
    })
}

#[derive(Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Outbound Bot API client. All callers use it post-commit with best-effort
/// semantics; a delivery failure never affects committed ledger state.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    group_id: Option<String>,
    /// Cached getMe username; initialized once, then reused
    bot_username: Arc<OnceCell<String>>,
}

impl TelegramClient {
    pub fn new(api_base: &str, bot_token: &str, group_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            group_id,
            bot_username: Arc::new(OnceCell::new()),
        }
    }

    pub fn verify_init_data(&self, init_data: &str) -> bool {
        check_webapp_data(init_data, &self.bot_token)
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let response = self
            .http
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Telegram request failed: {}", e)))?;

        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Telegram response invalid: {}", e)))?;

        if !body.ok {
            return Err(AppError::Internal(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_else(|| "unknown".into())
            )));
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await?;
        Ok(())
    }

    /// Bot username from getMe, fetched once per process. `get_or_try_init`
    /// gives single-flight semantics under concurrent first access.
    pub async fn bot_username(&self) -> Result<&str> {
        let username = self
            .bot_username
            .get_or_try_init(|| async {
                let me = self.call("getMe", json!({})).await?;
                me.get("username")
                    .and_then(|u| u.as_str())
                    .map(String::from)
                    .ok_or_else(|| AppError::Internal("getMe returned no username".into()))
            })
            .await?;
        Ok(username)
    }

    /// Ban a user in the configured group. Best-effort: returns whether the
    /// ban was delivered, never an error.
    pub async fn ban_in_group(&self, telegram_id: &str) -> bool {
        let Some(group_id) = &self.group_id else {
            return false;
        };
        let user_id: i64 = match telegram_id.parse() {
            Ok(id) => id,
            Err(_) => return false,
        };
        self.call(
            "banChatMember",
            json!({ "chat_id": group_id, "user_id": user_id }),
        )
        .await
        .is_ok()
    }

    /// Lift a group ban, only if one exists. Best-effort.
    pub async fn unban_in_group(&self, telegram_id: &str) -> bool {
        let Some(group_id) = &self.group_id else {
            return false;
        };
        let user_id: i64 = match telegram_id.parse() {
            Ok(id) => id,
            Err(_) => return false,
        };
        self.call(
            "unbanChatMember",
            json!({ "chat_id": group_id, "user_id": user_id, "only_if_banned": true }),
        )
        .await
        .is_ok()
    }
}
