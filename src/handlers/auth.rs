//! Session endpoints: password login, invite-gated registration and
//! Telegram WebApp sign-in.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit;
use crate::db::{AppState, ledger, queries};
use crate::error::{AppError, Result};
use crate::jwt;
use crate::models::{CreateUser, Role, User};
use crate::telegram;
use crate::util;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub invite: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramWebAppRequest {
    pub init_data: String,
    /// Required on first sign-in; ignored for accounts already linked
    #[serde(default)]
    pub invite: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

fn session_response(state: &AppState, user: User) -> Result<Json<SessionResponse>> {
    let token = jwt::sign_session(&state.jwt_key, &user)?;
    Ok(Json(SessionResponse { token, user }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_username(&conn, &input.username)?;

    // Verify even when the user is missing so response timing does not
    // reveal which usernames exist.
    let hash = user
        .as_ref()
        .and_then(|u| u.password_hash.as_deref())
        .unwrap_or("$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
    let valid = util::verify_password(&input.password, hash);

    let user = match user {
        Some(u) if valid && u.password_hash.is_some() => u,
        _ => return Err(AppError::Unauthorized),
    };
    if user.blocked {
        return Err(AppError::Forbidden("Account is blocked".into()));
    }

    session_response(&state, user)
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<Json<SessionResponse>> {
    let username = input.username.trim();
    if username.len() < 3 || username.len() > 64 {
        return Err(AppError::BadRequest(
            "Username must be between 3 and 64 characters".into(),
        ));
    }
    if input.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }

    let password_hash = util::hash_password(&input.password)?;
    let create = CreateUser {
        username: username.to_string(),
        email: input.email.clone(),
        password_hash: Some(password_hash),
        role: Role::User,
        telegram_id: None,
    };

    let mut conn = state.db.get()?;
    let (user, invite) =
        ledger::redeem_invite(&mut conn, input.invite.trim(), |tx| {
            queries::create_user(tx, &create)
        })?;

    audit::record(
        &state,
        Some(&user.id),
        "user.register",
        Some("invite"),
        Some(&invite.id),
        Some(json!({ "username": user.username })),
    );

    session_response(&state, user)
}

pub async fn telegram_webapp(
    State(state): State<AppState>,
    Json(input): Json<TelegramWebAppRequest>,
) -> Result<Json<SessionResponse>> {
    let telegram = state.telegram()?;
    if !telegram.verify_init_data(&input.init_data) {
        return Err(AppError::SignatureInvalid);
    }

    let tg = telegram::extract_user(&input.init_data)
        .ok_or_else(|| AppError::BadRequest("Payload carries no Telegram user".into()))?;

    let mut conn = state.db.get()?;
    if let Some(user) = queries::get_user_by_telegram_id(&conn, &tg.id)? {
        if user.blocked {
            return Err(AppError::Forbidden("Account is blocked".into()));
        }
        return session_response(&state, user);
    }

    // First sign-in from this Telegram account; registration stays
    // invite-gated even on this path.
    let code = input
        .invite
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Forbidden("An invite is required to register".into()))?;

    let username = match &tg.username {
        Some(name) => format!("tg_{}", name),
        None => format!("tg_{}", tg.id),
    };
    let create = CreateUser {
        username,
        email: None,
        password_hash: None,
        role: Role::User,
        telegram_id: Some(tg.id.clone()),
    };

    let (user, invite) =
        ledger::redeem_invite(&mut conn, code, |tx| queries::create_user(tx, &create))?;

    audit::record(
        &state,
        Some(&user.id),
        "user.register_telegram",
        Some("invite"),
        Some(&invite.id),
        Some(json!({ "telegram_id": tg.id })),
    );

    session_response(&state, user)
}
