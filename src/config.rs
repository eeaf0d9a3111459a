use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Secret for signing session tokens (HS256)
    pub jwt_secret: String,
    /// Bot token for the Telegram capability; None disables WebApp login
    /// and outbound notifications
    pub telegram_bot_token: Option<String>,
    /// Group chat used for ban/unban side effects
    pub telegram_group_id: Option<String>,
    pub telegram_api_base: String,
    pub dev_mode: bool,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYHUB_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            if !dev_mode {
                tracing::warn!("JWT_SECRET not set; using an insecure default");
            }
            "dev_secret_change_me".to_string()
        });

        let audit_log_enabled = env::var("AUDIT_LOG_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "keyhub.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "keyhub_audit.db".to_string()),
            jwt_secret,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok().filter(|t| !t.is_empty()),
            telegram_group_id: env::var("TELEGRAM_GROUP_ID").ok().filter(|t| !t.is_empty()),
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            dev_mode,
            audit_log_enabled,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
