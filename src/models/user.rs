use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Account role. Gates which ledger operations a caller may reach.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
pub enum Role {
    User,
    Reseller,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub blocked: bool,
    /// Linked Telegram account, unique across users
    pub telegram_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: Option<String>,
    /// Pre-hashed password; None for externally-authenticated accounts
    pub password_hash: Option<String>,
    pub role: Role,
    pub telegram_id: Option<String>,
}
