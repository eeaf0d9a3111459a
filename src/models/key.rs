use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Lifecycle of a license key. Transitions only move forward:
/// Available -> Reserved -> Used, or Available -> Used directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
pub enum KeyStatus {
    Available,
    Reserved,
    Used,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    /// Opaque license token, immutable once created
    pub token: String,
    pub product_id: String,
    pub status: KeyStatus,
    /// Reseller holding this key while Reserved
    pub owner_reseller_id: Option<String>,
    pub used_by_user_id: Option<String>,
    pub used_at: Option<i64>,
    pub created_at: i64,
}
