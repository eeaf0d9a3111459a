use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

/// Per-(user, product) entitlement. Unique on that pair; re-activation
/// overwrites `expires_at` rather than stacking rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub expires_at: i64,
    pub status: SubscriptionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    /// "Active" is derived, never stored.
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at > now && self.status == SubscriptionStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionWithProduct {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub product_name: String,
    pub active: bool,
}
