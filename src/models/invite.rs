use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub code: String,
    pub created_by: String,
    pub expires_at: Option<i64>,
    pub used_by: Option<String>,
    pub used_at: Option<i64>,
    pub revoked: bool,
    pub created_at: i64,
}

impl Invite {
    /// Valid iff not revoked, not used, and not past its expiry.
    pub fn is_valid(&self, now: i64) -> bool {
        !self.revoked
            && self.used_by.is_none()
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// Input for bulk invite creation: either explicit codes or a count of
/// random codes to generate.
#[derive(Debug, Deserialize)]
pub struct CreateInvites {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub codes: Option<Vec<String>>,
    #[serde(default)]
    pub expires_days: Option<i64>,
}
