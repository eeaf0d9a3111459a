use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Integer minor-currency units (cents)
    pub price_cents: i64,
    /// Subscription length granted by one key activation
    pub duration_days: i64,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price_cents: i64,
    #[serde(default = "default_duration_days")]
    pub duration_days: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_duration_days() -> i64 {
    30
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub duration_days: Option<i64>,
    pub enabled: Option<bool>,
}
