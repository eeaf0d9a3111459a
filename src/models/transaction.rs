use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Debit,
    Credit,
}

/// Append-only ledger entry. Never updated or deleted; debits carry a
/// negative amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub reseller_id: String,
    pub amount_cents: i64,
    pub kind: TransactionType,
    pub product_id: Option<String>,
    pub key_id: Option<String>,
    pub created_at: i64,
}

/// Current balance snapshot the transaction history reconciles to.
/// One row per reseller, created lazily on first debit or credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResellerBalance {
    pub reseller_id: String,
    pub balance_cents: i64,
    pub updated_at: i64,
}
