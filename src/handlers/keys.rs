use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit;
use crate::db::{AppState, ledger};
use crate::error::Result;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub key: String,
    /// When present, the key must belong to this product
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub product_id: String,
    pub expires_at: i64,
}

/// Redeem a license key into a subscription for the caller.
pub async fn activate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>> {
    let mut conn = state.db.get()?;
    let outcome = ledger::activate_key(
        &mut conn,
        input.key.trim(),
        &auth.id,
        input.product_id.as_deref(),
    )?;

    audit::record(
        &state,
        Some(&auth.id),
        "key.activate",
        Some("key"),
        Some(&outcome.key_id),
        Some(json!({ "product_id": outcome.product_id, "expires_at": outcome.expires_at })),
    );

    Ok(Json(ActivateResponse {
        product_id: outcome.product_id,
        expires_at: outcome.expires_at,
    }))
}
