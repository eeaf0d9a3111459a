//! Reseller endpoints: customer list, stock view, balance and prepaid
//! key purchases.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit;
use crate::db::{AppState, ledger, queries};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{Key, Role, Transaction, User};

const RESELLER_ROLES: &[Role] = &[Role::Reseller, Role::Admin];

#[derive(Debug, Serialize)]
pub struct ResellerProduct {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: i64,
    /// Keys in the shared pool, purchasable right now
    pub available: i64,
    /// Keys this reseller already holds
    pub reserved: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub tokens: Vec<String>,
    pub balance_cents: i64,
}

/// Users who registered through this reseller's invites.
pub async fn invited_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<User>>> {
    auth.require(RESELLER_ROLES)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_invited_users(&conn, &auth.id)?))
}

/// Catalog with per-product stock counts from this reseller's perspective.
pub async fn products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ResellerProduct>>> {
    auth.require(RESELLER_ROLES)?;
    let conn = state.db.get()?;

    let mut out = Vec::new();
    for product in queries::list_products(&conn, true)? {
        let available = queries::count_available_keys(&conn, &product.id)?;
        let reserved = queries::count_reserved_keys(&conn, &product.id, &auth.id)?;
        out.push(ResellerProduct {
            id: product.id,
            name: product.name,
            price_cents: product.price_cents,
            duration_days: product.duration_days,
            available,
            reserved,
        });
    }
    Ok(Json(out))
}

/// Keys this reseller holds, in allocation order.
pub async fn keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Key>>> {
    auth.require(RESELLER_ROLES)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_keys_for_reseller(&conn, &auth.id)?))
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>> {
    auth.require(RESELLER_ROLES)?;
    let conn = state.db.get()?;
    Ok(Json(BalanceResponse {
        balance_cents: ledger::current_balance(&conn, &auth.id)?,
    }))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Transaction>>> {
    auth.require(RESELLER_ROLES)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_transactions_for_reseller(
        &conn, &auth.id, 100,
    )?))
}

/// Buy keys against the prepaid balance. All-or-nothing per batch.
pub async fn buy(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<BuyRequest>,
) -> Result<Json<BuyResponse>> {
    auth.require(RESELLER_ROLES)?;

    let mut conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, &input.product_id)?
        .filter(|p| p.enabled)
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

    let tokens = ledger::buy_keys(&mut conn, &auth.id, &product, input.quantity)?;
    let balance_cents = ledger::current_balance(&conn, &auth.id)?;

    audit::record(
        &state,
        Some(&auth.id),
        "keys.buy",
        Some("product"),
        Some(&product.id),
        Some(json!({ "quantity": input.quantity, "total_cents": product.price_cents * input.quantity as i64 })),
    );

    Ok(Json(BuyResponse {
        tokens,
        balance_cents,
    }))
}
