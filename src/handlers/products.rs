use axum::{Json, extract::State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::Product;

/// Storefront catalog: enabled products only.
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_products(&conn, true)?))
}
