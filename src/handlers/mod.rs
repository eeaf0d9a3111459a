//! HTTP surface: route table and handler modules.

pub mod admin;
pub mod auth;
pub mod keys;
pub mod me;
pub mod products;
pub mod reseller;

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::AppState;
use crate::middleware::require_auth;

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/me", get(me::me))
        .route("/api/me/subscriptions", get(me::my_subscriptions))
        .route("/api/products", get(products::list_products))
        .route("/api/keys/activate", post(keys::activate))
        .route("/api/invites", get(admin::list_invites).post(admin::create_invites))
        .route("/api/invites/{id}", delete(admin::delete_invite))
        .route("/api/invites/{id}/revoke", post(admin::revoke_invite))
        .route("/api/reseller/users", get(reseller::invited_users))
        .route("/api/reseller/products", get(reseller::products))
        .route("/api/reseller/keys", get(reseller::keys))
        .route("/api/reseller/balance", get(reseller::balance))
        .route("/api/reseller/transactions", get(reseller::transactions))
        .route("/api/reseller/keys/buy", post(reseller::buy))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}/block", post(admin::block_user))
        .route("/api/admin/users/{id}/unblock", post(admin::unblock_user))
        .route("/api/admin/users/{id}/role", post(admin::set_role))
        .route("/api/admin/users/{id}/password", post(admin::set_password))
        .route("/api/admin/keys/upload", post(admin::upload_keys))
        .route("/api/admin/keys/{id}", delete(admin::delete_key))
        .route("/api/admin/resellers", get(admin::list_resellers))
        .route(
            "/api/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/api/admin/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/api/admin/resellers/{id}/balance", put(admin::set_balance))
        .route("/api/admin/logs", get(admin::list_logs))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = if state.dev_mode {
        CorsLayer::very_permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/telegram/webapp", post(auth::telegram_webapp))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
