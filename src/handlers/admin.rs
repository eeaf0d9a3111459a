//! Administrative endpoints: user management, invites, key uploads,
//! product catalog, balance overrides and the audit log.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{self, AuditLog};
use crate::db::{AppState, ledger, queries};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::util;

const ADMIN: &[Role] = &[Role::Admin];

// ============ Users ============

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<User>>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_users(&conn)?))
}

async fn set_blocked(state: AppState, auth: AuthUser, id: String, blocked: bool) -> Result<()> {
    auth.require(ADMIN)?;
    if blocked && auth.id == id {
        return Err(AppError::BadRequest("Cannot block your own account".into()));
    }

    let conn = state.db.get()?;
    let user =
        queries::get_user_by_id(&conn, &id)?.ok_or_else(|| AppError::NotFound("User not found".into()))?;
    queries::set_user_blocked(&conn, &id, blocked)?;

    audit::record(
        &state,
        Some(&auth.id),
        if blocked { "user.block" } else { "user.unblock" },
        Some("user"),
        Some(&id),
        None,
    );

    // Group membership follows the block state, best-effort after commit.
    if let (Some(telegram), Some(telegram_id)) = (state.telegram.clone(), user.telegram_id) {
        tokio::spawn(async move {
            let delivered = if blocked {
                telegram.ban_in_group(&telegram_id).await
            } else {
                telegram.unban_in_group(&telegram_id).await
            };
            if !delivered {
                tracing::debug!(%telegram_id, blocked, "group membership update not delivered");
            }
        });
    }
    Ok(())
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    set_blocked(state, auth, id, true).await?;
    Ok(Json(json!({ "blocked": true })))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    set_blocked(state, auth, id, false).await?;
    Ok(Json(json!({ "blocked": false })))
}

#[derive(Debug, Serialize)]
pub struct ResellerOverview {
    #[serde(flatten)]
    pub user: User,
    pub balance_cents: i64,
}

/// Reseller accounts with their current prepaid balances.
pub async fn list_resellers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ResellerOverview>>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;

    let mut out = Vec::new();
    for user in queries::list_resellers(&conn)? {
        let balance_cents = queries::get_balance(&conn, &user.id)?
            .map(|b| b.balance_cents)
            .unwrap_or(0);
        out.push(ResellerOverview {
            user,
            balance_cents,
        });
    }
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

pub async fn set_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(input): Json<SetRoleRequest>,
) -> Result<Json<serde_json::Value>> {
    auth.require(ADMIN)?;
    if auth.id == id {
        return Err(AppError::BadRequest("Cannot change your own role".into()));
    }

    let conn = state.db.get()?;
    if !queries::set_user_role(&conn, &id, input.role)? {
        return Err(AppError::NotFound("User not found".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "user.set_role",
        Some("user"),
        Some(&id),
        Some(json!({ "role": input.role })),
    );
    Ok(Json(json!({ "role": input.role })))
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

pub async fn set_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(input): Json<SetPasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    auth.require(ADMIN)?;
    if input.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }

    let hash = util::hash_password(&input.password)?;
    let conn = state.db.get()?;
    if !queries::set_user_password(&conn, &id, &hash)? {
        return Err(AppError::NotFound("User not found".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "user.set_password",
        Some("user"),
        Some(&id),
        None,
    );
    Ok(Json(json!({ "updated": true })))
}

// ============ Invites ============

/// Admins see every invite; resellers only the ones they issued.
pub async fn list_invites(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Invite>>> {
    auth.require(&[Role::Reseller, Role::Admin])?;
    let conn = state.db.get()?;
    let invites = match auth.role {
        Role::Admin => queries::list_invites(&conn, 500)?,
        _ => queries::list_invites_by_creator(&conn, &auth.id, 500)?,
    };
    Ok(Json(invites))
}

pub async fn create_invites(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<CreateInvites>,
) -> Result<Json<Vec<Invite>>> {
    auth.require(&[Role::Reseller, Role::Admin])?;
    let conn = state.db.get()?;
    let created = queries::create_invites(&conn, &auth.id, &input)?;

    audit::record(
        &state,
        Some(&auth.id),
        "invite.create",
        None,
        None,
        Some(json!({ "count": created.len() })),
    );
    Ok(Json(created))
}

pub async fn delete_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    auth.require(&[Role::Reseller, Role::Admin])?;
    let conn = state.db.get()?;

    // Resellers may only delete invites they issued.
    let invite = queries::get_invite_by_id(&conn, &id)?
        .filter(|inv| auth.role == Role::Admin || inv.created_by == auth.id)
        .ok_or_else(|| AppError::NotFound("Invite not found".into()))?;
    if !queries::delete_invite(&conn, &invite.id)? {
        return Err(AppError::NotFound("Invite not found".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "invite.delete",
        Some("invite"),
        Some(&id),
        None,
    );
    Ok(Json(json!({ "deleted": true })))
}

/// Pull an outstanding invite without deleting its record.
pub async fn revoke_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    auth.require(&[Role::Reseller, Role::Admin])?;
    let conn = state.db.get()?;

    queries::get_invite_by_id(&conn, &id)?
        .filter(|inv| auth.role == Role::Admin || inv.created_by == auth.id)
        .ok_or_else(|| AppError::NotFound("Invite not found".into()))?;
    if !queries::revoke_invite(&conn, &id)? {
        return Err(AppError::Conflict("Invite has already been used".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "invite.revoke",
        Some("invite"),
        Some(&id),
        None,
    );
    Ok(Json(json!({ "revoked": true })))
}

// ============ Keys ============

#[derive(Debug, Deserialize)]
pub struct UploadKeysRequest {
    pub product_id: String,
    pub keys: Vec<String>,
    /// When set, keys land as Reserved stock and the owner is debited
    #[serde(default)]
    pub owner_reseller_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadKeysResponse {
    pub inserted: i64,
    pub skipped: i64,
    pub debit_cents: i64,
}

pub async fn upload_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<UploadKeysRequest>,
) -> Result<Json<UploadKeysResponse>> {
    auth.require(ADMIN)?;

    let tokens: Vec<String> = input
        .keys
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(AppError::BadRequest("No keys provided".into()));
    }

    let mut conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, &input.product_id)?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

    if let Some(owner) = input.owner_reseller_id.as_deref() {
        queries::get_user_by_id(&conn, owner)?
            .filter(|u| u.role == Role::Reseller)
            .ok_or_else(|| AppError::NotFound("Reseller not found".into()))?;
    }

    let outcome = ledger::upload_keys(
        &mut conn,
        &product,
        &tokens,
        input.owner_reseller_id.as_deref(),
    )?;

    audit::record(
        &state,
        Some(&auth.id),
        "keys.upload",
        Some("product"),
        Some(&product.id),
        Some(json!({
            "inserted": outcome.inserted,
            "owner_reseller_id": input.owner_reseller_id,
        })),
    );

    Ok(Json(UploadKeysResponse {
        inserted: outcome.inserted,
        skipped: tokens.len() as i64 - outcome.inserted,
        debit_cents: outcome.debit_cents,
    }))
}

/// Remove unsold stock. Reserved and used keys carry history and stay.
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    if !queries::delete_key(&conn, &id)? {
        return Err(AppError::NotFound("Key not found".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "key.delete",
        Some("key"),
        Some(&id),
        None,
    );
    Ok(Json(json!({ "deleted": true })))
}

// ============ Products ============

pub async fn list_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Product>>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    Ok(Json(queries::list_products(&conn, false)?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<CreateProduct>,
) -> Result<Json<Product>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    let product = queries::create_product(&conn, &input)?;

    audit::record(
        &state,
        Some(&auth.id),
        "product.create",
        Some("product"),
        Some(&product.id),
        Some(json!({ "name": product.name })),
    );
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    if !queries::update_product(&conn, &id, &input)? {
        return Err(AppError::NotFound("Product not found".into()));
    }
    let product = queries::get_product_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

    audit::record(
        &state,
        Some(&auth.id),
        "product.update",
        Some("product"),
        Some(&id),
        None,
    );
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    auth.require(ADMIN)?;
    let conn = state.db.get()?;
    if !queries::delete_product(&conn, &id)? {
        return Err(AppError::NotFound("Product not found".into()));
    }

    audit::record(
        &state,
        Some(&auth.id),
        "product.delete",
        Some("product"),
        Some(&id),
        None,
    );
    Ok(Json(json!({ "deleted": true })))
}

// ============ Balances ============

#[derive(Debug, Deserialize)]
pub struct SetBalanceRequest {
    pub balance_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct SetBalanceResponse {
    pub balance_cents: i64,
    /// Corrective ledger entry amount; 0 when the balance was unchanged
    pub delta_cents: i64,
}

pub async fn set_balance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(input): Json<SetBalanceRequest>,
) -> Result<Json<SetBalanceResponse>> {
    auth.require(ADMIN)?;

    let mut conn = state.db.get()?;
    queries::get_user_by_id(&conn, &id)?
        .filter(|u| u.role == Role::Reseller)
        .ok_or_else(|| AppError::NotFound("Reseller not found".into()))?;

    let delta = ledger::set_balance(&mut conn, &id, input.balance_cents)?;

    audit::record(
        &state,
        Some(&auth.id),
        "balance.set",
        Some("user"),
        Some(&id),
        Some(json!({ "balance_cents": input.balance_cents, "delta_cents": delta })),
    );

    Ok(Json(SetBalanceResponse {
        balance_cents: input.balance_cents,
        delta_cents: delta,
    }))
}

// ============ Audit log ============

pub async fn list_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<AuditLog>>> {
    auth.require(ADMIN)?;
    let conn = state.audit.get()?;
    Ok(Json(audit::list_recent(&conn, 200)?))
}
