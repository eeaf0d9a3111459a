use chrono::Utc;
use rand::RngCore;
use rusqlite::{Connection, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    INVITE_COLS, KEY_COLS, PRODUCT_COLS, SUBSCRIPTION_COLS, TRANSACTION_COLS, USER_COLS,
    query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Map a unique-constraint violation to `Conflict`; everything else stays a
/// storage error.
fn map_unique_violation(err: rusqlite::Error, message: &str) -> AppError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(message.to_string())
        }
        _ => err.into(),
    }
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
        }
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        self.fields.push(("updated_at", now().into()));
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Users ============

/// Create a user. A username or telegram_id collision is a `Conflict`.
pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, role, blocked, telegram_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
        params![
            &id,
            &input.username,
            &input.email,
            &input.password_hash,
            input.role.as_ref(),
            &input.telegram_id,
            now,
            now
        ],
    )
    .map_err(|e| map_unique_violation(e, "Username or Telegram account already taken"))?;

    Ok(User {
        id,
        username: input.username.clone(),
        email: input.email.clone(),
        password_hash: input.password_hash.clone(),
        role: input.role,
        blocked: false,
        telegram_id: input.telegram_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE username = ?1", USER_COLS),
        &[&username],
    )
}

pub fn get_user_by_telegram_id(conn: &Connection, telegram_id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLS),
        &[&telegram_id],
    )
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    query_all(
        conn,
        &format!("SELECT {} FROM users ORDER BY created_at DESC", USER_COLS),
        [],
    )
}

/// Users registered through invites issued by `created_by` (a reseller's
/// customer list).
pub fn list_invited_users(conn: &Connection, created_by: &str) -> Result<Vec<User>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM users u
             WHERE u.id IN (SELECT used_by FROM invites WHERE created_by = ?1 AND used_by IS NOT NULL)
             ORDER BY u.created_at DESC",
            USER_COLS
        ),
        &[&created_by],
    )
}

pub fn set_user_blocked(conn: &Connection, id: &str, blocked: bool) -> Result<bool> {
    UpdateBuilder::new("users", id)
        .set("blocked", blocked as i32)
        .execute(conn)
}

pub fn set_user_role(conn: &Connection, id: &str, role: Role) -> Result<bool> {
    UpdateBuilder::new("users", id)
        .set("role", role.as_ref().to_string())
        .execute(conn)
}

pub fn set_user_password(conn: &Connection, id: &str, password_hash: &str) -> Result<bool> {
    UpdateBuilder::new("users", id)
        .set("password_hash", password_hash.to_string())
        .execute(conn)
}

pub fn list_resellers(conn: &Connection) -> Result<Vec<User>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM users WHERE role = 'Reseller' ORDER BY created_at DESC",
            USER_COLS
        ),
        [],
    )
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    if input.price_cents < 0 {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }
    if input.duration_days < 1 {
        return Err(AppError::BadRequest("Duration must be at least one day".into()));
    }

    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO products (id, name, price_cents, duration_days, enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            &input.name,
            input.price_cents,
            input.duration_days,
            input.enabled as i32,
            now,
            now
        ],
    )
    .map_err(|e| map_unique_violation(e, "Product name already exists"))?;

    Ok(Product {
        id,
        name: input.name.clone(),
        price_cents: input.price_cents,
        duration_days: input.duration_days,
        enabled: input.enabled,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn list_products(conn: &Connection, enabled_only: bool) -> Result<Vec<Product>> {
    if enabled_only {
        query_all(
            conn,
            &format!(
                "SELECT {} FROM products WHERE enabled = 1 ORDER BY created_at ASC",
                PRODUCT_COLS
            ),
            [],
        )
    } else {
        query_all(
            conn,
            &format!("SELECT {} FROM products ORDER BY created_at ASC", PRODUCT_COLS),
            [],
        )
    }
}

pub fn update_product(conn: &Connection, id: &str, input: &UpdateProduct) -> Result<bool> {
    if matches!(input.price_cents, Some(p) if p < 0) {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }
    if matches!(input.duration_days, Some(d) if d < 1) {
        return Err(AppError::BadRequest("Duration must be at least one day".into()));
    }
    UpdateBuilder::new("products", id)
        .set_opt("name", input.name.clone())
        .set_opt("price_cents", input.price_cents)
        .set_opt("duration_days", input.duration_days)
        .set_opt("enabled", input.enabled.map(|e| e as i32))
        .execute(conn)
}

/// Delete a product, blocked while any key or subscription references it.
/// Disabling is the supported way to retire a product with history.
pub fn delete_product(conn: &Connection, id: &str) -> Result<bool> {
    let referenced: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM keys WHERE product_id = ?1)
              + (SELECT COUNT(*) FROM subscriptions WHERE product_id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if referenced > 0 {
        return Err(AppError::Conflict(
            "Product is referenced by keys or subscriptions; disable it instead".into(),
        ));
    }
    let deleted = conn.execute("DELETE FROM products WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ Keys ============

pub fn get_key_by_token(conn: &Connection, token: &str) -> Result<Option<Key>> {
    query_one(
        conn,
        &format!("SELECT {} FROM keys WHERE token = ?1", KEY_COLS),
        &[&token],
    )
}

pub fn count_available_keys(conn: &Connection, product_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM keys WHERE product_id = ?1 AND status = 'Available'",
        params![product_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn count_reserved_keys(conn: &Connection, product_id: &str, reseller_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM keys
         WHERE product_id = ?1 AND owner_reseller_id = ?2 AND status = 'Reserved'",
        params![product_id, reseller_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn list_keys_for_reseller(conn: &Connection, reseller_id: &str) -> Result<Vec<Key>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM keys WHERE owner_reseller_id = ?1 ORDER BY rowid ASC",
            KEY_COLS
        ),
        &[&reseller_id],
    )
}

/// Administrative cleanup. Only never-reserved (Available) keys may be
/// deleted; anything else carries history.
pub fn delete_key(conn: &Connection, id: &str) -> Result<bool> {
    let key: Option<Key> = query_one(
        conn,
        &format!("SELECT {} FROM keys WHERE id = ?1", KEY_COLS),
        &[&id],
    )?;
    let Some(key) = key else {
        return Ok(false);
    };
    if key.status != KeyStatus::Available {
        return Err(AppError::Conflict("Key has been reserved or used".into()));
    }
    let deleted = conn.execute(
        "DELETE FROM keys WHERE id = ?1 AND status = 'Available'",
        params![id],
    )?;
    Ok(deleted > 0)
}

// ============ Invites ============

fn random_invite_code() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Bulk-create invites, best-effort: a code collision skips that code
/// without aborting the rest. Returns the invites actually created.
pub fn create_invites(
    conn: &Connection,
    created_by: &str,
    input: &CreateInvites,
) -> Result<Vec<Invite>> {
    let expires_at = input.expires_days.map(|days| now() + days * 86400);

    let codes: Vec<String> = match &input.codes {
        Some(codes) if !codes.is_empty() => codes.clone(),
        _ => {
            let n = input.count.unwrap_or(1).min(1000);
            (0..n).map(|_| random_invite_code()).collect()
        }
    };

    let ts = now();
    let mut created = Vec::new();
    for code in codes {
        let id = gen_id();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO invites (id, code, created_by, expires_at, revoked, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![&id, &code, created_by, expires_at, ts],
        )?;
        if changed > 0 {
            created.push(Invite {
                id,
                code,
                created_by: created_by.to_string(),
                expires_at,
                used_by: None,
                used_at: None,
                revoked: false,
                created_at: ts,
            });
        }
    }
    Ok(created)
}

pub fn get_invite_by_id(conn: &Connection, id: &str) -> Result<Option<Invite>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invites WHERE id = ?1", INVITE_COLS),
        &[&id],
    )
}

pub fn get_invite_by_code(conn: &Connection, code: &str) -> Result<Option<Invite>> {
    query_one(
        conn,
        &format!("SELECT {} FROM invites WHERE code = ?1", INVITE_COLS),
        &[&code],
    )
}

pub fn list_invites(conn: &Connection, limit: i64) -> Result<Vec<Invite>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM invites ORDER BY created_at DESC LIMIT ?1",
            INVITE_COLS
        ),
        params![limit],
    )
}

pub fn list_invites_by_creator(
    conn: &Connection,
    created_by: &str,
    limit: i64,
) -> Result<Vec<Invite>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM invites WHERE created_by = ?1 ORDER BY created_at DESC LIMIT ?2",
            INVITE_COLS
        ),
        params![created_by, limit],
    )
}

pub fn revoke_invite(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE invites SET revoked = 1 WHERE id = ?1 AND used_by IS NULL",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Administrative cleanup. A used invite is history and cannot be deleted.
pub fn delete_invite(conn: &Connection, id: &str) -> Result<bool> {
    let invite: Option<Invite> = query_one(
        conn,
        &format!("SELECT {} FROM invites WHERE id = ?1", INVITE_COLS),
        &[&id],
    )?;
    let Some(invite) = invite else {
        return Ok(false);
    };
    if invite.used_by.is_some() {
        return Err(AppError::Conflict("Invite has already been used".into()));
    }
    let deleted = conn.execute(
        "DELETE FROM invites WHERE id = ?1 AND used_by IS NULL",
        params![id],
    )?;
    Ok(deleted > 0)
}

// ============ Balances ============

pub fn get_balance(conn: &Connection, reseller_id: &str) -> Result<Option<ResellerBalance>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM reseller_balances WHERE reseller_id = ?1",
            super::from_row::BALANCE_COLS
        ),
        &[&reseller_id],
    )
}

// ============ Transactions ============

pub fn list_transactions_for_reseller(
    conn: &Connection,
    reseller_id: &str,
    limit: i64,
) -> Result<Vec<Transaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE reseller_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            TRANSACTION_COLS
        ),
        params![reseller_id, limit],
    )
}

// ============ Subscriptions ============

pub fn get_subscription(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 AND product_id = ?2",
            SUBSCRIPTION_COLS
        ),
        params![user_id, product_id],
    )
}

pub fn list_subscriptions_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<SubscriptionWithProduct>> {
    let rows: Vec<(Subscription, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, p.name FROM subscriptions s
             JOIN products p ON p.id = s.product_id
             WHERE s.user_id = ?1
             ORDER BY s.expires_at DESC",
            SUBSCRIPTION_COLS
                .split(", ")
                .map(|c| format!("s.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;
        stmt.query_map([&user_id], |row| {
            Ok((
                Subscription {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    product_id: row.get(2)?,
                    expires_at: row.get(3)?,
                    status: row.get::<_, String>(4)?.parse().unwrap(),
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                },
                row.get(7)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
    };

    let ts = now();
    Ok(rows
        .into_iter()
        .map(|(subscription, product_name)| {
            let active = subscription.is_active(ts);
            SubscriptionWithProduct {
                subscription,
                product_name,
                active,
            }
        })
        .collect())
}
