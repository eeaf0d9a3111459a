//! Atomic inventory and ledger operations.
//!
//! Every operation here touches more than one row (keys + balance,
//! invite + user, key + subscription) and therefore runs inside a single
//! IMMEDIATE transaction: the write lock is taken up front, so a
//! check-then-write sequence can never interleave with a concurrent writer.
//! Dropping the transaction on an error path rolls the whole unit back.
//!
//! # PostgreSQL Migration Note
//! When migrating to PostgreSQL, add `FOR UPDATE` to the balance and key
//! SELECTs to get the same row-level locking. SQLite's IMMEDIATE transaction
//! provides this implicitly by serializing all writes.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{INVITE_COLS, KEY_COLS, SUBSCRIPTION_COLS, query_all, query_one};

const SECONDS_PER_DAY: i64 = 86400;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Result of a bulk key upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadOutcome {
    /// Keys actually inserted (duplicate tokens are skipped, not errors)
    pub inserted: i64,
    /// Aggregate debit applied to the owning reseller, 0 when none
    pub debit_cents: i64,
}

/// Result of a successful key activation.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub key_id: String,
    pub product_id: String,
    pub expires_at: i64,
}

/// Current balance for a reseller, defaulting to 0 when no row exists yet.
pub fn current_balance(conn: &Connection, reseller_id: &str) -> Result<i64> {
    let balance: Option<i64> = conn
        .query_row(
            "SELECT balance_cents FROM reseller_balances WHERE reseller_id = ?1",
            params![reseller_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0))
}

/// Check-and-apply a debit against a reseller balance.
///
/// Composable: callers run this inside their own IMMEDIATE transaction so
/// the balance check and the inventory mutation succeed or fail together.
/// Does not append a ledger entry; see [`append_transaction`].
pub fn ensure_debit(conn: &Connection, reseller_id: &str, amount_cents: i64) -> Result<i64> {
    let balance = current_balance(conn, reseller_id)?;
    let new_balance = balance - amount_cents;
    if new_balance < 0 {
        return Err(AppError::InsufficientFunds);
    }
    conn.execute(
        "INSERT INTO reseller_balances (reseller_id, balance_cents, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(reseller_id) DO UPDATE
             SET balance_cents = excluded.balance_cents, updated_at = excluded.updated_at",
        params![reseller_id, new_balance, now()],
    )?;
    Ok(new_balance)
}

/// Append one entry to the append-only transaction ledger.
pub fn append_transaction(
    conn: &Connection,
    reseller_id: &str,
    amount_cents: i64,
    kind: TransactionType,
    product_id: Option<&str>,
    key_id: Option<&str>,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO transactions (id, reseller_id, amount_cents, type, product_id, key_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![&id, reseller_id, amount_cents, kind.as_ref(), product_id, key_id, now()],
    )?;
    Ok(id)
}

/// Standalone debit: balance check, balance write and DEBIT ledger entry as
/// one atomic unit. Fails `InsufficientFunds` without touching anything.
pub fn debit(
    conn: &mut Connection,
    reseller_id: &str,
    amount_cents: i64,
    product_id: Option<&str>,
    key_id: Option<&str>,
) -> Result<i64> {
    if amount_cents <= 0 {
        return Err(AppError::BadRequest("Debit amount must be positive".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let new_balance = ensure_debit(&tx, reseller_id, amount_cents)?;
    append_transaction(&tx, reseller_id, -amount_cents, TransactionType::Debit, product_id, key_id)?;
    tx.commit()?;
    Ok(new_balance)
}

/// Administrative balance override.
///
/// Unconditionally sets the balance, but still appends a corrective ledger
/// entry for the delta so the transaction history reconciles to the
/// snapshot even for out-of-band adjustments.
pub fn set_balance(conn: &mut Connection, reseller_id: &str, new_balance: i64) -> Result<i64> {
    if new_balance < 0 {
        return Err(AppError::BadRequest("Balance cannot be negative".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = current_balance(&tx, reseller_id)?;
    let delta = new_balance - current;
    tx.execute(
        "INSERT INTO reseller_balances (reseller_id, balance_cents, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(reseller_id) DO UPDATE
             SET balance_cents = excluded.balance_cents, updated_at = excluded.updated_at",
        params![reseller_id, new_balance, now()],
    )?;
    if delta != 0 {
        let kind = if delta < 0 { TransactionType::Debit } else { TransactionType::Credit };
        append_transaction(&tx, reseller_id, delta, kind, None, None)?;
    }
    tx.commit()?;
    Ok(delta)
}

/// Bulk-insert key tokens for a product.
///
/// Duplicate tokens (already present or repeated in the input) are silently
/// skipped. When `owner_reseller_id` is given the keys insert as Reserved
/// and a single aggregate debit of `inserted x price` is checked and applied
/// in the same transaction; insufficient balance aborts the whole upload,
/// leaving no keys behind.
pub fn upload_keys(
    conn: &mut Connection,
    product: &Product,
    tokens: &[String],
    owner_reseller_id: Option<&str>,
) -> Result<UploadOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let status = match owner_reseller_id {
        Some(_) => KeyStatus::Reserved,
        None => KeyStatus::Available,
    };

    let ts = now();
    let mut inserted: i64 = 0;
    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let changed = tx.execute(
            "INSERT OR IGNORE INTO keys (id, token, product_id, status, owner_reseller_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![gen_id(), token, &product.id, status.as_ref(), owner_reseller_id, ts],
        )?;
        inserted += changed as i64;
    }

    let mut debit_cents = 0;
    if let Some(reseller_id) = owner_reseller_id {
        if inserted > 0 {
            debit_cents = inserted * product.price_cents;
            ensure_debit(&tx, reseller_id, debit_cents)?;
            append_transaction(
                &tx,
                reseller_id,
                -debit_cents,
                TransactionType::Debit,
                Some(&product.id),
                None,
            )?;
        }
    }

    tx.commit()?;
    Ok(UploadOutcome { inserted, debit_cents })
}

/// Reserve `quantity` keys for a reseller, oldest stock first.
///
/// All-or-nothing: fewer Available keys than requested fails the whole
/// batch, and the aggregate debit is checked and applied exactly once
/// alongside the reservations. One DEBIT ledger entry is appended per key.
pub fn buy_keys(
    conn: &mut Connection,
    reseller_id: &str,
    product: &Product,
    quantity: u32,
) -> Result<Vec<String>> {
    if quantity == 0 {
        return Err(AppError::BadRequest("Quantity must be at least 1".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Oldest first: rowid is insertion order, which keeps allocation
    // deterministic and stops older stock from being skipped.
    let keys: Vec<Key> = query_all(
        &tx,
        &format!(
            "SELECT {} FROM keys WHERE product_id = ?1 AND status = 'Available'
             ORDER BY rowid ASC LIMIT ?2",
            KEY_COLS
        ),
        params![&product.id, quantity as i64],
    )?;

    if keys.len() < quantity as usize {
        return Err(AppError::NotFound(format!(
            "Not enough keys available ({}/{})",
            keys.len(),
            quantity
        )));
    }

    let total = product.price_cents * quantity as i64;
    ensure_debit(&tx, reseller_id, total)?;

    for key in &keys {
        tx.execute(
            "UPDATE keys SET status = 'Reserved', owner_reseller_id = ?1
             WHERE id = ?2 AND status = 'Available'",
            params![reseller_id, &key.id],
        )?;
        append_transaction(
            &tx,
            reseller_id,
            -product.price_cents,
            TransactionType::Debit,
            Some(&product.id),
            Some(&key.id),
        )?;
    }

    tx.commit()?;
    Ok(keys.into_iter().map(|k| k.token).collect())
}

/// Consume a key into a subscription for `user_id`.
///
/// Marks the key Used and upserts the (user, product) subscription to
/// `now + product.duration_days` in one transaction; a failure on either
/// write leaves the key unconsumed.
pub fn activate_key(
    conn: &mut Connection,
    token: &str,
    user_id: &str,
    expected_product_id: Option<&str>,
) -> Result<ActivationOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let key: Key = query_one(
        &tx,
        &format!("SELECT {} FROM keys WHERE token = ?1", KEY_COLS),
        &[&token],
    )?
    .ok_or_else(|| AppError::NotFound("Key not found".into()))?;

    if key.status == KeyStatus::Used {
        return Err(AppError::Conflict("Key has already been used".into()));
    }
    if let Some(expected) = expected_product_id {
        if expected != key.product_id {
            return Err(AppError::BadRequest("Key belongs to a different product".into()));
        }
    }

    let product: Option<Product> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM products WHERE id = ?1",
            super::from_row::PRODUCT_COLS
        ),
        &[&key.product_id],
    )?;
    let product = match product {
        Some(p) if p.enabled => p,
        _ => return Err(AppError::BadRequest("Product is disabled".into())),
    };

    let ts = now();
    let expires_at = ts + product.duration_days * SECONDS_PER_DAY;

    tx.execute(
        "UPDATE keys SET status = 'Used', used_by_user_id = ?1, used_at = ?2 WHERE id = ?3",
        params![user_id, ts, &key.id],
    )?;
    upsert_activation(&tx, user_id, &key.product_id, expires_at)?;

    tx.commit()?;
    Ok(ActivationOutcome {
        key_id: key.id,
        product_id: key.product_id,
        expires_at,
    })
}

/// Upsert the (user, product) subscription row to a new expiry.
///
/// Repeat activation overwrites `expires_at` rather than stacking; the row
/// id is stable across re-activations.
pub fn upsert_activation(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    expires_at: i64,
) -> Result<Subscription> {
    let ts = now();
    conn.execute(
        "INSERT INTO subscriptions (id, user_id, product_id, expires_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'ACTIVE', ?5, ?5)
         ON CONFLICT(user_id, product_id) DO UPDATE
             SET expires_at = excluded.expires_at,
                 status = 'ACTIVE',
                 updated_at = excluded.updated_at",
        params![gen_id(), user_id, product_id, expires_at, ts],
    )?;

    let sub: Option<Subscription> = query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 AND product_id = ?2",
            SUBSCRIPTION_COLS
        ),
        params![user_id, product_id],
    )?;
    sub.ok_or_else(|| AppError::Internal("Subscription upsert lost".into()))
}

/// Redeem an invite code, creating the new user inside the same transaction.
///
/// Validity checks run in precedence order: not found, revoked, already
/// used, expired. `factory` creates the user record; if it fails (e.g. a
/// username uniqueness violation) the transaction is dropped and the invite
/// stays unconsumed.
pub fn redeem_invite<F>(conn: &mut Connection, code: &str, factory: F) -> Result<(User, Invite)>
where
    F: FnOnce(&Connection) -> Result<User>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let invite: Invite = query_one(
        &tx,
        &format!("SELECT {} FROM invites WHERE code = ?1", INVITE_COLS),
        &[&code],
    )?
    .ok_or_else(|| AppError::NotFound("Invite not found".into()))?;

    if invite.revoked {
        return Err(AppError::Gone("Invite has been revoked".into()));
    }
    if invite.used_by.is_some() {
        return Err(AppError::Conflict("Invite has already been used".into()));
    }
    let ts = now();
    if let Some(expires_at) = invite.expires_at {
        if expires_at <= ts {
            return Err(AppError::Gone("Invite has expired".into()));
        }
    }

    let user = factory(&tx)?;

    tx.execute(
        "UPDATE invites SET used_by = ?1, used_at = ?2 WHERE id = ?3 AND used_by IS NULL",
        params![&user.id, ts, &invite.id],
    )?;
    tx.commit()?;

    let invite = Invite {
        used_by: Some(user.id.clone()),
        used_at: Some(ts),
        ..invite
    };
    Ok((user, invite))
}
