//! Row-mapping helpers shared by the query layer.
//!
//! Each model lists its column set as a `*_COLS` constant and implements
//! [`FromRow`] against that exact order, so SELECTs stay in sync with the
//! mapping in one place.

use rusqlite::{Connection, Params, Row};

use crate::error::Result;
use crate::models::*;

pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Run a query expected to yield at most one row.
pub fn query_one<T: FromRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(params, T::from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Run a query and collect all rows.
pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const USER_COLS: &str =
    "id, username, email, password_hash, role, blocked, telegram_id, created_at, updated_at";

impl FromRow for User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get::<_, String>(4)?.parse().unwrap(),
            blocked: row.get(5)?,
            telegram_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

pub const PRODUCT_COLS: &str =
    "id, name, price_cents, duration_days, enabled, created_at, updated_at";

impl FromRow for Product {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            price_cents: row.get(2)?,
            duration_days: row.get(3)?,
            enabled: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

pub const KEY_COLS: &str =
    "id, token, product_id, status, owner_reseller_id, used_by_user_id, used_at, created_at";

impl FromRow for Key {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Key {
            id: row.get(0)?,
            token: row.get(1)?,
            product_id: row.get(2)?,
            status: row.get::<_, String>(3)?.parse().unwrap(),
            owner_reseller_id: row.get(4)?,
            used_by_user_id: row.get(5)?,
            used_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

pub const INVITE_COLS: &str =
    "id, code, created_by, expires_at, used_by, used_at, revoked, created_at";

impl FromRow for Invite {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Invite {
            id: row.get(0)?,
            code: row.get(1)?,
            created_by: row.get(2)?,
            expires_at: row.get(3)?,
            used_by: row.get(4)?,
            used_at: row.get(5)?,
            revoked: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, product_id, expires_at, status, created_at, updated_at";

impl FromRow for Subscription {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            product_id: row.get(2)?,
            expires_at: row.get(3)?,
            status: row.get::<_, String>(4)?.parse().unwrap(),
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

pub const TRANSACTION_COLS: &str =
    "id, reseller_id, amount_cents, type, product_id, key_id, created_at";

impl FromRow for Transaction {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            reseller_id: row.get(1)?,
            amount_cents: row.get(2)?,
            kind: row.get::<_, String>(3)?.parse().unwrap(),
            product_id: row.get(4)?,
            key_id: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

pub const BALANCE_COLS: &str = "reseller_id, balance_cents, updated_at";

impl FromRow for ResellerBalance {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ResellerBalance {
            reseller_id: row.get(0)?,
            balance_cents: row.get(1)?,
            updated_at: row.get(2)?,
        })
    }
}
