//! Shared fixtures for the database tests.

use rusqlite::Connection;

use keyhub::db::{init_schema, ledger, queries};
use keyhub::models::*;

pub fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}

pub fn create_account(conn: &Connection, username: &str, role: Role) -> User {
    queries::create_user(
        conn,
        &CreateUser {
            username: username.to_string(),
            email: None,
            password_hash: None,
            role,
            telegram_id: None,
        },
    )
    .unwrap()
}

pub fn create_product(conn: &Connection, name: &str, price_cents: i64) -> Product {
    queries::create_product(
        conn,
        &CreateProduct {
            name: name.to_string(),
            price_cents,
            duration_days: 30,
            enabled: true,
        },
    )
    .unwrap()
}

/// Upload `tokens` as unowned Available stock.
pub fn upload_stock(conn: &mut Connection, product: &Product, tokens: &[&str]) {
    let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    ledger::upload_keys(conn, product, &tokens, None).unwrap();
}

pub fn key_status(conn: &Connection, token: &str) -> KeyStatus {
    queries::get_key_by_token(conn, token).unwrap().unwrap().status
}

pub fn transaction_count(conn: &Connection, reseller_id: &str) -> usize {
    queries::list_transactions_for_reseller(conn, reseller_id, 1000)
        .unwrap()
        .len()
}
