//! Storage layer: pooled SQLite connections, schema setup and shared state.
//!
//! Main and audit data live in separate database files with separate pools,
//! so a slow audit write can never hold the ledger lock.

pub mod from_row;
pub mod ledger;
pub mod queries;

use std::sync::Arc;

use jwt_simple::algorithms::HS256Key;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;
use crate::telegram::TelegramClient;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub audit: DbPool,
    pub jwt_key: Arc<HS256Key>,
    /// Telegram capability; None when no bot token is configured.
    /// Operations that need it return `Unavailable` instead of probing the
    /// environment at call sites.
    pub telegram: Option<TelegramClient>,
    pub audit_log_enabled: bool,
    pub dev_mode: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = open_pool(&config.database_path)?;
        let audit = open_pool(&config.audit_database_path)?;

        init_schema(&*db.get()?)?;
        init_audit_schema(&*audit.get()?)?;

        let telegram = config
            .telegram_bot_token
            .as_ref()
            .map(|token| TelegramClient::new(&config.telegram_api_base, token, config.telegram_group_id.clone()));

        Ok(Self {
            db,
            audit,
            jwt_key: Arc::new(HS256Key::from_bytes(config.jwt_secret.as_bytes())),
            telegram,
            audit_log_enabled: config.audit_log_enabled,
            dev_mode: config.dev_mode,
        })
    }

    /// The Telegram capability, or `Unavailable` when not configured.
    pub fn telegram(&self) -> Result<&TelegramClient> {
        self.telegram
            .as_ref()
            .ok_or_else(|| crate::error::AppError::Unavailable("Telegram is not configured".into()))
    }
}

fn open_pool(path: &str) -> anyhow::Result<DbPool> {
    // WAL for concurrent readers; busy_timeout so contending writers queue
    // behind the Immediate-transaction lock instead of failing immediately.
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });
    Ok(Pool::new(manager)?)
}

/// Create the main schema. Idempotent.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT,
            password_hash TEXT,
            role          TEXT NOT NULL DEFAULT 'User',
            blocked       INTEGER NOT NULL DEFAULT 0,
            telegram_id   TEXT UNIQUE,
            created_at    INTEGER NOT NULL,
            updated_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL UNIQUE,
            price_cents   INTEGER NOT NULL,
            duration_days INTEGER NOT NULL,
            enabled       INTEGER NOT NULL DEFAULT 1,
            created_at    INTEGER NOT NULL,
            updated_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keys (
            id                TEXT PRIMARY KEY,
            token             TEXT NOT NULL UNIQUE,
            product_id        TEXT NOT NULL REFERENCES products(id),
            status            TEXT NOT NULL DEFAULT 'Available',
            owner_reseller_id TEXT REFERENCES users(id),
            used_by_user_id   TEXT REFERENCES users(id),
            used_at           INTEGER,
            created_at        INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_keys_product_status ON keys(product_id, status);

        CREATE TABLE IF NOT EXISTS reseller_balances (
            reseller_id   TEXT PRIMARY KEY REFERENCES users(id),
            balance_cents INTEGER NOT NULL DEFAULT 0,
            updated_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id           TEXT PRIMARY KEY,
            reseller_id  TEXT NOT NULL REFERENCES users(id),
            amount_cents INTEGER NOT NULL,
            type         TEXT NOT NULL,
            product_id   TEXT REFERENCES products(id),
            key_id       TEXT REFERENCES keys(id),
            created_at   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_reseller ON transactions(reseller_id);

        CREATE TABLE IF NOT EXISTS invites (
            id         TEXT PRIMARY KEY,
            code       TEXT NOT NULL UNIQUE,
            created_by TEXT NOT NULL REFERENCES users(id),
            expires_at INTEGER,
            used_by    TEXT REFERENCES users(id),
            used_at    INTEGER,
            revoked    INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            expires_at INTEGER NOT NULL,
            status     TEXT NOT NULL DEFAULT 'ACTIVE',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(user_id, product_id)
        );",
    )?;
    Ok(())
}

/// Create the audit schema. Idempotent.
pub fn init_audit_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id          TEXT PRIMARY KEY,
            actor_id    TEXT,
            action      TEXT NOT NULL,
            target_type TEXT,
            target_id   TEXT,
            metadata    TEXT,
            created_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at);",
    )?;
    Ok(())
}
