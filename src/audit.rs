//! Fire-and-forget audit sink.
//!
//! Writes go to the separate audit database after the ledger transaction
//! has committed, off the request path. Semantics are at-most-one-attempt:
//! a failed write is logged and discarded, never retried, and never rolls
//! anything back.

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::Serialize;
use uuid::Uuid;

use crate::db::AppState;
use crate::db::from_row::FromRow;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub id: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

pub const AUDIT_LOG_COLS: &str =
    "id, actor_id, action, target_type, target_id, metadata, created_at";

impl FromRow for AuditLog {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get(5)?;
        Ok(AuditLog {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            action: row.get(2)?,
            target_type: row.get(3)?,
            target_id: row.get(4)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get(6)?,
        })
    }
}

/// Record an audit entry for a committed mutation.
pub fn record(
    state: &AppState,
    actor_id: Option<&str>,
    action: &str,
    target_type: Option<&str>,
    target_id: Option<&str>,
    metadata: Option<serde_json::Value>,
) {
    if !state.audit_log_enabled {
        return;
    }

    let pool = state.audit.clone();
    let actor_id = actor_id.map(String::from);
    let action = action.to_string();
    let target_type = target_type.map(String::from);
    let target_id = target_id.map(String::from);

    tokio::task::spawn_blocking(move || {
        let result = pool.get().map_err(anyhow::Error::from).and_then(|conn| {
            insert(&conn, actor_id.as_deref(), &action, target_type.as_deref(), target_id.as_deref(), metadata.as_ref())
                .map_err(anyhow::Error::from)
        });
        if let Err(e) = result {
            tracing::debug!(error = %e, "audit write dropped");
        }
    });
}

fn insert(
    conn: &Connection,
    actor_id: Option<&str>,
    action: &str,
    target_type: Option<&str>,
    target_id: Option<&str>,
    metadata: Option<&serde_json::Value>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_logs (id, actor_id, action, target_type, target_id, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Uuid::new_v4().to_string(),
            actor_id,
            action,
            target_type,
            target_id,
            metadata.map(|m| m.to_string()),
            Utc::now().timestamp()
        ],
    )?;
    Ok(())
}

pub fn list_recent(conn: &Connection, limit: i64) -> Result<Vec<AuditLog>> {
    crate::db::from_row::query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            AUDIT_LOG_COLS
        ),
        params![limit],
    )
}
