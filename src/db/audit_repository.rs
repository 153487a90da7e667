//! Audit log repository
//!
//! The audit trail is append-only and written through the database function;
//! this repository only reads it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{AuditLogEntry, AuditLogQuery};
use crate::utils::error::AppResult;

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    table_name: String,
    record_id: Option<Uuid>,
    user_id: Option<Uuid>,
    ip_address: Option<String>,
    session_id: Option<String>,
    details: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

pub struct AuditRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>> {
        let mut sql = String::from(
            "SELECT id, action, table_name, record_id, user_id, ip_address, session_id, details, created_at \
             FROM audit_logs WHERE 1=1",
        );
        let mut param = 0;

        if query.table_name.is_some() {
            param += 1;
            sql.push_str(&format!(" AND table_name = ${}", param));
        }
        if query.action.is_some() {
            param += 1;
            sql.push_str(&format!(" AND action = ${}", param));
        }
        if query.user_id.is_some() {
            param += 1;
            sql.push_str(&format!(" AND user_id = ${}", param));
        }
        if query.record_id.is_some() {
            param += 1;
            sql.push_str(&format!(" AND record_id = ${}", param));
        }

        sql.push_str(" ORDER BY created_at DESC");
        sql.push_str(&format!(" LIMIT ${}", param + 1));
        sql.push_str(&format!(" OFFSET ${}", param + 2));

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        if let Some(ref table_name) = query.table_name {
            q = q.bind(table_name);
        }
        if let Some(ref action) = query.action {
            q = q.bind(action);
        }
        if let Some(user_id) = query.user_id {
            q = q.bind(user_id);
        }
        if let Some(record_id) = query.record_id {
            q = q.bind(record_id);
        }
        q = q.bind(query.effective_limit()).bind(query.effective_offset());

        let rows = q.fetch_all(self.pool).await?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }
}

fn row_to_entry(row: AuditRow) -> AuditLogEntry {
    AuditLogEntry {
        id: row.id,
        action: row.action,
        table_name: row.table_name,
        record_id: row.record_id,
        user_id: row.user_id,
        ip_address: row.ip_address,
        session_id: row.session_id,
        details: row.details,
        created_at: row.created_at,
    }
}
