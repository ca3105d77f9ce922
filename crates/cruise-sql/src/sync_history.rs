//! `cruise_sync.sync_history`: one row per import run (§3.2).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::PgExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SyncHistoryRow {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub options: Value,
    pub metrics: Value,
    pub error_count: i32,
    pub errors: Value,
}

pub async fn start<'e, E: PgExecutor<'e>>(db: E, options: &Value) -> sqlx::Result<Uuid> {
    sqlx::query_scalar(
        r#"
        insert into cruise_sync.sync_history (id, started_at, status, options, metrics, error_count, errors)
        values (gen_random_uuid(), now(), 'running', $1, '{}'::json, 0, '[]'::json)
        returning id
        "#,
    )
    .bind(options)
    .fetch_one(db)
    .await
}

/// Persists an in-progress snapshot (metrics + the rolling error list),
/// called every `PROGRESS_UPDATE_INTERVAL` processed files (§4.5).
pub async fn checkpoint<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    metrics: &Value,
    error_count: i32,
    errors: &Value,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update cruise_sync.sync_history
        set metrics = $2, error_count = $3, errors = $4
        where id = $1
        "#,
    )
    .bind(id)
    .bind(metrics)
    .bind(error_count)
    .bind(errors)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn finish<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    status: RunStatus,
    metrics: &Value,
    error_count: i32,
    errors: &Value,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        update cruise_sync.sync_history
        set status = $2, completed_at = now(), metrics = $3, error_count = $4, errors = $5
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(metrics)
    .bind(error_count)
    .bind(errors)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn history<'e, E: PgExecutor<'e>>(db: E, limit: i64) -> sqlx::Result<Vec<SyncHistoryRow>> {
    sqlx::query_as::<_, SyncHistoryRow>(
        r#"
        select id, started_at, completed_at, status, options, metrics, error_count, errors
        from cruise_sync.sync_history
        order by started_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await
}
