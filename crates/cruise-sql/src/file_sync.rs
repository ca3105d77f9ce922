//! `cruise_sync.ftp_file_sync`: the per-file delta-tracking table (§4.4).

use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::PgExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FtpFileSyncRow {
    pub file_path: String,
    pub file_size: i64,
    pub ftp_modified_at: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
}

pub async fn load_all<'e, E: PgExecutor<'e>>(db: E) -> sqlx::Result<Vec<FtpFileSyncRow>> {
    sqlx::query_as::<_, FtpFileSyncRow>(
        r#"
        select file_path, file_size, ftp_modified_at, content_hash, last_synced_at,
               sync_status, last_error
        from cruise_sync.ftp_file_sync
        "#,
    )
    .fetch_all(db)
    .await
}

pub struct RecordAttempt<'a> {
    pub file_path: &'a str,
    pub file_size: i64,
    pub ftp_modified_at: Option<DateTime<Utc>>,
    pub content_hash: Option<&'a str>,
    pub sync_status: SyncStatus,
    pub last_error: Option<&'a str>,
}

/// Upserts the tracking row for one attempted file, success or failure.
/// Errors here are logged and swallowed by the caller; this function itself
/// just surfaces the `sqlx::Error` so the caller can apply that policy.
pub async fn record_attempt<'e, E: PgExecutor<'e>>(db: E, a: &RecordAttempt<'_>) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into cruise_sync.ftp_file_sync
            (file_path, file_size, ftp_modified_at, content_hash, last_synced_at, sync_status, last_error)
        values ($1, $2, $3, $4, now(), $5, $6)
        on conflict (file_path) do update set
            file_size = excluded.file_size,
            ftp_modified_at = excluded.ftp_modified_at,
            content_hash = excluded.content_hash,
            last_synced_at = now(),
            sync_status = excluded.sync_status,
            last_error = excluded.last_error
        "#,
    )
    .bind(a.file_path)
    .bind(a.file_size)
    .bind(a.ftp_modified_at)
    .bind(a.content_hash)
    .bind(a.sync_status)
    .bind(a.last_error)
    .execute(db)
    .await?;
    Ok(())
}

/// Sailing rows referenced via `alternate_sailings`/`sync_raw` are keyed by
/// provider sailing id, not file path; this helper is used by maintenance
/// cleanup to remove the matching `sync_raw` row for a purged sailing.
pub async fn delete_sync_raw_for_provider_sailing<'e, E: PgExecutor<'e>>(
    db: E,
    provider_sailing_id: &str,
) -> sqlx::Result<u64> {
    let result = sqlx::query("delete from catalog.sync_raw where provider_sailing_id = $1")
        .bind(provider_sailing_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sync_status_roundtrips_through_enum() {
        assert_ne!(SyncStatus::Success, SyncStatus::Failed);
    }
}
