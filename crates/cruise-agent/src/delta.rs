//! C4: the delta tracker. Loads the full `ftp_file_sync` table into memory
//! at run start and answers the "is this file unchanged" question the
//! per-file pipeline asks before downloading (§4.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cruise_sql::file_sync::{self, FtpFileSyncRow, SyncStatus};

use crate::ftp::listing::FileInfo;

pub struct DeltaTracker {
    tracked: HashMap<String, FtpFileSyncRow>,
}

impl DeltaTracker {
    pub fn empty() -> Self {
        DeltaTracker {
            tracked: HashMap::new(),
        }
    }

    pub async fn load(db: &sqlx::PgPool) -> sqlx::Result<Self> {
        let rows = file_sync::load_all(db).await?;
        Ok(DeltaTracker {
            tracked: rows.into_iter().map(|r| (r.file_path.clone(), r)).collect(),
        })
    }

    /// A discovered file is "unchanged" iff the tracked row exists, its
    /// `sync_status` is `success`, its `file_size` matches, and either both
    /// sides' `ftp_modified_at` match exactly or it is absent on one side
    /// (§4.4, §8 property 5).
    pub fn is_unchanged(&self, file: &FileInfo) -> bool {
        let Some(row) = self.tracked.get(&file.path) else {
            return false;
        };
        if row.sync_status != SyncStatus::Success {
            return false;
        }
        if row.file_size != file.size {
            return false;
        }
        match (row.ftp_modified_at, file.modified_at) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

pub struct RecordAttempt<'a> {
    pub file_path: &'a str,
    pub file_size: i64,
    pub ftp_modified_at: Option<DateTime<Utc>>,
    pub content_hash: Option<&'a str>,
    pub sync_status: SyncStatus,
    pub last_error: Option<&'a str>,
}

/// Writes the per-file tracking row after every attempt, success or
/// failure. Errors here are logged and swallowed by the caller; tracking
/// must never fail or block the sync (§4.4).
pub async fn record_attempt(db: &sqlx::PgPool, attempt: RecordAttempt<'_>) {
    let result = file_sync::record_attempt(
        db,
        &file_sync::RecordAttempt {
            file_path: attempt.file_path,
            file_size: attempt.file_size,
            ftp_modified_at: attempt.ftp_modified_at,
            content_hash: attempt.content_hash,
            sync_status: attempt.sync_status,
            last_error: attempt.last_error,
        },
    )
    .await;
    if let Err(err) = result {
        tracing::warn!(file_path = attempt.file_path, error = ?err, "failed to record file-sync tracking row");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn row(path: &str, size: i64, status: SyncStatus, modified: Option<DateTime<Utc>>) -> FtpFileSyncRow {
        FtpFileSyncRow {
            file_path: path.to_string(),
            file_size: size,
            ftp_modified_at: modified,
            content_hash: None,
            last_synced_at: Utc::now(),
            sync_status: status,
            last_error: None,
        }
    }

    fn tracker_with(rows: Vec<FtpFileSyncRow>) -> DeltaTracker {
        DeltaTracker {
            tracked: rows.into_iter().map(|r| (r.file_path.clone(), r)).collect(),
        }
    }

    #[test]
    fn unknown_file_is_not_unchanged() {
        let tracker = DeltaTracker::empty();
        let file = FileInfo {
            path: "/2026/03/1/1/1.json".into(),
            name: "1.json".into(),
            size: 100,
            modified_at: None,
        };
        assert!(!tracker.is_unchanged(&file));
    }

    #[test]
    fn matching_size_and_timestamp_is_unchanged() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let tracker = tracker_with(vec![row("/x.json", 100, SyncStatus::Success, Some(ts))]);
        let file = FileInfo {
            path: "/x.json".into(),
            name: "x.json".into(),
            size: 100,
            modified_at: Some(ts),
        };
        assert!(tracker.is_unchanged(&file));
    }

    #[test]
    fn size_mismatch_is_changed() {
        let tracker = tracker_with(vec![row("/x.json", 100, SyncStatus::Success, None)]);
        let file = FileInfo {
            path: "/x.json".into(),
            name: "x.json".into(),
            size: 200,
            modified_at: None,
        };
        assert!(!tracker.is_unchanged(&file));
    }

    #[test]
    fn failed_status_is_always_reattempted() {
        let tracker = tracker_with(vec![row("/x.json", 100, SyncStatus::Failed, None)]);
        let file = FileInfo {
            path: "/x.json".into(),
            name: "x.json".into(),
            size: 100,
            modified_at: None,
        };
        assert!(!tracker.is_unchanged(&file));
    }

    #[test]
    fn missing_timestamp_on_one_side_still_counts_as_unchanged() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let tracker = tracker_with(vec![row("/x.json", 100, SyncStatus::Success, Some(ts))]);
        let file = FileInfo {
            path: "/x.json".into(),
            name: "x.json".into(),
            size: 100,
            modified_at: None,
        };
        assert!(tracker.is_unchanged(&file));
    }
}
