//! `ImportMetrics`: the canonical outcome of a sync run (§7, §8). Counters
//! are plain `u64`s mutated under the run's own coordination (see
//! `orchestrator::RunState`); this module only owns the shape and the
//! bounded error-list invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_ERRORS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Oversized,
    DownloadFailed,
    ParseError,
    MissingFields,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportError {
    pub file_path: String,
    pub error: String,
    pub error_type: ErrorType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipReasons {
    pub unchanged: u64,
    pub oversized: u64,
    pub download_failed: u64,
    pub parse_error: u64,
    pub missing_fields: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubCounters {
    pub cruise_lines_created: u64,
    pub ships_created: u64,
    pub ports_created: u64,
    pub regions_created: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMetrics {
    pub files_found: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub sailings_created: u64,
    pub sailings_updated: u64,
    pub sailings_upserted: u64,
    pub stops_inserted: u64,
    pub prices_inserted: u64,
    pub skip_reasons: SkipReasons,
    pub stub_counters: StubCounters,
    #[serde(default)]
    pub errors: Vec<ImportError>,
    pub error_count: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl ImportMetrics {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        ImportMetrics {
            files_found: 0,
            files_processed: 0,
            files_skipped: 0,
            files_failed: 0,
            sailings_created: 0,
            sailings_updated: 0,
            sailings_upserted: 0,
            stops_inserted: 0,
            prices_inserted: 0,
            skip_reasons: SkipReasons::default(),
            stub_counters: StubCounters::default(),
            errors: Vec::new(),
            error_count: 0,
            started_at,
            completed_at: None,
            duration_ms: None,
            cancelled: false,
            dry_run,
        }
    }

    /// Appends an error, dropping the oldest entry once the rolling list
    /// would exceed `MAX_ERRORS` (§7, testable property 8).
    pub fn push_error(&mut self, file_path: impl Into<String>, error: impl Into<String>, kind: ErrorType) {
        self.error_count += 1;
        self.errors.push(ImportError {
            file_path: file_path.into(),
            error: error.into(),
            error_type: kind,
        });
        if self.errors.len() > MAX_ERRORS {
            let overflow = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..overflow);
        }
    }

    pub fn finish(&mut self, completed_at: DateTime<Utc>) {
        self.completed_at = Some(completed_at);
        self.duration_ms = Some((completed_at - self.started_at).num_milliseconds());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_list_caps_at_max_and_drops_oldest() {
        let mut metrics = ImportMetrics::new(Utc::now(), false);
        for i in 0..(MAX_ERRORS + 10) {
            metrics.push_error(format!("/f{i}.json"), "boom", ErrorType::Unknown);
        }
        assert_eq!(metrics.errors.len(), MAX_ERRORS);
        assert_eq!(metrics.error_count, (MAX_ERRORS + 10) as u64);
        assert_eq!(metrics.errors.first().unwrap().file_path, "/f10.json");
    }

    #[test]
    fn duration_is_nonnegative() {
        let started = Utc::now();
        let mut metrics = ImportMetrics::new(started, false);
        metrics.finish(started + chrono::Duration::milliseconds(50));
        assert!(metrics.duration_ms.unwrap() >= 0);
    }
}
