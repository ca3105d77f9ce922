//! C5: the import orchestrator. Drives discovery → worker pool → per-file
//! pipeline, owning cancellation, progress checkpoints, and the scheduled
//! retry wrapper around it (§4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cruise_sql::file_sync::SyncStatus;
use cruise_sql::sync_history::{self, RunStatus};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::cache::ReferenceCache;
use crate::config::{Args, PRODUCTION_API_HOST};
use crate::delta::{self, DeltaTracker, RecordAttempt};
use crate::ftp::control::ControlClient;
use crate::ftp::download::{self, DownloadOutcome};
use crate::ftp::listing::{FileInfo, Listing, ListingFilter};
use crate::ftp::pool::FtpPool;
use crate::ftp::DownloadOptions;
use crate::metrics::{ErrorType, ImportMetrics};
use crate::payload::{self, VendorPayload};
use crate::upsert;

const PROGRESS_LOG_INTERVAL: u64 = 100;
const PROGRESS_UPDATE_INTERVAL: u64 = 50;
const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
const RETRYABLE_SUBSTRINGS: [&str; 7] =
    ["connect", "timeout", "econnrefused", "enotfound", "network", "ftp", "socket"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default)]
    pub dry_run: bool,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub line_id: Option<String>,
    pub ship_id: Option<String>,
    pub max_files: Option<usize>,
    pub skip_oversized: Option<bool>,
    pub max_file_size_bytes: Option<u64>,
    pub file_timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub include_historical: Option<bool>,
    pub concurrency: Option<usize>,
    pub ftp_pool_size: Option<usize>,
    pub delta_sync: Option<bool>,
    pub force_full_sync: Option<bool>,
}

impl SyncOptions {
    fn skip_oversized(&self) -> bool {
        self.skip_oversized.unwrap_or(true)
    }
    fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(4).clamp(1, 8)
    }
    fn download_options(&self) -> DownloadOptions {
        let defaults = DownloadOptions::default();
        DownloadOptions {
            max_file_size_bytes: self.max_file_size_bytes.unwrap_or(defaults.max_file_size_bytes),
            file_timeout: self
                .file_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.file_timeout),
            retry_attempts: self.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }
    fn listing_filter(&self) -> ListingFilter {
        ListingFilter {
            year: self.year,
            month: self.month,
            line_id: self.line_id.clone(),
            ship_id: self.ship_id.clone(),
            max_files: self.max_files,
            include_historical: self.include_historical.unwrap_or(false),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a sync is already running")]
    Busy,
    #[error("refusing to run outside production (api_url did not match; set BYPASS_SYNC_ENVIRONMENT_GUARD to override)")]
    EnvironmentGuard,
    #[error("advisory lock not acquired")]
    LockUnavailable,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Ftp(#[from] crate::ftp::FtpError),
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ProgressSnapshot {
    pub files_found: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
}

/// Singleton per-process run state (§4.1 "RunState"). `in_progress` guards
/// entry; `cancel_requested` is polled cooperatively by the worker loop.
pub struct RunState {
    in_progress: AtomicBool,
    cancel_requested: AtomicBool,
    progress: Mutex<Option<ProgressSnapshot>>,
}

impl Default for RunState {
    fn default() -> Self {
        RunState {
            in_progress: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            progress: Mutex::new(None),
        }
    }
}

impl RunState {
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub async fn progress(&self) -> Option<ProgressSnapshot> {
        self.progress.lock().await.clone()
    }

    fn try_begin(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
        self.cancel_requested.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    pub db: sqlx::PgPool,
    pub cache: Arc<ReferenceCache>,
    pub control: Arc<ControlClient>,
    pub args: Args,
    pub run_state: Arc<RunState>,
}

impl Orchestrator {
    fn environment_guard_ok(&self) -> bool {
        self.args.bypass_sync_environment_guard || self.args.api_url == PRODUCTION_API_HOST
    }

    /// Runs one sync to completion under the singleton guard. Returns the
    /// final metrics; never panics on a per-file failure (§4.5 "Failure
    /// isolation").
    pub async fn run_sync(&self, options: SyncOptions) -> Result<ImportMetrics, OrchestratorError> {
        if !self.environment_guard_ok() {
            return Err(OrchestratorError::EnvironmentGuard);
        }
        if !self.run_state.try_begin() {
            return Err(OrchestratorError::Busy);
        }

        let result = self.run_sync_inner(options).await;
        self.run_state.finish();
        result
    }

    async fn run_sync_inner(&self, options: SyncOptions) -> Result<ImportMetrics, OrchestratorError> {
        self.cache.reset_stats();

        let started_at = Utc::now();
        let mut metrics = ImportMetrics::new(started_at, options.dry_run);
        let options_json = json!({
            "dryRun": options.dry_run,
            "year": options.year,
            "month": options.month,
            "lineId": options.line_id,
            "shipId": options.ship_id,
        });
        let history_id = sync_history::start(&self.db, &options_json).await?;

        // Force a fresh control connection before listing; avoids stale
        // sockets left over from a prior run or idle period (§4.5 step 3).
        self.control.force_reconnect().await?;

        let force_full = options.force_full_sync.unwrap_or(false);
        let delta = Arc::new(if force_full || !options.delta_sync.unwrap_or(true) {
            DeltaTracker::empty()
        } else {
            DeltaTracker::load(&self.db).await?
        });

        if options.dry_run {
            let filter = options.listing_filter();
            let mut listing = Listing::new(self.control.as_ref(), filter);
            let mut files_found = 0u64;
            let _ = listing
                .drive(
                    |_file| {
                        files_found += 1;
                        files_found < 100
                    },
                    || false,
                )
                .await;
            metrics.files_found = files_found;
            metrics.finish(Utc::now());
            self.persist_final(history_id, &metrics, RunStatus::Completed).await?;
            return Ok(metrics);
        }

        let concurrency = options.concurrency();
        let pool = if concurrency > 1 {
            let size = options.ftp_pool_size.unwrap_or(concurrency + 1);
            Some(Arc::new(FtpPool::new(self.ftp_config(), size)))
        } else {
            None
        };

        // The listing traversal streams live: a single producer task drives
        // `Listing::drive` and forwards each `FileInfo` into a FIFO channel
        // the instant it is discovered. Workers pull one file at a time
        // from a shared receiver guarded by a mutex released as soon as the
        // next item is obtained, so processing of early files overlaps with
        // discovery of later ones instead of waiting for the full tree walk
        // (§4.2, §5).
        let files_found = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let (file_tx, file_rx) = tokio::sync::mpsc::unbounded_channel::<FileInfo>();
        let file_rx = Arc::new(Mutex::new(file_rx));

        let listing_handle = {
            let control = Arc::clone(&self.control);
            let filter = options.listing_filter();
            let run_state = Arc::clone(&self.run_state);
            let max_files = options.max_files;
            let files_found = Arc::clone(&files_found);
            tokio::spawn(async move {
                let mut listing = Listing::new(control.as_ref(), filter);
                let mut found = 0u64;
                let _ = listing
                    .drive(
                        |file| {
                            found += 1;
                            files_found.store(found, Ordering::SeqCst);
                            if file_tx.send(file).is_err() {
                                return false;
                            }
                            match max_files {
                                Some(max) => found < max as u64,
                                None => true,
                            }
                        },
                        || run_state.cancel_requested(),
                    )
                    .await;
            })
        };

        let metrics_shared = Arc::new(Mutex::new(metrics));
        let processed_counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut handles = Vec::new();

        for _ in 0..concurrency {
            let file_rx = Arc::clone(&file_rx);
            let metrics_shared = Arc::clone(&metrics_shared);
            let run_state = Arc::clone(&self.run_state);
            let processed_counter = Arc::clone(&processed_counter);
            let files_found = Arc::clone(&files_found);
            let db = self.db.clone();
            let cache = Arc::clone(&self.cache);
            let control = Arc::clone(&self.control);
            let pool = pool.clone();
            let delta = Arc::clone(&delta);
            let download_options = options.download_options();
            let skip_oversized = options.skip_oversized();

            let handle = tokio::spawn(async move {
                loop {
                    if run_state.cancel_requested() {
                        break;
                    }
                    let file = {
                        let mut rx = file_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(file) = file else { break };
                    {
                        let mut snapshot = metrics_shared.lock().await;
                        snapshot.files_found = files_found.load(Ordering::SeqCst);
                    }

                    process_one_file(
                        &db,
                        &cache,
                        &control,
                        pool.as_deref(),
                        &delta,
                        &download_options,
                        skip_oversized,
                        &file,
                        &metrics_shared,
                    )
                    .await;

                    let processed = processed_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if processed % PROGRESS_LOG_INTERVAL == 0 {
                        tracing::info!(processed, "cruise sync progress");
                    }
                    {
                        let snapshot = metrics_shared.lock().await;
                        let mut progress = run_state.progress.lock().await;
                        *progress = Some(ProgressSnapshot {
                            files_found: snapshot.files_found,
                            files_processed: snapshot.files_processed,
                            files_failed: snapshot.files_failed,
                            files_skipped: snapshot.files_skipped,
                        });
                    }
                    if processed % PROGRESS_UPDATE_INTERVAL == 0 {
                        let snapshot = metrics_shared.lock().await;
                        let metrics_value = serde_json::to_value(&*snapshot).unwrap_or(serde_json::Value::Null);
                        let errors_value = serde_json::to_value(&snapshot.errors).unwrap_or(serde_json::Value::Null);
                        let error_count = snapshot.error_count as i32;
                        drop(snapshot);
                        let _ = sync_history::checkpoint(&db, history_id, &metrics_value, error_count, &errors_value).await;
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }
        let _ = listing_handle.await;

        if let Some(pool) = &pool {
            pool.drain().await;
        }
        self.control.disconnect().await;

        // Alternate sailings may reference a sailing that was only inserted
        // later in this same run; one backfill pass at the end resolves any
        // such ordering gap (§9 Open Question).
        if let Err(err) = cruise_sql::sailings::backfill_alternate_sailing_ids(&self.db).await {
            tracing::warn!(%err, "failed to backfill alternate sailing ids");
        }

        let mut metrics = match Arc::try_unwrap(metrics_shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(arc) => arc.lock().await.clone(),
        };
        metrics.files_found = files_found.load(Ordering::SeqCst);
        metrics.finish(Utc::now());
        metrics.cancelled = self.run_state.cancel_requested();

        let status = if metrics.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        self.persist_final(history_id, &metrics, status).await?;
        Ok(metrics)
    }

    fn ftp_config(&self) -> crate::ftp::FtpConfig {
        crate::ftp::FtpConfig {
            host: self.args.ftp_host.clone(),
            user: self.args.ftp_user.clone(),
            password: self.args.ftp_password.clone(),
            secure: self.args.ftp_secure,
            verbose: self.args.ftp_verbose,
        }
    }

    async fn persist_final(
        &self,
        history_id: sqlx::types::Uuid,
        metrics: &ImportMetrics,
        status: RunStatus,
    ) -> Result<(), OrchestratorError> {
        let metrics_json = serde_json::to_value(metrics).unwrap_or(serde_json::Value::Null);
        let errors_json = serde_json::to_value(&metrics.errors).unwrap_or(serde_json::Value::Null);
        sync_history::finish(&self.db, history_id, status, &metrics_json, metrics.error_count as i32, &errors_json)
            .await?;
        Ok(())
    }

    pub fn request_cancel(&self) {
        self.run_state.request_cancel();
    }

    /// Acquires the advisory lock on a dedicated connection, runs `f`, and
    /// always releases the lock afterward (§4.5 "Singleton run").
    pub async fn with_advisory_lock<F, Fut, T>(&self, f: F) -> Result<Option<T>, OrchestratorError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let Some(guard) = cruise_sql::lock::AdvisoryLock::try_acquire(&self.db).await? else {
            return Ok(None);
        };
        let result = f().await;
        if let Err(err) = guard.release().await {
            tracing::error!(%err, "failed to release advisory lock after scheduled sync");
        }
        Ok(Some(result))
    }

    /// The 02:00 scheduled variant: gated on the feature flag, serialized by
    /// the advisory lock, retried on transient (substring-matched) failures
    /// with doubling back-off (§4.5 "Scheduled sync with retry").
    pub async fn run_scheduled_sync(&self) -> Result<(), OrchestratorError> {
        if !self.args.enable_scheduled_cruise_sync {
            return Ok(());
        }

        let outcome = self
            .with_advisory_lock(|| async {
                let options = SyncOptions {
                    concurrency: Some(4),
                    ..Default::default()
                };
                retry_scheduled(|| self.run_sync(options.clone())).await
            })
            .await?;

        match outcome {
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(err),
            None => {
                tracing::warn!("scheduled cruise sync: advisory lock not acquired, skipping");
                Err(OrchestratorError::LockUnavailable)
            }
        }
    }
}

fn is_retryable(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Retries the scheduled sync up to `MAX_RETRIES` attempts with `5min,
/// 10min, ...` back-off, but only when the failure looks transient
/// (§4.5). The back-off sleep is never interrupted by cancellation.
async fn retry_scheduled<F, Fut>(mut attempt: F) -> Result<ImportMetrics, OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<ImportMetrics, OrchestratorError>>,
{
    let mut last_err = None;
    for i in 1..=MAX_RETRIES {
        match attempt().await {
            Ok(metrics) => return Ok(metrics),
            Err(err) => {
                if !is_retryable(&err.to_string()) {
                    return Err(err);
                }
                last_err = Some(err);
                if i < MAX_RETRIES {
                    let delay = INITIAL_DELAY * 2u32.pow(i - 1);
                    sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

/// The per-file pipeline (§4.5): delta check, oversize check, download,
/// parse, path-identifier injection, upsert, and tracking-row write. Every
/// failure is recorded on `metrics` and the worker moves to the next file.
#[allow(clippy::too_many_arguments)]
async fn process_one_file(
    db: &sqlx::PgPool,
    cache: &ReferenceCache,
    control: &ControlClient,
    pool: Option<&FtpPool>,
    delta: &DeltaTracker,
    download_options: &DownloadOptions,
    skip_oversized: bool,
    file: &FileInfo,
    metrics: &Mutex<ImportMetrics>,
) {
    if delta.is_unchanged(file) {
        let mut m = metrics.lock().await;
        m.files_skipped += 1;
        m.skip_reasons.unchanged += 1;
        return;
    }

    if skip_oversized && file.size > download_options.max_file_size_bytes as i64 {
        let mut m = metrics.lock().await;
        m.files_skipped += 1;
        m.skip_reasons.oversized += 1;
        return;
    }

    let download_result = match pool {
        Some(pool) => download::download_via_pool(pool, &file.path, download_options).await,
        None => download::download_via_control(control, &file.path, download_options).await,
    };

    let bytes = match download_result {
        Ok(result) if result.outcome == DownloadOutcome::OversizedSkip => {
            let mut m = metrics.lock().await;
            m.files_skipped += 1;
            m.skip_reasons.oversized += 1;
            return;
        }
        Ok(result) => result.bytes.unwrap_or_default(),
        Err(err) => {
            let mut m = metrics.lock().await;
            m.files_skipped += 1;
            m.skip_reasons.download_failed += 1;
            m.push_error(file.path.clone(), err.to_string(), ErrorType::DownloadFailed);
            drop(m);
            delta::record_attempt(
                db,
                RecordAttempt {
                    file_path: &file.path,
                    file_size: file.size,
                    ftp_modified_at: file.modified_at,
                    content_hash: None,
                    sync_status: SyncStatus::Failed,
                    last_error: Some(&err.to_string()),
                },
            )
            .await;
            return;
        }
    };

    let payload: VendorPayload = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(err) => {
            let message = format!("JSON parse error: {err}");
            let mut m = metrics.lock().await;
            m.files_skipped += 1;
            m.skip_reasons.parse_error += 1;
            m.push_error(file.path.clone(), message.clone(), ErrorType::ParseError);
            drop(m);
            delta::record_attempt(
                db,
                RecordAttempt {
                    file_path: &file.path,
                    file_size: file.size,
                    ftp_modified_at: file.modified_at,
                    content_hash: None,
                    sync_status: SyncStatus::Failed,
                    last_error: Some(&message),
                },
            )
            .await;
            return;
        }
    };

    let mut payload = payload;
    let Some(ids) = payload::parse_path_ids(&file.path) else {
        let mut m = metrics.lock().await;
        m.files_skipped += 1;
        m.skip_reasons.missing_fields += 1;
        m.push_error(file.path.clone(), "could not parse IDs from file path".to_string(), ErrorType::MissingFields);
        return;
    };
    payload.apply_path_ids(&ids);

    if payload.has_missing_fields() {
        let mut m = metrics.lock().await;
        m.files_skipped += 1;
        m.skip_reasons.missing_fields += 1;
        m.push_error(file.path.clone(), "missing cruiseLineId/shipId/codeToCruiseId".to_string(), ErrorType::MissingFields);
        return;
    }

    let content_hash = format!("{:x}", Md5::digest(&bytes));

    match upsert::upsert_sailing(db, cache, &payload, &ids, Some(&bytes)).await {
        Ok(outcome) => {
            let mut m = metrics.lock().await;
            m.files_processed += 1;
            m.sailings_upserted += 1;
            if outcome.is_new {
                m.sailings_created += 1;
            } else {
                m.sailings_updated += 1;
            }
            m.stops_inserted += outcome.stops_inserted;
            m.prices_inserted += outcome.prices_inserted;
            m.stub_counters.cruise_lines_created += outcome.stub_counters.cruise_lines_created;
            m.stub_counters.ships_created += outcome.stub_counters.ships_created;
            m.stub_counters.ports_created += outcome.stub_counters.ports_created;
            m.stub_counters.regions_created += outcome.stub_counters.regions_created;
            drop(m);
            delta::record_attempt(
                db,
                RecordAttempt {
                    file_path: &file.path,
                    file_size: file.size,
                    ftp_modified_at: file.modified_at,
                    content_hash: Some(&content_hash),
                    sync_status: SyncStatus::Success,
                    last_error: None,
                },
            )
            .await;
        }
        Err(err) => {
            let mut m = metrics.lock().await;
            m.files_failed += 1;
            m.push_error(file.path.clone(), err.to_string(), upsert::error_type_for(&err));
            drop(m);
            delta::record_attempt(
                db,
                RecordAttempt {
                    file_path: &file.path,
                    file_size: file.size,
                    ftp_modified_at: file.modified_at,
                    content_hash: Some(&content_hash),
                    sync_status: SyncStatus::Failed,
                    last_error: Some(&err.to_string()),
                },
            )
            .await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retryable_substrings_match_case_insensitively() {
        assert!(is_retryable("ECONNREFUSED"));
        assert!(is_retryable("Connection timeout"));
        assert!(!is_retryable("Invalid authentication"));
    }

    #[test]
    fn concurrency_clamps_into_range() {
        let options = SyncOptions {
            concurrency: Some(20),
            ..Default::default()
        };
        assert_eq!(options.concurrency(), 8);
        let options = SyncOptions {
            concurrency: Some(0),
            ..Default::default()
        };
        assert_eq!(options.concurrency(), 1);
    }
}
