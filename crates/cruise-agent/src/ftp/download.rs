//! Single-file download (§4.2 "Download algorithm"): size probe, timeout,
//! and retry/backoff, usable either through the pool or through the bare
//! control client.

use tokio::time::{sleep, timeout};

use super::control::ControlClient;
use super::pool::FtpPool;
use super::{DownloadOptions, FtpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    OversizedSkip,
}

pub struct DownloadResult {
    pub outcome: DownloadOutcome,
    pub bytes: Option<Vec<u8>>,
}

/// Doubles `base` for each attempt past the first, matching the
/// scheduled-sync backoff (§4.5): attempt 1 waits `base`, attempt 2 waits
/// `base * 2`, and so on.
fn backoff(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    base * 2u32.pow(attempt.saturating_sub(1))
}

/// Probes the server-reported size first; skips without downloading if it
/// exceeds `max_file_size_bytes`. If the size cannot be obtained, downloads
/// anyway. Retries up to `retry_attempts` times with exponential backoff
/// between attempts, reconnecting the control client before each retry
/// since it is the single shared connection, and aborting any single
/// attempt that exceeds `file_timeout`.
pub async fn download_via_control(
    client: &ControlClient,
    path: &str,
    options: &DownloadOptions,
) -> Result<DownloadResult, FtpError> {
    if let Some(size) = client.size(path).await? {
        if size > options.max_file_size_bytes {
            return Ok(DownloadResult {
                outcome: DownloadOutcome::OversizedSkip,
                bytes: None,
            });
        }
    }

    let mut last_err = None;
    for attempt in 0..options.retry_attempts {
        match timeout(options.file_timeout, client.retrieve(path)).await {
            Ok(Ok(bytes)) => {
                return Ok(DownloadResult {
                    outcome: DownloadOutcome::Downloaded,
                    bytes: Some(bytes),
                })
            }
            Ok(Err(err)) => last_err = Some(err),
            Err(_) => last_err = Some(FtpError::Timeout(options.file_timeout)),
        }
        if attempt + 1 < options.retry_attempts {
            sleep(backoff(options.retry_delay, attempt + 1)).await;
            client.force_reconnect().await?;
        }
    }
    Err(last_err.unwrap_or(FtpError::Command("download failed".into())))
}

/// Same algorithm, but acquires a pooled connection fresh for every attempt
/// rather than going through the shared control client (§4.2, used by
/// workers once the pool is initialized) — a connection is held only for
/// the duration of a single attempt and released before backing off, so a
/// wedged connection doesn't stay checked out across the whole retry loop.
pub async fn download_via_pool(
    pool: &FtpPool,
    path: &str,
    options: &DownloadOptions,
) -> Result<DownloadResult, FtpError> {
    {
        let mut conn = pool.acquire().await?;
        let size = conn.transport_mut().size(path).await?;
        if let Some(size) = size {
            if size > options.max_file_size_bytes {
                pool.release(conn).await;
                return Ok(DownloadResult {
                    outcome: DownloadOutcome::OversizedSkip,
                    bytes: None,
                });
            }
        }
        pool.release(conn).await;
    }

    let mut last_err = None;
    for attempt in 0..options.retry_attempts {
        let mut conn = pool.acquire().await?;
        let outcome = timeout(options.file_timeout, conn.transport_mut().retrieve(path)).await;
        pool.release(conn).await;

        match outcome {
            Ok(Ok(bytes)) => {
                return Ok(DownloadResult {
                    outcome: DownloadOutcome::Downloaded,
                    bytes: Some(bytes),
                })
            }
            Ok(Err(err)) => last_err = Some(err),
            Err(_) => last_err = Some(FtpError::Timeout(options.file_timeout)),
        }
        if attempt + 1 < options.retry_attempts {
            sleep(backoff(options.retry_delay, attempt + 1)).await;
        }
    }

    Err(last_err.unwrap_or(FtpError::Command("download failed".into())))
}
