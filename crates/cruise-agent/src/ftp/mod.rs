//! C2: the FTP transport. A single control connection for directory
//! listing plus a pool of authenticated connections for parallel
//! downloads (§4.2, §5).

pub mod control;
pub mod download;
pub mod listing;
pub mod pool;

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub secure: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub max_file_size_bytes: u64,
    pub file_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            max_file_size_bytes: 500_000,
            file_timeout: Duration::from_millis(30_000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FtpError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("file exceeds max size")]
    Oversized,
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
}

/// Abstracts the underlying wire client so the listing/download/retry
/// logic can be unit tested without a live FTP server, the same way the
/// teacher hides its connector invocations behind the `DiscoverConnectors`
/// trait.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&mut self) -> Result<(), FtpError>;
    async fn quit(&mut self);
    async fn list_names(&mut self, dir: &str) -> Result<Vec<String>, FtpError>;
    async fn size(&mut self, path: &str) -> Result<Option<u64>, FtpError>;
    async fn modified_at(&mut self, path: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>, FtpError>;
    async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, FtpError>;
}
