//! The single control connection used for directory listing, size probes,
//! and (absent a pool) as the sole downloader (§4.2).

use std::time::Duration;

use chrono::{DateTime, Utc};
use suppaftp::AsyncFtpStream;
use tokio::sync::Mutex;

use super::{FtpConfig, FtpError, Transport};

pub struct SuppaftpTransport {
    config: FtpConfig,
    stream: Option<AsyncFtpStream>,
}

impl SuppaftpTransport {
    pub fn new(config: FtpConfig) -> Self {
        SuppaftpTransport {
            config,
            stream: None,
        }
    }

    async fn dial(config: &FtpConfig) -> Result<AsyncFtpStream, FtpError> {
        let mut stream = AsyncFtpStream::connect(&config.host)
            .await
            .map_err(|e| FtpError::Connect(e.to_string()))?;

        if config.secure {
            stream = stream
                .into_secure(suppaftp::types::FtpFileType::Binary)
                .await
                .map_err(|e| FtpError::Connect(e.to_string()))?;
        }

        stream
            .login(&config.user, &config.password)
            .await
            .map_err(|e| FtpError::Connect(e.to_string()))?;

        Ok(stream)
    }
}

#[async_trait::async_trait]
impl Transport for SuppaftpTransport {
    async fn connect(&mut self) -> Result<(), FtpError> {
        let stream = Self::dial(&self.config).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn quit(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit().await;
        }
    }

    async fn list_names(&mut self, dir: &str) -> Result<Vec<String>, FtpError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FtpError::Command("not connected".into()))?;
        stream
            .nlst(Some(dir))
            .await
            .map_err(|e| FtpError::Command(e.to_string()))
            .map(|names| {
                names
                    .into_iter()
                    .map(|n| n.rsplit('/').next().unwrap_or(&n).to_string())
                    .collect()
            })
    }

    async fn size(&mut self, path: &str) -> Result<Option<u64>, FtpError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FtpError::Command("not connected".into()))?;
        match stream.size(path).await {
            Ok(size) => Ok(Some(size as u64)),
            Err(_) => Ok(None),
        }
    }

    async fn modified_at(&mut self, path: &str) -> Result<Option<DateTime<Utc>>, FtpError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FtpError::Command("not connected".into()))?;
        match stream.mdtm(path).await {
            Ok(naive) => Ok(Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))),
            Err(_) => Ok(None),
        }
    }

    async fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, FtpError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FtpError::Command("not connected".into()))?;
        stream
            .retr_as_buffer(path)
            .await
            .map(|cursor| cursor.into_inner())
            .map_err(|e| FtpError::Command(e.to_string()))
    }
}

/// Wraps a [`Transport`] in a mutex so it can be shared behind an `Arc` by
/// the orchestrator, and adds the `force_reconnect`/`test_connection`
/// operations the control client needs beyond plain `Transport` (§4.2).
pub struct ControlClient {
    inner: Mutex<Box<dyn Transport>>,
    config: FtpConfig,
}

impl ControlClient {
    pub fn new(config: FtpConfig, transport: Box<dyn Transport>) -> Self {
        ControlClient {
            inner: Mutex::new(transport),
            config,
        }
    }

    pub async fn connect(&self) -> Result<(), FtpError> {
        self.inner.lock().await.connect().await
    }

    /// Closes any existing connection and opens a fresh one. The
    /// orchestrator calls this once at the start of every run (§9 Open
    /// Question: default behavior is a fresh connection per run, never
    /// connection reuse across runs).
    pub async fn force_reconnect(&self) -> Result<(), FtpError> {
        let mut guard = self.inner.lock().await;
        guard.quit().await;
        guard.connect().await
    }

    pub async fn disconnect(&self) {
        self.inner.lock().await.quit().await;
    }

    pub async fn list_names(&self, dir: &str) -> Result<Vec<String>, FtpError> {
        self.inner.lock().await.list_names(dir).await
    }

    pub async fn size(&self, path: &str) -> Result<Option<u64>, FtpError> {
        self.inner.lock().await.size(path).await
    }

    pub async fn modified_at(&self, path: &str) -> Result<Option<DateTime<Utc>>, FtpError> {
        self.inner.lock().await.modified_at(path).await
    }

    pub async fn retrieve(&self, path: &str) -> Result<Vec<u8>, FtpError> {
        self.inner.lock().await.retrieve(path).await
    }

    /// Uses a freshly constructed, transient connection that never touches
    /// the control client's own socket (§4.2).
    pub async fn test_connection(&self) -> Result<String, FtpError> {
        let mut transient = SuppaftpTransport::new(self.config.clone());
        tokio::time::timeout(Duration::from_secs(10), transient.connect())
            .await
            .map_err(|_| FtpError::Timeout(Duration::from_secs(10)))??;
        transient.quit().await;
        Ok(format!("connected to {}", self.config.host))
    }
}
