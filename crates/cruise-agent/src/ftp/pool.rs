//! A small fixed-size pool of authenticated connections shared by the
//! download workers (§4.2, §5 "Concurrency & Scheduling"). Acquire waits up
//! to 30s, polling no more than every 100ms; release returns the connection
//! for reuse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

use super::control::SuppaftpTransport;
use super::{FtpConfig, FtpError, Transport};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct PooledConnection {
    transport: Box<dyn Transport>,
}

impl PooledConnection {
    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

struct Inner {
    idle: Vec<Box<dyn Transport>>,
    outstanding: usize,
    capacity: usize,
}

/// A pool of `capacity` connections (default `concurrency + 1`, per the
/// control-surface default of `ftpPoolSize`). Connections are created lazily
/// on first acquire and reused across downloads.
pub struct FtpPool {
    config: FtpConfig,
    inner: Mutex<Inner>,
}

impl FtpPool {
    pub fn new(config: FtpConfig, capacity: usize) -> Self {
        FtpPool {
            config,
            inner: Mutex::new(Inner {
                idle: Vec::new(),
                outstanding: 0,
                capacity,
            }),
        }
    }

    pub async fn acquire(&self) -> Result<PooledConnection, FtpError> {
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(transport) = inner.idle.pop() {
                    inner.outstanding += 1;
                    return Ok(PooledConnection { transport });
                }
                if inner.outstanding < inner.capacity {
                    inner.outstanding += 1;
                    drop(inner);
                    let mut transport: Box<dyn Transport> =
                        Box::new(SuppaftpTransport::new(self.config.clone()));
                    transport.connect().await?;
                    return Ok(PooledConnection { transport });
                }
            }
            if Instant::now() >= deadline {
                return Err(FtpError::Timeout(ACQUIRE_TIMEOUT));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn release(&self, conn: PooledConnection) {
        let mut inner = self.inner.lock().await;
        inner.outstanding = inner.outstanding.saturating_sub(1);
        inner.idle.push(conn.transport);
    }

    /// Closes every idle connection and drops outstanding-connection
    /// accounting; called during finalization (§4.2 "Finalization").
    pub async fn drain(&self) {
        let mut inner = self.inner.lock().await;
        for mut transport in inner.idle.drain(..) {
            transport.quit().await;
        }
        inner.outstanding = 0;
    }
}

pub type SharedFtpPool = Arc<FtpPool>;
