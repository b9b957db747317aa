use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::browser::{Browser, BrowserLauncher};

struct PoolInner {
    launcher: Box<dyn BrowserLauncher>,
    idle: Mutex<Vec<Arc<dyn Browser>>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Browser>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded set of browser processes shared by all posts.
///
/// At most `max_sessions` leases exist at once; further callers wait up to
/// the acquire timeout. Browsers are launched lazily and kept for reuse.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(
        launcher: Box<dyn BrowserLauncher>,
        max_sessions: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                launcher,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(max_sessions)),
                acquire_timeout,
            }),
        }
    }

    pub async fn acquire(&self) -> Result<BrowserLease> {
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for a browser session"))?
        .context("browser session pool is shut down")?;

        // Drop browsers whose process died while idle
        let reused = {
            let mut idle = self.inner.idle();
            idle.retain(|b| b.is_connected());
            idle.pop()
        };

        let browser = match reused {
            Some(browser) => {
                debug!("Reusing idle browser");
                browser
            }
            None => Arc::from(
                self.inner
                    .launcher
                    .launch()
                    .await
                    .context("Failed to launch browser")?,
            ),
        };

        Ok(BrowserLease {
            browser,
            pool: self.inner.clone(),
            healthy: true,
            _permit: permit,
        })
    }

    #[cfg(test)]
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    /// Refuse new leases and close every idle browser.
    pub async fn shutdown(&self) {
        self.inner.permits.close();
        let browsers: Vec<Arc<dyn Browser>> = self.inner.idle().drain(..).collect();
        info!("Shutting down {} idle browser(s)", browsers.len());
        for browser in browsers {
            if let Err(e) = browser.shutdown().await {
                warn!("Failed to shut down browser: {:#}", e);
            }
        }
    }
}

/// Exclusive use of one browser. Returned to the pool on drop unless
/// discarded or disconnected.
pub struct BrowserLease {
    browser: Arc<dyn Browser>,
    pool: Arc<PoolInner>,
    healthy: bool,
    // Released after the browser is back in the idle list
    _permit: OwnedSemaphorePermit,
}

impl BrowserLease {
    pub fn browser(&self) -> &dyn Browser {
        &*self.browser
    }

    /// Don't hand this browser to anyone else.
    pub fn discard(&mut self) {
        self.healthy = false;
    }

    /// Undo [`discard`](Self::discard): return the browser on drop.
    pub fn keep(&mut self) {
        self.healthy = true;
    }
}

impl std::fmt::Debug for BrowserLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserLease")
            .field("healthy", &self.healthy)
            .field("connected", &self.browser.is_connected())
            .finish()
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        if self.healthy && self.browser.is_connected() && !self.pool.permits.is_closed() {
            self.pool.idle().push(self.browser.clone());
        } else {
            debug!("Discarding browser");
        }
    }
}
