//! Session Manager.
//!
//! Owns the pool of browser sessions. A [`Session`] is navigated and settled
//! before evaluators see it, and is released exactly once: explicitly through
//! [`Session::release`], or from `Drop` when an audit is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::SessionConfig;
use crate::dom::{BrowserDriver, Page};

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("navigation to {url} failed: {reason}")]
    NavigationFailure { url: String, reason: String },

    #[error("browser session unavailable: {0}")]
    Unavailable(String),
}

/// Hands out navigated sessions, at most `pool_size` at a time.
pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    pool: Arc<Semaphore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: SessionConfig) -> Self {
        Self {
            driver,
            pool: Arc::new(Semaphore::new(config.pool_size.max(1))),
            config,
        }
    }

    /// Sessions that could be acquired right now.
    pub fn available(&self) -> usize {
        self.pool.available_permits()
    }

    /// Open a session, navigate to `url` and wait for the page to settle.
    ///
    /// Waits for a pool slot first. On navigation failure the browser
    /// session is closed before returning.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, url: &str) -> Result<Session, SessionError> {
        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SessionError::Unavailable("session pool closed".to_string()))?;

        let page = self
            .driver
            .open()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        let navigated = tokio::time::timeout(self.config.navigation_timeout, page.navigate(url)).await;
        let failure = match navigated {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "page did not load within {}",
                humantime::format_duration(self.config.navigation_timeout)
            )),
        };

        if let Some(reason) = failure {
            if let Err(e) = page.close().await {
                tracing::warn!(session = page.session_id(), error = %e, "Failed to close session after navigation failure");
            }
            drop(permit);
            return Err(SessionError::NavigationFailure {
                url: url.to_string(),
                reason,
            });
        }

        tokio::time::sleep(self.config.settle_delay).await;

        tracing::debug!(session = page.session_id(), "Session ready");
        Ok(Session {
            url: url.to_string(),
            page,
            permit: parking_lot::Mutex::new(Some(permit)),
            released: AtomicBool::new(false),
        })
    }
}

/// A navigated page leased from the pool.
pub struct Session {
    url: String,
    page: Arc<dyn Page>,
    permit: parking_lot::Mutex<Option<OwnedSemaphorePermit>>,
    released: AtomicBool,
}

impl Session {
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Close the browser session and return the pool slot. Later calls are
    /// no-ops.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let permit = self.permit.lock().take();
        close_page(&self.page).await;
        drop(permit);
    }
}

async fn close_page(page: &Arc<dyn Page>) {
    match page.close().await {
        Ok(()) => tracing::debug!(session = page.session_id(), "Session released"),
        Err(e) => tracing::warn!(session = page.session_id(), error = %e, "Failed to close browser session"),
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let permit = self.permit.lock().take();
        let page = self.page.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_page(&page).await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!(session = page.session_id(), "Session dropped outside a runtime; browser session leaked");
            }
        }
    }
}
