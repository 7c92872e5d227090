//! Error types for the browser seam.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("connection to the auth page refused: {0}")]
    ConnectionRefused(String),

    #[error("connection to the auth page closed: {0}")]
    ConnectionClosed(String),

    #[error("page load timed out after {timeout:?}: {url}")]
    PageLoadTimeout { url: String, timeout: Duration },

    #[error("timed out after {timeout:?} waiting for: {waiting_for}")]
    WaitTimeout {
        waiting_for: String,
        timeout: Duration,
    },

    #[error("trigger element matched but cannot be identified: {0}")]
    UnidentifiedTrigger(String),

    #[error("browser driver failure: {0}")]
    Driver(String),
}

impl BrowserError {
    /// Whether this is one of the two timeout variants the login engine
    /// turns into layout-vs-load diagnostics.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BrowserError::PageLoadTimeout { .. } | BrowserError::WaitTimeout { .. }
        )
    }
}
