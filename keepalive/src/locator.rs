use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::errors::{KeepaliveError, Result};
use crate::page::{BrowserPage, ElementState};
use crate::selector::Selector;

const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A high-level API for finding and interacting with page elements
#[derive(Debug, Clone)]
pub struct Locator {
    selector: Selector,
    timeout: Duration,
}

impl Locator {
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Wait until the selector matches a visible element.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, page, timeout), fields(selector = %self.selector))]
    pub async fn wait(&self, page: &dyn BrowserPage, timeout: Option<Duration>) -> Result<()> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;

        loop {
            match page.query(&self.selector).await {
                Ok(ElementState::Visible) => return Ok(()),
                Ok(state) => debug!(?state, "element not visible yet"),
                // the page may be mid-navigation
                Err(e) => debug!(error = %e, "query failed, retrying"),
            }
            if Instant::now() >= deadline {
                return Err(KeepaliveError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {}",
                    self.selector
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Whether the selector matches anything right now, visible or not.
    pub async fn is_present(&self, page: &dyn BrowserPage) -> Result<bool> {
        Ok(page.query(&self.selector).await? != ElementState::Missing)
    }

    pub async fn fill(&self, page: &dyn BrowserPage, value: &str) -> Result<()> {
        self.wait(page, None).await?;
        page.fill(&self.selector, value).await
    }

    pub async fn click(&self, page: &dyn BrowserPage) -> Result<()> {
        self.wait(page, None).await?;
        page.click(&self.selector).await
    }
}
