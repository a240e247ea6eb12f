//! Ways into the trial account page, tried in order
//!
//! Each strategy performs its action, lets the page settle and then reports
//! whether the browser ended up on a `/trial/` URL.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{KeepaliveError, Result};
use crate::locator::Locator;
use crate::page::{BrowserPage, ElementState};
use crate::selector::Selector;

pub const TRIAL_URL: &str = "https://account.hanatrial.ondemand.com/trial/";
pub const TRIAL_PATH_MARKER: &str = "/trial/";
pub const GO_TO_TRIAL: &str = r#"a:has-text("转到您的试用账户"), button:has-text("转到您的试用账户"), a:has-text("Go To Your Trial Account"), button:has-text("Go To Your Trial Account")"#;
pub const ALTERNATIVE_TRIAL_SELECTORS: &[&str] = &[
    r#"a[href*="trial"]"#,
    r#"button[onclick*="trial"]"#,
    r#"[data-testid*="trial"]"#,
    ".trial-account-button",
    r#"a:has-text("Trial"), button:has-text("Trial")"#,
];

pub async fn on_trial_page(page: &dyn BrowserPage) -> Result<bool> {
    let url = page.current_url().await?;
    info!(%url, "current URL");
    Ok(url.contains(TRIAL_PATH_MARKER))
}

#[async_trait]
pub trait TrialEntryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(true)` when the page is on the trial account afterwards.
    async fn attempt(&self, page: &dyn BrowserPage) -> Result<bool>;
}

/// Wait for the "Go To Your Trial Account" button and click it.
pub struct ClickTrialButton {
    pub locator: Locator,
    pub settle: Duration,
}

#[async_trait]
impl TrialEntryStrategy for ClickTrialButton {
    fn name(&self) -> &'static str {
        "trial button"
    }

    async fn attempt(&self, page: &dyn BrowserPage) -> Result<bool> {
        self.locator.wait(page, None).await?;
        info!("found trial account button, clicking");
        page.click(self.locator.selector()).await?;
        tokio::time::sleep(self.settle).await;
        on_trial_page(page).await
    }
}

/// Open the trial URL directly.
pub struct NavigateToTrial {
    pub url: String,
    pub settle: Duration,
}

#[async_trait]
impl TrialEntryStrategy for NavigateToTrial {
    fn name(&self) -> &'static str {
        "direct navigation"
    }

    async fn attempt(&self, page: &dyn BrowserPage) -> Result<bool> {
        page.goto(&self.url).await?;
        tokio::time::sleep(self.settle).await;
        on_trial_page(page).await
    }
}

/// Click the first present element among a list of fallback selectors.
pub struct AlternativeSelectors {
    pub selectors: Vec<Selector>,
    pub settle: Duration,
}

#[async_trait]
impl TrialEntryStrategy for AlternativeSelectors {
    fn name(&self) -> &'static str {
        "alternative selector"
    }

    async fn attempt(&self, page: &dyn BrowserPage) -> Result<bool> {
        for selector in &self.selectors {
            match page.query(selector).await {
                Ok(ElementState::Missing) => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(%selector, error = %e, "lookup failed, trying next selector");
                    continue;
                }
            }
            info!(%selector, "using alternative selector");
            if let Err(e) = page.click(selector).await {
                warn!(%selector, error = %e, "click failed, trying next selector");
                continue;
            }
            tokio::time::sleep(self.settle).await;
            return on_trial_page(page).await;
        }
        Ok(false)
    }
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn TrialEntryStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn TrialEntryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Button click, then direct navigation, then the fallback selectors.
    pub fn trial_entry(button_timeout: Duration, click_settle: Duration, navigation_settle: Duration) -> Self {
        Self::new(vec![
            Box::new(ClickTrialButton {
                locator: Locator::new(GO_TO_TRIAL).set_default_timeout(button_timeout),
                settle: click_settle,
            }),
            Box::new(NavigateToTrial {
                url: TRIAL_URL.to_string(),
                settle: navigation_settle,
            }),
            Box::new(AlternativeSelectors {
                selectors: ALTERNATIVE_TRIAL_SELECTORS.iter().map(|s| Selector::from(*s)).collect(),
                settle: navigation_settle,
            }),
        ])
    }

    /// Run strategies until one reaches the trial page; returns its name.
    pub async fn run(&self, page: &dyn BrowserPage) -> Result<&'static str> {
        let mut last_error = None;
        for strategy in &self.strategies {
            info!(strategy = strategy.name(), "👉 trying strategy");
            match strategy.attempt(page).await {
                Ok(true) => {
                    info!(strategy = strategy.name(), "✅ reached trial account page");
                    return Ok(strategy.name());
                }
                Ok(false) => info!(strategy = strategy.name(), "strategy did not reach trial page"),
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy failed");
                    last_error = Some(e);
                }
            }
        }
        Err(KeepaliveError::ElementNotFound(match last_error {
            Some(e) => format!("trial account page not reached: {e}"),
            None => "trial account page not reached".to_string(),
        }))
    }
}
