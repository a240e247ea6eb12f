//! SAP BTP trial login bot
//!
//! Logs every configured account in, one after another, and walks it to its
//! trial account page. Each step that matters is photographed and sent to the
//! notifier; a summary report closes the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::Account;
use crate::errors::Result;
use crate::locator::Locator;
use crate::notifier::Notifier;
use crate::page::{BrowserPage, PageSource};
use crate::strategy::StrategyChain;

pub const LOGIN_URL: &str = "https://account.hanatrial.ondemand.com/";

pub const EMAIL_INPUT: &str = r#"input[name="email"], input[id="j_username"]"#;
pub const EMAIL_SUBMIT: &str = r#"button[type="submit"], button[id="continue"], #logOnFormSubmit"#;
pub const PASSWORD_INPUT: &str = r#"input[type="password"], input[id="j_password"]"#;
pub const PASSWORD_SUBMIT: &str = r#"button[type="submit"], #logOnFormSubmit"#;
pub const CONSENT_BUTTON: &str =
    r#"#truste-consent-button, .consent-button, [aria-label*="cookie"], [aria-label*="Cookie"]"#;

#[derive(Debug, Clone, Copy)]
pub struct LoginTimings {
    pub password_timeout: Duration,
    pub after_login: Duration,
    pub consent_settle: Duration,
    pub trial_button_timeout: Duration,
    pub click_settle: Duration,
    pub navigation_settle: Duration,
    pub trial_settle: Duration,
    pub between_accounts: Duration,
}

impl Default for LoginTimings {
    fn default() -> Self {
        Self {
            password_timeout: Duration::from_secs(15),
            after_login: Duration::from_secs(8),
            consent_settle: Duration::from_secs(2),
            trial_button_timeout: Duration::from_secs(30),
            click_settle: Duration::from_secs(10),
            navigation_settle: Duration::from_secs(8),
            trial_settle: Duration::from_secs(5),
            between_accounts: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub email: String,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<LoginOutcome>,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count() == self.outcomes.len()
    }

    /// The report text sent at the end of a run.
    pub fn report(&self) -> String {
        let total = self.outcomes.len();
        let ok = self.success_count();
        let details: Vec<String> = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| {
                format!(
                    "{} Account {}: {}",
                    if o.success { "✅" } else { "❌" },
                    i + 1,
                    o.email
                )
            })
            .collect();
        format!(
            "📊 SAP BTP login report\n\n✅ Succeeded: {ok}/{total}\n❌ Failed: {}/{total}\n\nDetails:\n{}",
            total - ok,
            details.join("\n")
        )
    }
}

pub struct LoginBot {
    notifier: Arc<dyn Notifier>,
    screenshot_dir: PathBuf,
    timings: LoginTimings,
    chain: StrategyChain,
}

impl LoginBot {
    pub fn new(notifier: Arc<dyn Notifier>, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self::with_timings(notifier, screenshot_dir, LoginTimings::default())
    }

    pub fn with_timings(
        notifier: Arc<dyn Notifier>,
        screenshot_dir: impl Into<PathBuf>,
        timings: LoginTimings,
    ) -> Self {
        let chain = StrategyChain::trial_entry(
            timings.trial_button_timeout,
            timings.click_settle,
            timings.navigation_settle,
        );
        Self {
            notifier,
            screenshot_dir: screenshot_dir.into(),
            timings,
            chain,
        }
    }

    pub fn screenshot_path(&self, kind: &str, number: usize) -> PathBuf {
        self.screenshot_dir.join(format!("{kind}-{number}.png"))
    }

    /// Log every account in, strictly one at a time, then send the report.
    pub async fn run(&self, source: &dyn PageSource, accounts: &[Account]) -> RunSummary {
        info!(accounts = accounts.len(), "🔍 starting login run");
        let mut summary = RunSummary::default();

        for (index, account) in accounts.iter().enumerate() {
            let number = index + 1;
            info!(number, "📝 processing account");

            let success = match source.open_page().await {
                Ok(page) => {
                    let success = self.login_account(page.as_page(), account, number).await;
                    page.close().await;
                    success
                }
                Err(e) => {
                    error!(number, error = %e, "could not open a browser context");
                    false
                }
            };
            summary.outcomes.push(LoginOutcome {
                email: account.email.clone(),
                success,
            });

            if number < accounts.len() {
                info!(delay = ?self.timings.between_accounts, "⏳ waiting before next account");
                tokio::time::sleep(self.timings.between_accounts).await;
            }
        }

        self.send_report(&summary).await;
        info!(
            succeeded = summary.success_count(),
            total = summary.outcomes.len(),
            "🎯 login run finished"
        );
        summary
    }

    async fn send_report(&self, summary: &RunSummary) {
        if summary.outcomes.is_empty() {
            return;
        }
        let report = summary.report();
        let photo = match summary.outcomes.iter().position(|o| o.success) {
            Some(i) => Some(self.screenshot_path("trial-account", i + 1)),
            None => Some(self.screenshot_path("error", 1)).filter(|p| p.exists()),
        };
        match photo {
            Some(photo) => self.notifier.announce_photo(&photo, &report).await,
            None => self.notifier.announce(&report).await,
        }
    }

    /// Run the full flow for one account. Failures are photographed and
    /// reported, never propagated.
    #[instrument(skip(self, page, account), fields(email = %account.email))]
    pub async fn login_account(&self, page: &dyn BrowserPage, account: &Account, number: usize) -> bool {
        match self.try_login(page, account, number).await {
            Ok(()) => {
                info!("🎉 login flow complete");
                true
            }
            Err(e) => {
                error!(error = %e, "❌ login or trial entry failed");
                let path = self.screenshot_path("error", number);
                match page.screenshot(&path).await {
                    Ok(()) => {
                        let caption = format!(
                            "❌ [Account {number}] SAP BTP login failed\nEmail: {}\nError: {e}",
                            account.email
                        );
                        self.notifier.announce_photo(&path, &caption).await;
                    }
                    Err(shot) => warn!(error = %shot, "📷 failed to capture error screenshot"),
                }
                false
            }
        }
    }

    async fn try_login(&self, page: &dyn BrowserPage, account: &Account, number: usize) -> Result<()> {
        info!("🌐 opening SAP BTP login page");
        page.goto(LOGIN_URL).await?;

        info!("✉️ entering email");
        Locator::new(EMAIL_INPUT).fill(page, &account.email).await?;
        Locator::new(EMAIL_SUBMIT).click(page).await?;

        let password = Locator::new(PASSWORD_INPUT).set_default_timeout(self.timings.password_timeout);
        password.wait(page, None).await?;
        info!("🔑 entering password");
        password.fill(page, &account.password).await?;
        Locator::new(PASSWORD_SUBMIT).click(page).await?;

        info!("⏳ waiting for login to complete");
        tokio::time::sleep(self.timings.after_login).await;
        let url = page.current_url().await?;
        info!(%url, "🔗 URL after login");

        let shot = self.screenshot_path("login-success", number);
        page.screenshot(&shot).await?;
        self.notifier
            .announce_photo(
                &shot,
                &format!("✅ [Account {number}] SAP BTP login succeeded\nEmail: {}", account.email),
            )
            .await;

        self.dismiss_consent(page).await;

        let via = self.chain.run(page).await?;
        tokio::time::sleep(self.timings.trial_settle).await;
        let shot = self.screenshot_path("trial-account", number);
        page.screenshot(&shot).await?;
        self.notifier
            .announce_photo(
                &shot,
                &format!(
                    "✅ [Account {number}] entered the SAP BTP trial account ({via})\nEmail: {}",
                    account.email
                ),
            )
            .await;
        Ok(())
    }

    async fn dismiss_consent(&self, page: &dyn BrowserPage) {
        let consent = Locator::new(CONSENT_BUTTON);
        match consent.is_present(page).await {
            Ok(true) => {
                info!("👉 closing consent banner");
                if let Err(e) = page.click(consent.selector()).await {
                    info!(error = %e, "could not close consent banner");
                    return;
                }
                tokio::time::sleep(self.timings.consent_settle).await;
            }
            Ok(false) => {}
            Err(e) => info!(error = %e, "consent banner check failed"),
        }
    }
}
