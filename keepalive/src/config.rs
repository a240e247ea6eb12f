//! Account, app list and worker configuration
//!
//! Everything here is built once from CLI flags / environment and then only
//! read. Binaries wrap the resulting values in an `Arc` and hand them to each
//! request.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::errors::{KeepaliveError, Result};
use crate::region::{RegionCode, RegionTable};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Login credentials of one SAP account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl Account {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Parse the `SAP_ACCOUNTS` value.
///
/// Accepts either a JSON array (`[{"email": "...", "password": "..."}]`) or
/// `email:password` pairs separated by `;`. Pairs are split on the first `:`,
/// so passwords may contain colons. Yields an error when nothing usable is
/// found.
pub fn parse_accounts(raw: &str) -> Result<Vec<Account>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(KeepaliveError::Config(
            "SAP_ACCOUNTS is not set or empty".to_string(),
        ));
    }

    let accounts: Vec<Account> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<Account>>(raw)
            .map_err(|e| KeepaliveError::Config(format!("failed to parse SAP_ACCOUNTS: {e}")))?
            .into_iter()
            .filter(|a| !a.email.trim().is_empty() && !a.password.trim().is_empty())
            .collect()
    } else {
        raw.split(';')
            .filter(|pair| !pair.trim().is_empty())
            .filter_map(|pair| {
                let (email, password) = pair.split_once(':')?;
                let (email, password) = (email.trim(), password.trim());
                (!email.is_empty() && !password.is_empty()).then(|| Account::new(email, password))
            })
            .collect()
    };

    if accounts.is_empty() {
        return Err(KeepaliveError::Config(
            "no valid account found in SAP_ACCOUNTS".to_string(),
        ));
    }
    Ok(accounts)
}

/// One application watched by the keepalive worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredApp {
    pub url: String,
    pub name: String,
    pub region: Option<RegionCode>,
}

impl MonitoredApp {
    /// Build from a public URL; the app name is the first hostname label.
    pub fn from_url(url: &str, regions: &RegionTable) -> Option<Self> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let name = parsed.host_str()?.split('.').next()?.to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            name,
            region: regions.detect(url).map(|r| r.code),
        })
    }
}

/// Parse the newline separated `APP_URLS` value. Lines not starting with
/// `http` are ignored.
pub fn parse_app_urls(raw: &str, regions: &RegionTable) -> Vec<MonitoredApp> {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http"))
        .filter_map(|url| {
            let app = MonitoredApp::from_url(url, regions);
            if app.is_none() {
                warn!(url, "cannot extract app name from URL, skipping");
            }
            app
        })
        .collect()
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl TelegramConfig {
    /// Returns `None` unless both values are present and not placeholders.
    pub fn from_parts(bot_token: Option<String>, chat_id: Option<String>) -> Option<Self> {
        let bot_token = bot_token.filter(|t| !t.trim().is_empty() && t != "your-telegram-bot-token")?;
        let chat_id = chat_id.filter(|c| !c.trim().is_empty() && c != "your-chat-id")?;
        Some(Self {
            bot_token,
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration of the keepalive worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub credentials: Account,
    pub apps: Vec<MonitoredApp>,
    pub regions: RegionTable,
    pub telegram: Option<TelegramConfig>,
}

impl WorkerConfig {
    pub fn new(credentials: Account, app_urls: &str, regions: RegionTable) -> Self {
        let apps = parse_app_urls(app_urls, &regions);
        if apps.is_empty() {
            warn!("APP_URLS is empty, no application will be monitored");
        }
        Self {
            credentials,
            apps,
            regions,
            telegram: None,
        }
    }

    pub fn with_telegram(mut self, telegram: Option<TelegramConfig>) -> Self {
        self.telegram = telegram;
        self
    }

    pub fn find_app(&self, url: &str) -> Option<&MonitoredApp> {
        self.apps.iter().find(|app| app.url == url)
    }
}
