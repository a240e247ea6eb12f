//! Keeping SAP BTP trial accounts and their Cloud Foundry apps alive
//!
//! Two halves share this crate:
//!
//! * the keepalive worker: probe app URLs and restart dead apps through the
//!   CF v3 API ([`monitor::Orchestrator`], [`dispatch::RestartDispatcher`]);
//! * the login bot: drive a headless Chromium over DevTools through the SAP
//!   login and into the trial account ([`login::LoginBot`]).
//!
//! Both report to Telegram through the [`notifier::Notifier`] seam.

pub mod browser;
pub mod cdp;
pub mod cf;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod locator;
pub mod logging;
pub mod login;
pub mod monitor;
pub mod notifier;
pub mod page;
pub mod region;
pub mod retry;
pub mod selector;
pub mod strategy;

pub use browser::{Browser, CdpPage, LaunchOptions};
pub use cf::{AppController, AppMetadata, CfClient, CfSession, PlatformConnector};
pub use config::{parse_accounts, parse_app_urls, Account, MonitoredApp, TelegramConfig, WorkerConfig};
pub use dispatch::{RestartCompletion, RestartDispatcher};
pub use errors::{KeepaliveError, Result};
pub use locator::Locator;
pub use logging::init_logging;
pub use login::{LoginBot, LoginOutcome, LoginTimings, RunSummary};
pub use monitor::{AppStatus, HealthProbe, HttpProbe, Orchestrator, RestartResult, RestartStatus, Timings};
pub use notifier::{notifier_from_config, NoopNotifier, Notifier, TelegramNotifier};
pub use page::{BrowserPage, ClosablePage, ElementState, PageSource};
pub use region::{detect_region_from_url, Region, RegionCode, RegionTable};
pub use retry::{PollOutcome, RetryPolicy, SleepOrder};
pub use selector::Selector;
pub use strategy::{StrategyChain, TrialEntryStrategy};
