//! Health checks and the restart state machine
//!
//! `Orchestrator::ensure_app_running` probes an app and, when it is down,
//! drives it back up through the platform API:
//!
//! ```text
//! probe ─ok──▶ healthy
//!   │
//!   └─down──▶ restart ─▶ wait STARTED ─▶ wait RUNNING ─▶ settle ─▶ probe
//!                                                                   ├─ok──▶ restarted_healthy
//!                                                                   └─down─▶ restarted_but_unhealthy
//! ```

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::cf::{AppController, AppMetadata, PlatformConnector, INSTANCE_RUNNING, STATE_STARTED};
use crate::config::{MonitoredApp, WorkerConfig};
use crate::errors::{KeepaliveError, Result};
use crate::notifier::Notifier;
use crate::region::RegionCode;
use crate::retry::{PollOutcome, RetryPolicy};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Decides whether an app's public URL is serving.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, url: &str) -> bool;
}

/// GET with a timeout; only a 200 counts as healthy.
pub struct HttpProbe {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_healthy(&self, url: &str) -> bool {
        match self.http.get(url).timeout(self.timeout).send().await {
            Ok(response) => {
                info!(url, status = response.status().as_u16(), "app check");
                response.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                info!(url, error = %e, "app check failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStatus {
    Healthy,
    RestartedHealthy,
    RestartedButUnhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartResult {
    pub app: String,
    pub status: RestartStatus,
    pub url: String,
    pub healthy: bool,
}

/// One row of the status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    pub app: String,
    pub url: String,
    pub healthy: bool,
    pub region: Option<RegionCode>,
    pub org: String,
    pub space: String,
    pub memory: String,
    pub disk: String,
}

/// Delays and poll limits of the restart sequence.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub wait_started: RetryPolicy,
    pub wait_running: RetryPolicy,
    pub settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            wait_started: RetryPolicy::new(8, Duration::from_secs(2), 1.6, Duration::from_secs(15))
                .sleep_first(),
            wait_running: RetryPolicy::new(6, Duration::from_secs(2), 1.6, Duration::from_secs(10)),
            settle: Duration::from_secs(5),
        }
    }
}

/// Wall-clock time in Asia/Shanghai (UTC+8), as shown in notifications.
pub fn shanghai_time() -> String {
    (Utc::now().naive_utc() + chrono::Duration::hours(8))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn healthy_message(app: &MonitoredApp) -> String {
    format!(
        "👍 *SAP app is healthy*\n\nApp: {}\nURL: {}\nTime: {}\n\nNo restart needed",
        app.name,
        app.url,
        shanghai_time()
    )
}

fn offline_message(app: &MonitoredApp, reason: &str) -> String {
    format!(
        "⚠️ *SAP app offline*\n\nApp: {}\nURL: {}\nReason: {}\nTime: {}\n\nTrying to restart...",
        app.name,
        app.url,
        reason,
        shanghai_time()
    )
}

fn restarted_message(app: &MonitoredApp, healthy: bool) -> String {
    let title = if healthy {
        "✅ *SAP app restarted*"
    } else {
        "❌ *SAP app restart failed (URL still down)*"
    };
    format!(
        "{}\n\nApp: {}\nURL: {}\nTime: {}",
        title,
        app.name,
        app.url,
        shanghai_time()
    )
}

pub struct Orchestrator {
    config: Arc<WorkerConfig>,
    probe: Arc<dyn HealthProbe>,
    connector: Arc<dyn PlatformConnector>,
    notifier: Arc<dyn Notifier>,
    timings: Timings,
}

impl Orchestrator {
    pub fn new(
        config: Arc<WorkerConfig>,
        probe: Arc<dyn HealthProbe>,
        connector: Arc<dyn PlatformConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            probe,
            connector,
            notifier,
            timings: Timings::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    async fn controller_for(&self, app: &MonitoredApp) -> Result<Arc<dyn AppController>> {
        let region = app
            .region
            .and_then(|code| self.config.regions.get(code))
            .ok_or_else(|| KeepaliveError::UnknownRegion(app.url.clone()))?;
        info!(app = %app.name, region = %region.code, "resolved region");
        self.connector.connect(region).await
    }

    /// Bring one app back to a serving state.
    ///
    /// A healthy app is left alone and touches no platform API.
    #[instrument(skip(self, app), fields(app = %app.name))]
    pub async fn ensure_app_running(&self, app: &MonitoredApp, reason: &str) -> Result<RestartResult> {
        info!(reason, url = %app.url, "🔍 checking app");

        if self.probe.is_healthy(&app.url).await {
            info!("app answered 200, no restart needed");
            self.notifier.announce(&healthy_message(app)).await;
            return Ok(RestartResult {
                app: app.name.clone(),
                status: RestartStatus::Healthy,
                url: app.url.clone(),
                healthy: true,
            });
        }

        self.notifier.announce(&offline_message(app, reason)).await;
        warn!("app is down, starting restart sequence");

        let controller = self.controller_for(app).await?;
        let app_guid = controller.app_guid(&app.name).await?;
        info!(%app_guid, "resolved app guid");
        let process_guid = controller.web_process_guid(&app_guid).await?;

        info!("🔄 restarting app");
        controller.restart(&app_guid).await?;

        self.wait_started(controller.as_ref(), &app_guid).await?;
        self.wait_running(controller.as_ref(), &process_guid).await?;

        info!("verifying app after restart");
        tokio::time::sleep(self.timings.settle).await;

        let healthy = self.probe.is_healthy(&app.url).await;
        let status = if healthy {
            info!("✅ app restarted and serving");
            RestartStatus::RestartedHealthy
        } else {
            warn!("app restarted but URL is still failing");
            RestartStatus::RestartedButUnhealthy
        };
        self.notifier.announce(&restarted_message(app, healthy)).await;

        Ok(RestartResult {
            app: app.name.clone(),
            status,
            url: app.url.clone(),
            healthy,
        })
    }

    async fn wait_started(&self, controller: &dyn AppController, app_guid: &str) -> Result<()> {
        let outcome = self
            .timings
            .wait_started
            .poll("app state", || controller.app_state(app_guid), |state| state == STATE_STARTED)
            .await?;
        match outcome {
            PollOutcome::Reached(_) => Ok(()),
            PollOutcome::Exhausted { attempts, last } => {
                let last = last.unwrap_or_else(|| "UNKNOWN".to_string());
                error!(attempts, state = %last, "app did not reach STARTED");
                Err(KeepaliveError::Timeout(format!(
                    "app did not start in time, last state: {last}"
                )))
            }
        }
    }

    async fn wait_running(&self, controller: &dyn AppController, process_guid: &str) -> Result<()> {
        let outcome = self
            .timings
            .wait_running
            .poll(
                "process stats",
                || controller.instance_states(process_guid),
                |states| states.iter().any(|s| s == INSTANCE_RUNNING),
            )
            .await?;
        match outcome {
            PollOutcome::Reached(_) => Ok(()),
            PollOutcome::Exhausted { attempts, .. } => {
                error!(attempts, "no process instance reached RUNNING");
                Err(KeepaliveError::Timeout(
                    "process instances did not reach RUNNING in time".to_string(),
                ))
            }
        }
    }

    /// Probe every configured app and collect its metadata.
    ///
    /// Tokens are shared per region within this pass only. A failure for one
    /// app leaves its metadata at `N/A` and does not affect the others.
    #[instrument(skip(self))]
    pub async fn monitor_all(&self, reason: &str) -> Vec<AppStatus> {
        info!(apps = self.config.apps.len(), "monitor pass started");
        let mut sessions: HashMap<RegionCode, Arc<dyn AppController>> = HashMap::new();
        let mut results = Vec::with_capacity(self.config.apps.len());

        for app in &self.config.apps {
            let healthy = self.probe.is_healthy(&app.url).await;
            let metadata = match self.lookup_metadata(app, &mut sessions).await {
                Ok(meta) => meta,
                Err(e) => {
                    error!(app = %app.name, error = %e, "failed to inspect app");
                    AppMetadata::default()
                }
            };
            results.push(AppStatus {
                app: app.name.clone(),
                url: app.url.clone(),
                healthy,
                region: app.region,
                org: metadata.org,
                space: metadata.space,
                memory: metadata.memory,
                disk: metadata.disk,
            });
        }

        info!("monitor pass complete");
        results
    }

    async fn lookup_metadata(
        &self,
        app: &MonitoredApp,
        sessions: &mut HashMap<RegionCode, Arc<dyn AppController>>,
    ) -> Result<AppMetadata> {
        let code = app
            .region
            .ok_or_else(|| KeepaliveError::UnknownRegion(app.url.clone()))?;
        let controller = match sessions.get(&code) {
            Some(controller) => controller.clone(),
            None => {
                let controller = self.controller_for(app).await?;
                sessions.insert(code, controller.clone());
                controller
            }
        };
        let app_guid = controller.app_guid(&app.name).await?;
        Ok(controller.metadata(&app_guid).await)
    }
}
