//! Fire-and-forget restarts
//!
//! The webhook answers before the restart sequence finishes. Each dispatched
//! restart runs on its own task and reports its outcome on a channel; a
//! single reporter task logs every outcome and notifies failures.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::MonitoredApp;
use crate::monitor::{Orchestrator, RestartResult};
use crate::notifier::Notifier;

#[derive(Debug)]
pub struct RestartCompletion {
    pub app: MonitoredApp,
    pub outcome: Result<RestartResult, String>,
}

#[derive(Clone)]
pub struct RestartDispatcher {
    orchestrator: Arc<Orchestrator>,
    completions: mpsc::UnboundedSender<RestartCompletion>,
}

impl RestartDispatcher {
    /// Create a dispatcher and start its reporter task.
    pub fn start(orchestrator: Arc<Orchestrator>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report_completions(rx, orchestrator.notifier()));
        (
            Self {
                orchestrator,
                completions: tx,
            },
            reporter,
        )
    }

    /// Spawn the restart sequence for `app` and return immediately.
    pub fn dispatch(&self, app: MonitoredApp, reason: &'static str) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let completions = self.completions.clone();
        info!(app = %app.name, reason, "dispatching background restart");

        tokio::spawn(async move {
            let outcome = orchestrator
                .ensure_app_running(&app, reason)
                .await
                .map_err(|e| e.to_string());
            if completions.send(RestartCompletion { app, outcome }).is_err() {
                error!("restart reporter is gone, dropping completion");
            }
        })
    }
}

async fn report_completions(
    mut rx: mpsc::UnboundedReceiver<RestartCompletion>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(completion) = rx.recv().await {
        match completion.outcome {
            Ok(result) => {
                info!(app = %completion.app.name, status = ?result.status, "webhook restart finished");
            }
            Err(e) => {
                error!(app = %completion.app.name, error = %e, "webhook restart failed");
                notifier
                    .announce(&format!(
                        "❌ *Webhook restart failed*\n\nApp: {}\nError: {}",
                        completion.app.name, e
                    ))
                    .await;
            }
        }
    }
}
