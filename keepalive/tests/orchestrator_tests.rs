mod common;

use async_trait::async_trait;
use common::RecordingNotifier;
use keepalive::{
    Account, AppController, AppMetadata, HealthProbe, KeepaliveError, Orchestrator, PlatformConnector,
    Region, RegionTable, RestartDispatcher, RestartStatus, Result, WorkerConfig,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const AP_APP: &str = "https://shop.cfapps.ap21.hana.ondemand.com";
const AP_APP_2: &str = "https://blog.cfapps.ap21.hana.ondemand.com";
const EU_APP: &str = "https://api.cfapps.eu10.hana.ondemand.com";

/// Answers probes from a script; the last answer repeats.
struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn new(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn is_healthy(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().copied().unwrap_or(false)
        }
    }
}

fn next_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front().unwrap()
    } else {
        queue.front().cloned().unwrap()
    }
}

struct FakeController {
    states: Mutex<VecDeque<String>>,
    instances: Mutex<VecDeque<Vec<String>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeController {
    fn new(states: &[&str], instances: &[&[&str]]) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.iter().map(|s| s.to_string()).collect()),
            instances: Mutex::new(
                instances
                    .iter()
                    .map(|list| list.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AppController for FakeController {
    async fn app_guid(&self, name: &str) -> Result<String> {
        self.record(format!("guid {name}"));
        Ok(format!("{name}-guid"))
    }

    async fn metadata(&self, app_guid: &str) -> AppMetadata {
        self.record(format!("metadata {app_guid}"));
        AppMetadata {
            memory: "256 MB".to_string(),
            disk: "1024 MB".to_string(),
            org: "trial".to_string(),
            space: "dev".to_string(),
        }
    }

    async fn app_state(&self, app_guid: &str) -> Result<String> {
        self.record(format!("state {app_guid}"));
        Ok(next_or_last(&self.states))
    }

    async fn web_process_guid(&self, app_guid: &str) -> Result<String> {
        self.record(format!("process {app_guid}"));
        Ok(format!("{app_guid}-web"))
    }

    async fn instance_states(&self, process_guid: &str) -> Result<Vec<String>> {
        self.record(format!("stats {process_guid}"));
        Ok(next_or_last(&self.instances))
    }

    async fn restart(&self, app_guid: &str) -> Result<()> {
        self.record(format!("restart {app_guid}"));
        Ok(())
    }
}

struct FakeConnector {
    controller: Arc<FakeController>,
    connects: AtomicUsize,
}

impl FakeConnector {
    fn new(controller: Arc<FakeController>) -> Arc<Self> {
        Arc::new(Self {
            controller,
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect(&self, _region: &Region) -> Result<Arc<dyn AppController>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.controller.clone())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    probe: Arc<ScriptedProbe>,
    controller: Arc<FakeController>,
    connector: Arc<FakeConnector>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(app_urls: &str, probe: &[bool], states: &[&str], instances: &[&[&str]]) -> Harness {
    let config = Arc::new(WorkerConfig::new(
        Account::new("a@x.com", "pw"),
        app_urls,
        RegionTable::default(),
    ));
    let probe = ScriptedProbe::new(probe);
    let controller = FakeController::new(states, instances);
    let connector = FakeConnector::new(controller.clone());
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        probe.clone(),
        connector.clone(),
        notifier.clone(),
    ));
    Harness {
        orchestrator,
        probe,
        controller,
        connector,
        notifier,
    }
}

#[tokio::test(start_paused = true)]
async fn test_healthy_app_makes_no_platform_calls() {
    let h = harness(AP_APP, &[true], &["STARTED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let result = h.orchestrator.ensure_app_running(&app, "test").await.unwrap();

    assert_eq!(result.status, RestartStatus::Healthy);
    assert!(result.healthy);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    assert!(h.controller.calls().is_empty());
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_down_app_is_restarted_and_verified() {
    let h = harness(
        AP_APP,
        &[false, true],
        &["STOPPED", "STARTING", "STARTED"],
        &[&["STARTING"], &["STARTING", "RUNNING"]],
    );
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let result = h.orchestrator.ensure_app_running(&app, "webhook").await.unwrap();

    assert_eq!(result.status, RestartStatus::RestartedHealthy);
    assert_eq!(result.app, "shop");
    assert!(result.healthy);
    assert_eq!(h.controller.count("restart shop-guid"), 1);
    assert_eq!(h.controller.count("state "), 3);
    assert_eq!(h.controller.count("stats shop-guid-web"), 2);
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 2);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("offline") && messages[0].contains("webhook"));
    assert!(messages[1].contains("restarted"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_that_stays_down_is_reported() {
    let h = harness(AP_APP, &[false], &["STARTED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let result = h.orchestrator.ensure_app_running(&app, "test").await.unwrap();

    assert_eq!(result.status, RestartStatus::RestartedButUnhealthy);
    assert!(!result.healthy);
    assert!(h.notifier.messages()[1].contains("still down"));
}

#[tokio::test(start_paused = true)]
async fn test_never_started_is_fatal_after_eight_polls() {
    let h = harness(AP_APP, &[false], &["STOPPED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let err = h.orchestrator.ensure_app_running(&app, "test").await.unwrap_err();

    assert!(matches!(err, KeepaliveError::Timeout(ref m) if m.contains("STOPPED")));
    assert_eq!(h.controller.count("state "), 8);
    assert_eq!(h.controller.count("stats "), 0);
    // only the offline notice went out, no restart verdict
    assert_eq!(h.notifier.messages().len(), 1);
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_instances_never_running_is_fatal_after_six_polls() {
    let h = harness(AP_APP, &[false], &["STARTED"], &[&["CRASHED"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let err = h.orchestrator.ensure_app_running(&app, "test").await.unwrap_err();

    assert!(matches!(err, KeepaliveError::Timeout(_)));
    assert_eq!(h.controller.count("stats "), 6);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_region_fails_before_authenticating() {
    let h = harness(EU_APP, &[false], &["STARTED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(EU_APP).unwrap().clone();

    let err = h.orchestrator.ensure_app_running(&app, "test").await.unwrap_err();

    assert!(matches!(err, KeepaliveError::UnknownRegion(_)));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_pass_shares_one_token_per_region() {
    let urls = format!("{AP_APP}\n{AP_APP_2}\n{EU_APP}");
    let h = harness(&urls, &[true], &["STARTED"], &[&["RUNNING"]]);

    let statuses = h.orchestrator.monitor_all("status-page").await;

    assert_eq!(statuses.len(), 3);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(statuses[0].app, "shop");
    assert_eq!(statuses[0].memory, "256 MB");
    assert_eq!(statuses[1].org, "trial");
    assert_eq!(statuses[2].region, None);
    assert_eq!(statuses[2].org, "N/A");
    assert!(statuses.iter().all(|s| s.healthy));
    assert_eq!(h.controller.count("restart"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_reports_failures_to_notifier() {
    let h = harness(AP_APP, &[false], &["STOPPED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let (dispatcher, reporter) = RestartDispatcher::start(h.orchestrator.clone());
    dispatcher.dispatch(app, "webhook-trigger").await.unwrap();
    drop(dispatcher);
    reporter.await.unwrap();

    let messages = h.notifier.messages();
    let last = messages.last().unwrap();
    assert!(last.contains("Webhook restart failed"));
    assert!(last.contains("shop"));
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_stays_quiet_on_success() {
    let h = harness(AP_APP, &[true], &["STARTED"], &[&["RUNNING"]]);
    let app = h.orchestrator.config().find_app(AP_APP).unwrap().clone();

    let (dispatcher, reporter) = RestartDispatcher::start(h.orchestrator.clone());
    dispatcher.dispatch(app, "webhook-trigger").await.unwrap();
    drop(dispatcher);
    reporter.await.unwrap();

    // just the orchestrator's own "healthy" notice
    assert_eq!(h.notifier.messages().len(), 1);
}
