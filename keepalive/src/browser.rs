//! Headless Chromium driven over DevTools
//!
//! `Browser::launch` starts a Chromium child process with a throwaway profile
//! and connects to its DevTools endpoint. Every login gets a fresh [`CdpPage`]:
//! one tab in its own incognito-like browser context, disposed on close.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cdp::CdpConnection;
use crate::errors::{KeepaliveError, Result};
use crate::page::{BrowserPage, ClosablePage, ElementState, PageSource};
use crate::selector::{Selector, IS_VISIBLE_JS};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const DEVTOOLS_BANNER: &str = "DevTools listening on ";

const CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Explicit browser binary; searched in well-known locations when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window_size: (1280, 800),
        }
    }
}

/// Locate a Chromium binary, preferring `explicit` when given.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(KeepaliveError::Config(format!(
                "browser executable not found: {}",
                path.display()
            )))
        };
    }
    CHROME_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            KeepaliveError::Config("no Chrome/Chromium found, set CHROME_PATH".to_string())
        })
}

pub struct Browser {
    child: Child,
    connection: Arc<CdpConnection>,
    options: LaunchOptions,
    _profile: TempDir,
}

impl Browser {
    #[instrument(skip(options))]
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let executable = find_chrome(options.executable.as_deref())?;
        let profile = tempfile::Builder::new().prefix("trial-login-").tempdir()?;
        info!(executable = %executable.display(), "🚀 launching browser");

        let mut command = Command::new(&executable);
        if options.headless {
            command.arg("--headless=new");
        }
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!(
                "--window-size={},{}",
                options.window_size.0, options.window_size.1
            ))
            .args([
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--no-first-run",
                "--no-default-browser-check",
                "about:blank",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| KeepaliveError::Browser("browser stderr unavailable".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(LAUNCH_TIMEOUT, read_devtools_url(&mut lines))
            .await
            .map_err(|_| KeepaliveError::Timeout("waiting for browser DevTools endpoint".to_string()))??;

        // keep draining stderr so the child never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%line, "browser stderr");
            }
        });

        let connection = Arc::new(CdpConnection::connect(&ws_url).await?);
        info!(%ws_url, "browser ready");
        Ok(Self {
            child,
            connection,
            options,
            _profile: profile,
        })
    }

    /// Open a blank tab in a new isolated context.
    pub async fn new_page(&self) -> Result<CdpPage> {
        let created = self
            .connection
            .call("Target.createBrowserContext", json!({ "disposeOnDetach": true }), None)
            .await?;
        let context_id = string_field(&created, "browserContextId")?;

        let target = self
            .connection
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": context_id }),
                None,
            )
            .await?;
        let target_id = string_field(&target, "targetId")?;

        let attached = self
            .connection
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        let page = CdpPage {
            connection: self.connection.clone(),
            session_id,
            context_id,
        };
        page.send("Page.enable", json!({})).await?;
        page.send(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": self.options.window_size.0,
                "height": self.options.window_size.1,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;

        debug!(context_id = %page.context_id, "browser context created");
        Ok(page)
    }

    pub async fn close(mut self) {
        if let Err(e) = self.connection.call("Browser.close", json!({}), None).await {
            debug!(error = %e, "Browser.close failed, killing process");
        }
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(_) => info!("browser closed"),
            Err(_) => {
                warn!("browser did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }
    }
}

async fn read_devtools_url(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = line.trim().strip_prefix(DEVTOOLS_BANNER) {
            return Ok(url.to_string());
        }
        debug!(%line, "browser stderr");
    }
    Err(KeepaliveError::Browser(
        "browser exited before opening DevTools".to_string(),
    ))
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KeepaliveError::Browser(format!("missing `{field}` in DevTools response")))
}

pub struct CdpPage {
    connection: Arc<CdpConnection>,
    session_id: String,
    context_id: String,
}

impl CdpPage {
    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.connection
            .call(method, params, Some(&self.session_id))
            .await
    }

    /// Evaluate `expression` in the page and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let reply = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = reply.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script exception");
            return Err(KeepaliveError::Browser(format!("evaluate: {text}")));
        }
        Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_load(&self) -> Result<()> {
        let deadline = Instant::now() + NAVIGATION_TIMEOUT;
        loop {
            // evaluation fails while the old document is being torn down
            if let Ok(Value::String(state)) = self.evaluate("document.readyState").await {
                if state == "complete" {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(KeepaliveError::Timeout(format!(
                    "page load after {NAVIGATION_TIMEOUT:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn with_element(&self, selector: &Selector, body: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const e = {}; if (!e) return false; {} return true; }})()",
            selector.to_js(),
            body
        );
        match self.evaluate(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(KeepaliveError::ElementNotFound(selector.to_string())),
        }
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    #[instrument(skip(self))]
    async fn goto(&self, url: &str) -> Result<()> {
        let reply = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = reply.get("errorText").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(KeepaliveError::Browser(format!("navigate {url}: {error}")));
            }
        }
        self.wait_for_load().await
    }

    async fn current_url(&self) -> Result<String> {
        match self.evaluate("window.location.href").await? {
            Value::String(url) => Ok(url),
            other => Err(KeepaliveError::Browser(format!("unexpected location: {other}"))),
        }
    }

    async fn query(&self, selector: &Selector) -> Result<ElementState> {
        let script = format!(
            "(() => {{ const e = {}; if (!e) return 'missing'; return ({})(e) ? 'visible' : 'hidden'; }})()",
            selector.to_js(),
            IS_VISIBLE_JS
        );
        match self.evaluate(&script).await?.as_str() {
            Some("visible") => Ok(ElementState::Visible),
            Some("hidden") => Ok(ElementState::Hidden),
            _ => Ok(ElementState::Missing),
        }
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<()> {
        self.with_element(
            selector,
            "e.scrollIntoView({block: 'center'}); e.focus(); \
             if (typeof e.select === 'function') e.select(); \
             e.value = ''; e.dispatchEvent(new Event('input', {bubbles: true}));",
        )
        .await?;
        self.send("Input.insertText", json!({ "text": value })).await?;
        self.with_element(
            selector,
            "e.dispatchEvent(new Event('change', {bubbles: true}));",
        )
        .await
    }

    async fn click(&self, selector: &Selector) -> Result<()> {
        self.with_element(
            selector,
            "e.scrollIntoView({block: 'center'}); e.click();",
        )
        .await
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn screenshot(&self, path: &Path) -> Result<()> {
        let reply = self
            .send(
                "Page.captureScreenshot",
                json!({ "format": "png", "captureBeyondViewport": true }),
            )
            .await?;
        let data = reply
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| KeepaliveError::Browser("screenshot returned no data".to_string()))?;
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| KeepaliveError::Browser(format!("screenshot decode: {e}")))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        info!("📸 screenshot saved");
        Ok(())
    }
}

#[async_trait]
impl ClosablePage for CdpPage {
    fn as_page(&self) -> &dyn BrowserPage {
        self
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self
            .connection
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
            )
            .await
        {
            warn!(error = %e, "failed to dispose browser context");
        }
    }
}

#[async_trait]
impl PageSource for Browser {
    async fn open_page(&self) -> Result<Box<dyn ClosablePage>> {
        Ok(Box::new(self.new_page().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_executable_is_config_error() {
        let err = find_chrome(Some(Path::new("/nonexistent/chrome"))).unwrap_err();
        assert!(matches!(err, KeepaliveError::Config(_)));
    }

    #[test]
    fn test_explicit_existing_executable_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(find_chrome(Some(file.path())).unwrap(), file.path());
    }
}
