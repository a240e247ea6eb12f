//! Cloud Foundry v3 API client
//!
//! `CfClient::login` exchanges account credentials for a bearer token at the
//! region's UAA and returns a `CfSession`, which implements [`AppController`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::Account;
use crate::errors::{truncate_body, KeepaliveError, Result};
use crate::region::Region;

pub const STATE_STARTED: &str = "STARTED";
pub const INSTANCE_RUNNING: &str = "RUNNING";
const NOT_AVAILABLE: &str = "N/A";

/// Memory, disk, org and space of an app, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppMetadata {
    pub memory: String,
    pub disk: String,
    pub org: String,
    pub space: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            memory: NOT_AVAILABLE.to_string(),
            disk: NOT_AVAILABLE.to_string(),
            org: NOT_AVAILABLE.to_string(),
            space: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Operations on the apps of one authenticated region.
#[async_trait]
pub trait AppController: Send + Sync {
    async fn app_guid(&self, name: &str) -> Result<String>;

    async fn metadata(&self, app_guid: &str) -> AppMetadata;

    async fn app_state(&self, app_guid: &str) -> Result<String>;

    async fn web_process_guid(&self, app_guid: &str) -> Result<String>;

    async fn instance_states(&self, process_guid: &str) -> Result<Vec<String>>;

    /// Restart the app, falling back to a plain start when restart is refused.
    async fn restart(&self, app_guid: &str) -> Result<()>;
}

/// Authenticates against a region and hands out controllers.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self, region: &Region) -> Result<Arc<dyn AppController>>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    resources: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ToOne {
    data: Option<Guid>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    #[serde(default)]
    guid: String,
    state: Option<String>,
    #[serde(default)]
    relationships: AppRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct AppRelationships {
    #[serde(default)]
    space: ToOne,
}

#[derive(Debug, Deserialize)]
struct ProcessResource {
    guid: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    memory_in_mb: u64,
    #[serde(default)]
    disk_in_mb: u64,
}

#[derive(Debug, Deserialize)]
struct SpaceResource {
    name: String,
    #[serde(default)]
    relationships: SpaceRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct SpaceRelationships {
    #[serde(default)]
    organization: ToOne,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InstanceStat {
    state: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Unauthenticated entry point; owns the HTTP client and the credentials.
#[derive(Clone)]
pub struct CfClient {
    http: reqwest::Client,
    credentials: Account,
}

impl CfClient {
    pub fn new(http: reqwest::Client, credentials: Account) -> Self {
        Self { http, credentials }
    }

    /// OAuth password grant against `{uaa}/oauth/token`.
    #[instrument(skip(self, region), fields(email = %self.credentials.email, region = %region.code))]
    pub async fn login(&self, region: &Region) -> Result<CfSession> {
        info!(uaa = %region.uaa_url, "requesting UAA token");
        let response = self
            .http
            .post(format!("{}/oauth/token", region.uaa_url))
            .basic_auth("cf", Some(""))
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.email.as_str()),
                ("password", self.credentials.password.as_str()),
                ("response_type", "token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), body = %truncate_body(&text), "UAA response");
        if !status.is_success() {
            return Err(KeepaliveError::Auth(format!(
                "UAA token error: {} {}",
                status.as_u16(),
                truncate_body(&text)
            )));
        }
        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| KeepaliveError::Auth(format!("malformed UAA response: {e}")))?;

        Ok(CfSession::new(
            self.http.clone(),
            region.api_url.clone(),
            token.access_token,
        ))
    }
}

#[async_trait]
impl PlatformConnector for CfClient {
    async fn connect(&self, region: &Region) -> Result<Arc<dyn AppController>> {
        Ok(Arc::new(self.login(region).await?))
    }
}

/// A bearer token bound to one region's API.
#[derive(Clone)]
pub struct CfSession {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl CfSession {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn decode<T: DeserializeOwned>(
        method: &'static str,
        url: String,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(KeepaliveError::Api {
                method,
                status: status.as_u16(),
                url,
                body: truncate_body(&text),
            });
        }
        let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        Self::decode("GET", url, response).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, payload: Option<&serde_json::Value>) -> Result<T> {
        let url = self.url(path);
        let mut request = self.http.post(&url).bearer_auth(&self.token);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let response = request.send().await?;
        Self::decode("POST", url, response).await
    }

    async fn processes(&self, app_guid: &str) -> Result<Vec<ProcessResource>> {
        let page: Page<ProcessResource> = self.get(&format!("/v3/apps/{app_guid}/processes")).await?;
        Ok(page.resources)
    }

    async fn try_metadata(&self, app_guid: &str) -> Result<AppMetadata> {
        let processes = self.processes(app_guid).await?;
        let web = processes.iter().find(|p| p.kind == "web");
        let memory = format!("{} MB", web.map(|p| p.memory_in_mb).unwrap_or(0));
        let disk = format!("{} MB", web.map(|p| p.disk_in_mb).unwrap_or(0));

        let app: AppResource = self.get(&format!("/v3/apps/{app_guid}")).await?;
        let Some(space) = app.relationships.space.data else {
            return Ok(AppMetadata {
                memory,
                disk,
                ..AppMetadata::default()
            });
        };

        let space: SpaceResource = self.get(&format!("/v3/spaces/{}", space.guid)).await?;
        let org = match space.relationships.organization.data {
            Some(org) => {
                let org: NamedResource = self.get(&format!("/v3/organizations/{}", org.guid)).await?;
                org.name
            }
            None => NOT_AVAILABLE.to_string(),
        };

        Ok(AppMetadata {
            memory,
            disk,
            org,
            space: space.name,
        })
    }
}

#[async_trait]
impl AppController for CfSession {
    async fn app_guid(&self, name: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.url("/v3/apps"), &[("names", name)])
            .map_err(|e| KeepaliveError::Config(format!("invalid CF API url: {e}")))?;
        let response = self.http.get(url.clone()).bearer_auth(&self.token).send().await?;
        let page: Page<AppResource> = Self::decode("GET", url.to_string(), response).await?;
        page.resources
            .into_iter()
            .next()
            .map(|app| app.guid)
            .ok_or_else(|| KeepaliveError::AppNotFound(name.to_string()))
    }

    async fn metadata(&self, app_guid: &str) -> AppMetadata {
        match self.try_metadata(app_guid).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(app_guid, error = %e, "failed to fetch app metadata");
                AppMetadata::default()
            }
        }
    }

    async fn app_state(&self, app_guid: &str) -> Result<String> {
        let app: AppResource = self.get(&format!("/v3/apps/{app_guid}")).await?;
        Ok(app.state.unwrap_or_else(|| "UNKNOWN".to_string()))
    }

    async fn web_process_guid(&self, app_guid: &str) -> Result<String> {
        let processes = self.processes(app_guid).await?;
        let index = processes.iter().position(|p| p.kind == "web").unwrap_or(0);
        processes
            .into_iter()
            .nth(index)
            .map(|p| p.guid)
            .ok_or_else(|| KeepaliveError::AppNotFound(format!("web process of app {app_guid}")))
    }

    async fn instance_states(&self, process_guid: &str) -> Result<Vec<String>> {
        let page: Page<InstanceStat> = self.get(&format!("/v3/processes/{process_guid}/stats")).await?;
        Ok(page.resources.into_iter().filter_map(|s| s.state).collect())
    }

    #[instrument(skip(self))]
    async fn restart(&self, app_guid: &str) -> Result<()> {
        match self
            .post::<serde_json::Value>(&format!("/v3/apps/{app_guid}/actions/restart"), None)
            .await
        {
            Ok(_) => {
                info!("restart request accepted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "restart refused, sending start instead");
                self.post::<serde_json::Value>(&format!("/v3/apps/{app_guid}/actions/start"), None)
                    .await?;
                info!("start request accepted");
                Ok(())
            }
        }
    }
}
