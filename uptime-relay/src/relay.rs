//! Uptime Kuma webhook relay
//!
//! Validates the shared secret and the target repository, then forwards
//! "down" heartbeats (`heartbeat.status == 0`) to GitHub as a
//! `repository_dispatch` event. Every answer is JSON `{"message": ...}`.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

pub const GITHUB_API: &str = "https://api.github.com";
pub const EVENT_TYPE: &str = "service-down-alert";
const USER_AGENT: &str = "uptime-relay";

#[derive(Clone)]
pub struct RelayConfig {
    pub secret_token: Option<String>,
    pub github_token: Option<String>,
    pub github_api: String,
}

impl RelayConfig {
    pub fn new(secret_token: Option<String>, github_token: Option<String>) -> Self {
        Self {
            secret_token: secret_token.filter(|s| !s.is_empty()),
            github_token: github_token.filter(|s| !s.is_empty()),
            github_api: GITHUB_API.to_string(),
        }
    }

    pub fn with_github_api(mut self, github_api: impl Into<String>) -> Self {
        self.github_api = github_api.into().trim_end_matches('/').to_string();
        self
    }
}

pub struct Relay {
    config: RelayConfig,
    http: reqwest::Client,
}

impl Relay {
    pub fn new(config: RelayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .fallback(relay_webhook)
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RelayMessage {
    pub message: String,
}

impl RelayMessage {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug)]
pub struct RelayError {
    status: StatusCode,
    message: String,
}

impl RelayError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status, RelayMessage::new(self.message)).into_response()
    }
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Debug, Default)]
pub struct RelayQuery {
    pub token: Option<String>,
    pub user: Option<String>,
    pub repo: Option<String>,
}

impl RelayQuery {
    /// The first value of each key wins; later repeats are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "token" => &mut query.token,
                "user" => &mut query.user,
                "repo" => &mut query.repo,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

fn is_down(payload: &Value) -> bool {
    payload
        .get("heartbeat")
        .and_then(|h| h.get("status"))
        .and_then(Value::as_f64)
        == Some(0.0)
}

pub async fn relay_webhook(
    State(relay): State<Arc<Relay>>,
    method: Method,
    Query(pairs): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<RelayMessage>, RelayError> {
    if method != Method::POST {
        return Err(RelayError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "only POST requests are accepted",
        ));
    }
    let query = RelayQuery::from_pairs(pairs);

    let Some(secret) = relay.config.secret_token.as_deref() else {
        error!("SECRET_TOKEN is not set, rejecting every request");
        return Err(RelayError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server security configuration is incomplete",
        ));
    };

    if query.token.as_deref() != Some(secret) {
        error!("authentication failed: token mismatch");
        return Err(RelayError::new(
            StatusCode::UNAUTHORIZED,
            "invalid authentication token",
        ));
    }

    let (user, repo) = match (
        query.user.filter(|u| !u.is_empty()),
        query.repo.filter(|r| !r.is_empty()),
    ) {
        (Some(user), Some(repo)) => (user, repo),
        _ => {
            let message = r#"webhook URL is missing the "user" or "repo" query parameter"#;
            error!("{}", message);
            return Err(RelayError::new(StatusCode::BAD_REQUEST, message));
        }
    };

    let Some(github_token) = relay.config.github_token.as_deref() else {
        error!("GITHUB_TOKEN is not set");
        return Err(RelayError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server configuration error",
        ));
    };

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| RelayError::new(StatusCode::BAD_REQUEST, "invalid JSON body"))?;

    if !is_down(&payload) {
        info!("not a down event, ignoring");
        return Ok(RelayMessage::new("event ignored (not a down status)"));
    }

    let monitor = payload
        .get("monitor")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(%monitor, %user, %repo, "🔻 service is down, forwarding to GitHub");

    forward(&relay, github_token, &user, &repo, &payload).await?;
    Ok(RelayMessage::new(format!(
        "webhook forwarded to {user}/{repo}"
    )))
}

#[instrument(skip(relay, github_token, payload))]
async fn forward(
    relay: &Relay,
    github_token: &str,
    user: &str,
    repo: &str,
    payload: &Value,
) -> Result<(), RelayError> {
    let url = format!("{}/repos/{user}/{repo}/dispatches", relay.config.github_api);
    let response = relay
        .http
        .post(&url)
        .bearer_auth(github_token)
        .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .json(&json!({
            "event_type": EVENT_TYPE,
            "client_payload": payload,
        }))
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "GitHub request failed");
            RelayError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to process webhook")
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), %body, "GitHub rejected the dispatch");
        return Err(RelayError::new(status, "failed to forward to GitHub"));
    }
    info!("✅ repository_dispatch sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Path;
    use axum::http::{HeaderMap, Request};
    use axum::routing::post;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const DOWN: &str = r#"{"heartbeat":{"status":0,"msg":"timeout"},"monitor":{"name":"shop"}}"#;
    const UP: &str = r#"{"heartbeat":{"status":1},"monitor":{"name":"shop"}}"#;

    #[derive(Default)]
    struct MockGithub {
        dispatches: Mutex<Vec<(String, String, Value)>>,
        reject_with: Option<StatusCode>,
    }

    async fn dispatches(
        State(github): State<Arc<MockGithub>>,
        Path((user, repo)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        assert!(headers.get("user-agent").is_some());
        github
            .dispatches
            .lock()
            .unwrap()
            .push((format!("{user}/{repo}"), auth, body));
        github.reject_with.unwrap_or(StatusCode::NO_CONTENT)
    }

    async fn spawn_github(reject_with: Option<StatusCode>) -> (String, Arc<MockGithub>) {
        let github = Arc::new(MockGithub {
            reject_with,
            ..Default::default()
        });
        let app = Router::new()
            .route("/repos/{user}/{repo}/dispatches", post(dispatches))
            .with_state(github.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), github)
    }

    fn app(config: RelayConfig) -> Router {
        router(Arc::new(Relay::new(config, reqwest::Client::new())))
    }

    fn configured(github_api: &str) -> RelayConfig {
        RelayConfig::new(Some("s3cret".into()), Some("gh-token".into())).with_github_api(github_api)
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        (status, body["message"].as_str().unwrap().to_string())
    }

    const GOOD: &str = "/?token=s3cret&user=octo&repo=keepalive";

    #[tokio::test]
    async fn test_rejects_non_post() {
        let (base, github) = spawn_github(None).await;
        let (status, _) = send(app(configured(&base)), "GET", GOOD, DOWN).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(github.dispatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_is_server_error() {
        let config = RelayConfig::new(None, Some("gh-token".into()));
        let (status, message) = send(app(config), "POST", GOOD, DOWN).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("security"));
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized_whatever_the_body() {
        let (base, github) = spawn_github(None).await;
        for body in [DOWN, UP, "not json"] {
            for uri in ["/?token=nope&user=octo&repo=keepalive", "/?user=octo&repo=keepalive"] {
                let (status, _) = send(app(configured(&base)), "POST", uri, body).await;
                assert_eq!(status, StatusCode::UNAUTHORIZED);
            }
        }
        assert!(github.dispatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_query_keys_use_the_first_value() {
        let (base, github) = spawn_github(None).await;

        let uri = "/?token=nope&token=s3cret&user=octo&repo=keepalive";
        let (status, message) = send(app(configured(&base)), "POST", uri, DOWN).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "invalid authentication token");

        let (status, _) = send(app(configured(&base)), "GET", "/?user=a&user=b", DOWN).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(github.dispatches.lock().unwrap().is_empty());

        let uri = "/?token=s3cret&token=x&user=octo&user=other&repo=keepalive&repo=r";
        let (status, message) = send(app(configured(&base)), "POST", uri, DOWN).await;
        assert_eq!(status, StatusCode::OK);
        assert!(message.contains("octo/keepalive"));
        assert_eq!(github.dispatches.lock().unwrap()[0].0, "octo/keepalive");
    }

    #[test]
    fn test_query_from_pairs() {
        let query = RelayQuery::from_pairs(vec![
            ("user".into(), "octo".into()),
            ("other".into(), "x".into()),
            ("user".into(), "later".into()),
        ]);
        assert_eq!(query.user.as_deref(), Some("octo"));
        assert_eq!(query.token, None);
        assert_eq!(query.repo, None);
    }

    #[tokio::test]
    async fn test_missing_repo_is_bad_request() {
        let (base, _github) = spawn_github(None).await;
        let (status, message) =
            send(app(configured(&base)), "POST", "/?token=s3cret&user=octo", DOWN).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("repo"));
    }

    #[tokio::test]
    async fn test_missing_github_token_is_server_error() {
        let config = RelayConfig::new(Some("s3cret".into()), None);
        let (status, message) = send(app(config), "POST", GOOD, DOWN).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "server configuration error");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (base, github) = spawn_github(None).await;
        let (status, message) = send(app(configured(&base)), "POST", GOOD, "{heartbeat").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "invalid JSON body");
        assert!(github.dispatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_up_heartbeat_is_ignored() {
        let (base, github) = spawn_github(None).await;
        for body in [UP, r#"{"msg":"test notification"}"#] {
            let (status, message) = send(app(configured(&base)), "POST", GOOD, body).await;
            assert_eq!(status, StatusCode::OK);
            assert!(message.contains("ignored"));
        }
        assert!(github.dispatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_down_heartbeat_is_dispatched() {
        let (base, github) = spawn_github(None).await;
        let (status, message) = send(app(configured(&base)), "POST", GOOD, DOWN).await;
        assert_eq!(status, StatusCode::OK);
        assert!(message.contains("octo/keepalive"));

        let dispatches = github.dispatches.lock().unwrap();
        assert_eq!(dispatches.len(), 1);
        let (target, auth, body) = &dispatches[0];
        assert_eq!(target, "octo/keepalive");
        assert_eq!(auth, "Bearer gh-token");
        assert_eq!(body["event_type"], EVENT_TYPE);
        assert_eq!(body["client_payload"]["monitor"]["name"], "shop");
    }

    #[tokio::test]
    async fn test_upstream_failure_status_is_propagated() {
        let (base, _github) = spawn_github(Some(StatusCode::UNPROCESSABLE_ENTITY)).await;
        let (status, message) = send(app(configured(&base)), "POST", GOOD, DOWN).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "failed to forward to GitHub");
    }
}
