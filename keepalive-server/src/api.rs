use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use keepalive::{Orchestrator, RestartDispatcher};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::status_page;
use crate::types::{RestartAccepted, StartResponse, StatusResponse};

pub const BANNER: &str = "SAP Cloud keepalive worker is running";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: RestartDispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/webhook/restart", any(webhook_restart))
        .route("/start", get(start))
        .fallback(banner)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "ok": false,
                "error": self.message
            })),
        )
            .into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown error".to_string()
    };
    error!(error = %message, "[error] handler panicked");
    ApiError::internal(message).into_response()
}

// ============================================================================
// Status page and status JSON
// ============================================================================

pub async fn index(State(state): State<AppState>) -> Html<String> {
    info!("📥 GET /");
    if state.orchestrator.config().apps.is_empty() {
        return Html(status_page::render(&[]));
    }
    let apps = state.orchestrator.monitor_all("status-page").await;
    Html(status_page::render(&apps))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    info!("📥 GET /status");
    let apps = state.orchestrator.monitor_all("api-status-check").await;
    Json(StatusResponse {
        ok: true,
        apps,
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

// ============================================================================
// Restart webhook
// ============================================================================

/// First value of `key` in the query string, later repeats are ignored.
fn first_param(pairs: Vec<(String, String)>, key: &str) -> Option<String> {
    pairs.into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Accept an offline notice and restart the app in the background.
///
/// Answers 202 right away; the outcome only reaches the notifier.
pub async fn webhook_restart(
    State(state): State<AppState>,
    method: Method,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<RestartAccepted>), ApiError> {
    info!("📥 {} /webhook/restart", method);
    if method != Method::GET && method != Method::POST {
        return Err(ApiError::method_not_allowed(
            "use GET or POST on /webhook/restart",
        ));
    }

    let app_url = first_param(pairs, "appUrl")
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing appUrl query parameter"))?;

    let app = match state.orchestrator.config().find_app(app_url.trim()) {
        Some(app) => app.clone(),
        None => {
            warn!(url = %app_url, "restart requested for an unknown app");
            return Err(ApiError::not_found(format!(
                "no application configured for URL: {app_url}"
            )));
        }
    };

    state.dispatcher.dispatch(app.clone(), "webhook-trigger");

    Ok((
        StatusCode::ACCEPTED,
        Json(RestartAccepted {
            ok: true,
            msg: format!(
                "offline notice for {} accepted, restarting in the background",
                app.name
            ),
            target_app: app.name,
        }),
    ))
}

pub async fn start() -> (StatusCode, Json<StartResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(StartResponse {
            ok: false,
            msg: "use /webhook/restart?appUrl=... to restart a single app".to_string(),
        }),
    )
}

pub async fn banner() -> &'static str {
    BANNER
}
