use keepalive::AppStatus;
use serde::Serialize;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RestartAccepted {
    pub ok: bool,
    pub msg: String,
    pub target_app: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub apps: Vec<AppStatus>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub ok: bool,
    pub msg: String,
}
