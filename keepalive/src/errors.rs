use thiserror::Error;

/// Maximum number of response-body characters carried inside an error.
pub const ERROR_BODY_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum KeepaliveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("CF {method} {status} {url}: {body}")]
    Api {
        method: &'static str,
        status: u16,
        url: String,
        body: String,
    },

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Cannot determine region for {0}")]
    UnknownRegion(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = KeepaliveError> = std::result::Result<T, E>;

/// Cut a response body down to `ERROR_BODY_LIMIT` characters.
pub fn truncate_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
