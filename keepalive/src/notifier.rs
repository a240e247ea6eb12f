//! Chat notifications (Telegram bot API)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::TelegramConfig;
use crate::errors::{KeepaliveError, Result};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<()>;

    async fn send_photo(&self, photo: &Path, caption: &str) -> Result<()>;

    /// Send a text message, logging instead of failing.
    async fn announce(&self, text: &str) {
        if let Err(e) = self.send_message(text).await {
            warn!(error = %e, "failed to send notification");
        }
    }

    /// Send a photo, logging instead of failing.
    async fn announce_photo(&self, photo: &Path, caption: &str) {
        if let Err(e) = self.send_photo(photo, caption).await {
            warn!(error = %e, photo = %photo.display(), "failed to send photo notification");
        }
    }
}

/// Used when no chat is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_message(&self, _text: &str) -> Result<()> {
        info!("telegram not configured, skipping message");
        Ok(())
    }

    async fn send_photo(&self, photo: &Path, _caption: &str) -> Result<()> {
        info!(photo = %photo.display(), "telegram not configured, skipping photo");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(http: reqwest::Client, config: TelegramConfig) -> Self {
        Self { http, config }
    }

    async fn check(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let text = response.text().await?;
        let reply: Option<TelegramReply> = serde_json::from_str(&text).ok();
        match reply {
            Some(r) if status.is_success() && r.ok => {
                debug!("telegram message delivered");
                Ok(())
            }
            Some(r) => Err(KeepaliveError::Notify(format!(
                "telegram {}: {}",
                status.as_u16(),
                r.description.unwrap_or_default()
            ))),
            None => Err(KeepaliveError::Notify(format!(
                "telegram {}: {}",
                status.as_u16(),
                crate::errors::truncate_body(&text)
            ))),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, text))]
    async fn send_message(&self, text: &str) -> Result<()> {
        let response = self
            .http
            .post(self.config.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;
        Self::check(response).await
    }

    #[instrument(skip(self, photo, caption), fields(photo = %photo.display()))]
    async fn send_photo(&self, photo: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(photo).await?;
        let file_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "screenshot.png".to_string());
        let part = Part::bytes(bytes).file_name(file_name).mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", part);

        let response = self
            .http
            .post(self.config.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await
    }
}

/// Pick the Telegram notifier when configured, the no-op one otherwise.
pub fn notifier_from_config(http: reqwest::Client, telegram: Option<TelegramConfig>) -> Arc<dyn Notifier> {
    match telegram {
        Some(cfg) => Arc::new(TelegramNotifier::new(http, cfg)),
        None => Arc::new(NoopNotifier),
    }
}
