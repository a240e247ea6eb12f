#![allow(dead_code)]

use async_trait::async_trait;
use keepalive::{Notifier, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Keeps every message and photo instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
    pub photos: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn photos(&self) -> Vec<(PathBuf, String)> {
        self.photos.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_photo(&self, photo: &Path, caption: &str) -> Result<()> {
        self.photos
            .lock()
            .unwrap()
            .push((photo.to_path_buf(), caption.to_string()));
        Ok(())
    }
}
