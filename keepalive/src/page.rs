//! The browser-tab seam used by the login flow

use async_trait::async_trait;
use std::path::Path;

use crate::errors::Result;
use crate::selector::Selector;

/// What a selector currently resolves to on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Missing,
    Hidden,
    Visible,
}

/// One browser tab.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the document to finish loading.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn query(&self, selector: &Selector) -> Result<ElementState>;

    /// Replace the value of the matched input with `value`.
    async fn fill(&self, selector: &Selector, value: &str) -> Result<()>;

    async fn click(&self, selector: &Selector) -> Result<()>;

    /// Write a PNG of the full page to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// A page that owns its browser context.
#[async_trait]
pub trait ClosablePage: BrowserPage {
    fn as_page(&self) -> &dyn BrowserPage;

    async fn close(self: Box<Self>);
}

/// Hands out fresh, isolated pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn ClosablePage>>;
}
