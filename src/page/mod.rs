//! The page capability the harvest pipeline drives.
//!
//! Everything the pipeline knows about the host page goes through [`Page`], so
//! the locator, pagination and extraction logic never touch a rendering engine
//! directly. Two real backends exist: [`html::HtmlPage`] over a saved snapshot
//! and, with the `browser` feature, `cdp::CdpPage` over a live Chrome tab.

#[cfg(feature = "browser")]
pub mod cdp;
#[cfg(test)]
pub mod fake;
pub mod html;

use anyhow::Result;
use async_trait::async_trait;

/// Opaque reference to an element, valid for the lifetime of the page object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub usize);

/// Vertical scroll geometry of a scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollExtent {
    pub scroll_height: u64,
    pub client_height: u64,
}

impl ScrollExtent {
    pub fn overflows(&self) -> bool {
        self.scroll_height > self.client_height
    }
}

#[async_trait(?Send)]
pub trait Page {
    /// Called once at the start of every pipeline run. Handles from earlier
    /// runs may be invalidated.
    async fn begin_run(&self) -> Result<()> {
        Ok(())
    }

    /// First element under `scope` (the document when `None`) matching a CSS selector.
    async fn query(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Option<NodeHandle>>;

    async fn query_all(&self, scope: Option<NodeHandle>, selector: &str) -> Result<Vec<NodeHandle>>;

    async fn attribute(&self, node: NodeHandle, name: &str) -> Result<Option<String>>;

    /// Text content of the element and its descendants, untrimmed.
    async fn text(&self, node: NodeHandle) -> Result<String>;

    async fn is_visible(&self, node: NodeHandle) -> Result<bool>;

    async fn parent(&self, node: NodeHandle) -> Result<Option<NodeHandle>>;

    /// Scroll geometry when the element is a vertical scroll container.
    async fn scroll_extent(&self, node: NodeHandle) -> Result<Option<ScrollExtent>>;

    async fn scroll_to_bottom(&self, node: NodeHandle) -> Result<()>;

    async fn click(&self, node: NodeHandle) -> Result<()>;
}
