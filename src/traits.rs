//! Traits and interfaces for the browser-automation collaborator

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::dom::{DomElement, DomSnapshot};

/// Opaque reference to an element of the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// Capability set the engine needs from a live page.
///
/// The engine never launches browsers or configures stealth; a caller hands
/// it an already-open page. One page is driven by one flow of control at a
/// time, which is why mutating calls take `&mut self`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` into the page.
    async fn navigate_to(&mut self, url: &str) -> Result<()>;

    /// URL currently shown by the page.
    async fn current_url(&self) -> Result<String>;

    /// First element matching `selector`, if any.
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>>;

    /// Wait up to `timeout` for `selector` to match; `false` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Structured description of one element, evaluated in the page.
    ///
    /// Fails when the element vanished since it was queried.
    async fn describe(&self, element: ElementHandle) -> Result<DomElement>;

    /// Full-document scan, evaluated in the page.
    async fn snapshot(&self) -> Result<DomSnapshot>;

    /// Detach every element matching `selector`; returns how many were removed.
    async fn remove_matching(&mut self, selector: &str) -> Result<usize>;

    async fn click(&mut self, element: ElementHandle) -> Result<()>;

    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
