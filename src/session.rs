//! One live page driven by one flow of control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{Span, debug, info_span};

use crate::dom::{DomElement, DomSnapshot};
use crate::error::{EngineError, EngineResult};
use crate::traits::{ElementHandle, PageDriver};
use crate::url_pattern::url_pattern;

/// Cooperative cancellation flag shared with a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A page plus the per-session state the engine keeps about it.
///
/// All DOM access goes through the session so that a cancelled session
/// issues no further page operations and collaborator failures surface as
/// `EngineError`s.
pub struct Session {
    id: String,
    url: String,
    url_pattern: String,
    page: Box<dyn PageDriver>,
    cancel: CancelHandle,
    traps_cleared: bool,
}

impl Session {
    pub async fn open(page: Box<dyn PageDriver>) -> EngineResult<Self> {
        let url = page.current_url().await.map_err(dom_fault)?;
        let seed = format!("{}{}", url, Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let id = format!("{:x}", md5::compute(seed));
        Ok(Self {
            id,
            url_pattern: url_pattern(&url),
            url,
            page,
            cancel: CancelHandle::default(),
            traps_cleared: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn url_pattern(&self) -> &str {
        &self.url_pattern
    }

    pub fn span(&self) -> Span {
        info_span!("session", session_id = %self.id, url = %self.url)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether known and detected traps were stripped from the current page.
    pub fn traps_cleared(&self) -> bool {
        self.traps_cleared
    }

    pub(crate) fn mark_traps_cleared(&mut self) {
        self.traps_cleared = true;
    }

    /// Re-read the page URL after a click. A changed URL means new content,
    /// so traps have to be stripped again before the next extraction.
    pub async fn refresh_url(&mut self) -> EngineResult<()> {
        self.ensure_active()?;
        let url = self.page.current_url().await.map_err(dom_fault)?;
        if url != self.url {
            debug!(from = %self.url, to = %url, "Page URL changed");
            self.url_pattern = url_pattern(&url);
            self.url = url;
            self.traps_cleared = false;
        }
        Ok(())
    }

    pub async fn query_selector(&self, selector: &str) -> EngineResult<Option<ElementHandle>> {
        self.ensure_active()?;
        check_selector(selector)?;
        self.page.query_selector(selector).await.map_err(dom_fault)
    }

    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> EngineResult<bool> {
        self.ensure_active()?;
        check_selector(selector)?;
        self.page.wait_for_selector(selector, timeout).await.map_err(dom_fault)
    }

    pub async fn describe(&self, element: ElementHandle) -> EngineResult<DomElement> {
        self.ensure_active()?;
        self.page
            .describe(element)
            .await
            .map_err(|_| EngineError::ElementVanished(element.0))
    }

    pub async fn snapshot(&self) -> EngineResult<DomSnapshot> {
        self.ensure_active()?;
        self.page.snapshot().await.map_err(dom_fault)
    }

    pub async fn remove_matching(&mut self, selector: &str) -> EngineResult<usize> {
        self.ensure_active()?;
        check_selector(selector)?;
        self.page.remove_matching(selector).await.map_err(dom_fault)
    }

    pub async fn click(&mut self, element: ElementHandle) -> EngineResult<()> {
        self.ensure_active()?;
        self.page.click(element).await.map_err(dom_fault)
    }

    pub async fn wait(&self, duration: Duration) -> EngineResult<()> {
        self.ensure_active()?;
        self.page.wait(duration).await;
        Ok(())
    }

    /// Hand the page back to the caller, who owns its teardown.
    pub fn into_page(self) -> Box<dyn PageDriver> {
        self.page
    }

    fn ensure_active(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// Learned and synthesized selectors are checked before they reach the page.
fn check_selector(selector: &str) -> EngineResult<()> {
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| EngineError::InvalidSelector(selector.to_string()))
}

fn dom_fault(e: anyhow::Error) -> EngineError {
    EngineError::DomEvaluation(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StaticPage;

    #[tokio::test]
    async fn cancelled_session_issues_no_dom_operations() {
        let page = StaticPage::from_html("https://social.test/acme", "<h1>Acme</h1>");
        let mut session = Session::open(Box::new(page)).await.unwrap();
        assert_eq!(session.url_pattern(), "social.test/acme");
        assert!(session.query_selector("h1").await.unwrap().is_some());

        session.cancel_handle().cancel();
        assert!(matches!(session.snapshot().await, Err(EngineError::Cancelled)));
        assert!(matches!(session.remove_matching("h1").await, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn invalid_selector_is_rejected_before_the_page() {
        let page = StaticPage::from_html("https://social.test/acme", "<p>x</p>");
        let session = Session::open(Box::new(page)).await.unwrap();
        let err = session.query_selector("a[").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidSelector(ref s) if s == "a["));
    }

    #[tokio::test]
    async fn url_change_requires_fresh_trap_stripping() {
        let page = StaticPage::from_html(
            "https://social.test/acme",
            r##"<a id="about" href="#about">About</a>"##,
        );
        let mut session = Session::open(Box::new(page)).await.unwrap();
        session.mark_traps_cleared();

        let link = session.query_selector("#about").await.unwrap().unwrap();
        session.click(link).await.unwrap();
        session.refresh_url().await.unwrap();

        assert_eq!(session.url(), "https://social.test/acme#about");
        assert!(!session.traps_cleared());
    }
}
