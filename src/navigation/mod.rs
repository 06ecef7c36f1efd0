//! Click-through navigation to labelled page sections.
//!
//! Navigation is a small state machine. Each attempt walks the candidate
//! selectors: wait for presence, require a rendered box, click, settle,
//! verify. A failed attempt rediscovers candidates from the live page and
//! backs off linearly before the next one.

use tracing::{Instrument, debug, info, warn};

use crate::config::{MAX_NAVIGATION_ATTEMPTS, NavigationPolicy};
use crate::dom::DomSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::extractor::{discover_navigation, resolve_candidates};
use crate::honeypot::HoneypotDetector;
use crate::models::navigation_key;
use crate::session::Session;
use crate::store::KnowledgeStore;

/// Post-click check that the expected content is showing.
pub type Verify = dyn Fn(&DomSnapshot) -> bool + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Attempting { attempt: u32 },
    Verifying { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded,
    Failed,
}

/// States visited by one navigation, in order.
#[derive(Debug, Clone, Default)]
pub struct NavigationReport {
    pub states: Vec<NavState>,
    pub winning_selector: Option<String>,
}

impl NavigationReport {
    fn enter(&mut self, state: NavState) {
        debug!(?state, "Navigation state");
        self.states.push(state);
    }

    pub fn succeeded(&self) -> bool {
        self.states.last() == Some(&NavState::Succeeded)
    }

    /// Number of attempts started.
    pub fn attempts(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, NavState::Attempting { .. }))
            .count()
    }
}

/// Why one candidate selector did not get us there.
#[derive(Debug, Clone, Copy)]
enum Miss {
    Absent,
    NotRendered,
    ClickFailed,
    Unverified,
}

impl Miss {
    fn reason(self) -> &'static str {
        match self {
            Miss::Absent => "element not present",
            Miss::NotRendered => "element has no rendered area",
            Miss::ClickFailed => "click failed",
            Miss::Unverified => "verification failed after click",
        }
    }
}

#[derive(Clone)]
pub struct NavigationController {
    store: KnowledgeStore,
    detector: HoneypotDetector,
    policy: NavigationPolicy,
}

impl NavigationController {
    pub fn new(store: KnowledgeStore, detector: HoneypotDetector, policy: NavigationPolicy) -> Self {
        Self {
            store,
            detector,
            policy,
        }
    }

    /// Open the section labelled `target`. `false` once every attempt is
    /// exhausted; never an error.
    pub async fn navigate(&self, session: &mut Session, target: &str, verify: Option<&Verify>) -> bool {
        self.navigate_with_report(session, target, verify).await.succeeded()
    }

    pub async fn navigate_with_report(
        &self,
        session: &mut Session,
        target: &str,
        verify: Option<&Verify>,
    ) -> NavigationReport {
        let span = session.span();
        self.run(session, target, verify).instrument(span).await
    }

    async fn run(&self, session: &mut Session, target: &str, verify: Option<&Verify>) -> NavigationReport {
        let mut report = NavigationReport::default();
        report.enter(NavState::Idle);

        self.detector.ensure_stripped(session).await;

        let field = navigation_key(target);
        let url_pattern = session.url_pattern().to_string();
        let mut candidates = resolve_candidates(&self.store, session, &field, |snapshot| {
            discover_navigation(snapshot, target)
        })
        .await;

        let max_attempts = self.policy.max_attempts.clamp(1, MAX_NAVIGATION_ATTEMPTS);
        for attempt in 1..=max_attempts {
            report.enter(NavState::Attempting { attempt });

            for selector in &candidates {
                if session.is_cancelled() {
                    report.enter(NavState::Failed);
                    return report;
                }
                // An earlier click may have moved the page.
                self.detector.ensure_stripped(session).await;
                match self.try_selector(session, selector, verify, attempt, &mut report).await {
                    Ok(None) => {
                        self.store.record_success(&field, &[selector.clone()], &url_pattern).await;
                        info!(section = target, selector = %selector, attempt, "Navigation succeeded");
                        report.winning_selector = Some(selector.clone());
                        report.enter(NavState::Succeeded);
                        return report;
                    }
                    Ok(Some(miss)) => {
                        self.store
                            .record_failure(&field, &[selector.clone()], miss.reason(), &url_pattern)
                            .await;
                    }
                    Err(EngineError::Cancelled) => {
                        report.enter(NavState::Failed);
                        return report;
                    }
                    Err(e) => {
                        debug!(selector = %selector, "Navigation step faulted: {}", e);
                        self.store
                            .record_failure(&field, &[selector.clone()], &e.to_string(), &url_pattern)
                            .await;
                    }
                }
            }

            if attempt < max_attempts {
                report.enter(NavState::Retrying { attempt });
                match session.snapshot().await {
                    Ok(snapshot) => {
                        let fresh = discover_navigation(&snapshot, target);
                        if !fresh.is_empty() {
                            candidates = fresh;
                        }
                    }
                    Err(e) => debug!("Rediscovery scan failed: {}", e),
                }
                let delay = self.policy.base_delay.saturating_mul(attempt);
                if session.wait(delay).await.is_err() {
                    report.enter(NavState::Failed);
                    return report;
                }
            }
        }

        warn!(section = target, attempts = max_attempts, "Navigation failed");
        report.enter(NavState::Failed);
        report
    }

    /// `Ok(None)` when the click landed and verified. A landed click always
    /// leaves the session on the new URL with its traps stripped, verified
    /// or not.
    async fn try_selector(
        &self,
        session: &mut Session,
        selector: &str,
        verify: Option<&Verify>,
        attempt: u32,
        report: &mut NavigationReport,
    ) -> EngineResult<Option<Miss>> {
        if !session.wait_for_selector(selector, self.policy.presence_timeout).await? {
            return Ok(Some(Miss::Absent));
        }
        let Some(handle) = session.query_selector(selector).await? else {
            return Ok(Some(Miss::Absent));
        };
        let element = session.describe(handle).await?;
        if element.rect.area() <= 0.0 {
            return Ok(Some(Miss::NotRendered));
        }
        match session.click(handle).await {
            Ok(()) => {}
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                debug!(selector, "Click failed: {}", e);
                return Ok(Some(Miss::ClickFailed));
            }
        }
        match session.refresh_url().await {
            Ok(()) => {}
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => debug!(selector, "Could not refresh page URL: {}", e),
        }
        session.wait(self.policy.settle).await?;
        self.detector.ensure_stripped(session).await;

        report.enter(NavState::Verifying { attempt });
        let Some(verify) = verify else {
            return Ok(None);
        };
        let snapshot = session.snapshot().await?;
        Ok((!verify(&snapshot)).then_some(Miss::Unverified))
    }
}
