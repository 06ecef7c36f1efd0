//! Cascading field extraction.
//!
//! Each field runs through the strategies in `Strategy::CASCADE` order and
//! stops at the first valid value. Every attempt feeds the Knowledge Store:
//! the winning selector gets a success, the selectors of each failed
//! strategy get a failure, and a winning regex is learned for the bucket.

mod discovery;
mod heuristics;

pub use discovery::{discover_navigation, discover_selectors};
pub use heuristics::Hit;

use tracing::{Instrument, debug, info, warn};

use crate::dom::{DomSnapshot, Viewport};
use crate::honeypot::HoneypotDetector;
use crate::models::{DataType, ExtractionAttempt, Strategy};
use crate::patterns;
use crate::session::Session;
use crate::store::KnowledgeStore;

const MAX_RESULT_CHARS: usize = 1000;

/// Trimmed, non-empty and shorter than 1000 characters.
pub fn is_valid_result(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.chars().count() < MAX_RESULT_CHARS
}

/// Learned selectors for the bucket, or freshly discovered ones when the
/// bucket is cold or has lost confidence.
pub async fn resolve_candidates<F>(store: &KnowledgeStore, session: &Session, field: &str, discover: F) -> Vec<String>
where
    F: FnOnce(&DomSnapshot) -> Vec<String>,
{
    let url_pattern = session.url_pattern();
    let learned = store.get_adaptive_selectors(field, url_pattern);
    if !learned.is_empty() && !store.should_rediscover(field, url_pattern) {
        return learned;
    }

    let discovered = match session.snapshot().await {
        Ok(snapshot) => discover(&snapshot),
        Err(e) => {
            warn!(field, "Discovery scan failed: {}", e);
            Vec::new()
        }
    };
    debug!(field, learned = learned.len(), discovered = discovered.len(), "Rediscovered selectors");

    // Fresh candidates go first; learned ones stay as a fallback.
    let mut candidates = discovered;
    for selector in learned {
        if !candidates.contains(&selector) {
            candidates.push(selector);
        }
    }
    candidates
}

#[derive(Clone)]
pub struct CascadingExtractor {
    store: KnowledgeStore,
    detector: HoneypotDetector,
}

impl CascadingExtractor {
    pub fn new(store: KnowledgeStore, detector: HoneypotDetector) -> Self {
        Self { store, detector }
    }

    /// Extract one field from the session's page. Misses and page faults
    /// both come back as `None`.
    pub async fn extract(&self, data_type: DataType, session: &mut Session) -> Option<String> {
        let span = session.span();
        self.run_cascade(data_type, session).instrument(span).await
    }

    async fn run_cascade(&self, data_type: DataType, session: &mut Session) -> Option<String> {
        self.detector.ensure_stripped(session).await;

        let field = data_type.key();
        let url_pattern = session.url_pattern().to_string();
        let candidates = resolve_candidates(&self.store, session, field, |snapshot| {
            discover_selectors(data_type, snapshot)
        })
        .await;

        let mut snapshot: Option<Option<DomSnapshot>> = None;
        for strategy in Strategy::CASCADE {
            if session.is_cancelled() {
                debug!(field, "Session cancelled, abandoning extraction");
                return None;
            }

            let attempt = if strategy == Strategy::Selector {
                self.by_selectors(data_type, session, &candidates).await
            } else {
                if snapshot.is_none() {
                    snapshot = Some(match session.snapshot().await {
                        Ok(snapshot) => Some(snapshot),
                        Err(e) => {
                            warn!(field, "Page scan failed: {}", e);
                            None
                        }
                    });
                }
                match snapshot.as_ref().and_then(Option::as_ref) {
                    Some(snapshot) => self.from_snapshot(data_type, strategy, &url_pattern, snapshot),
                    None => ExtractionAttempt::new(data_type, strategy),
                }
            };

            if attempt.succeeded
                && let Some(value) = attempt.result
            {
                if let Some(selector) = attempt.winning_selector {
                    self.store.record_success(field, &[selector], &url_pattern).await;
                }
                if let Some(pattern) = attempt.winning_pattern {
                    self.store.learn_pattern(field, &url_pattern, &pattern).await;
                }
                info!(field, strategy = %strategy, "Extracted field");
                return Some(value);
            }

            if !attempt.selectors_tried.is_empty() {
                let reason = format!("{strategy} strategy produced no valid value");
                self.store
                    .record_failure(field, &attempt.selectors_tried, &reason, &url_pattern)
                    .await;
            }
        }

        debug!(field, "No strategy produced a value");
        None
    }

    async fn by_selectors(&self, data_type: DataType, session: &Session, candidates: &[String]) -> ExtractionAttempt {
        let mut attempt = ExtractionAttempt::new(data_type, Strategy::Selector);
        let viewport = Viewport::default();

        for selector in candidates {
            if session.is_cancelled() {
                break;
            }
            attempt.tried(selector);

            let handle = match session.query_selector(selector).await {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => {
                    debug!(selector = %selector, "Selector lookup failed: {}", e);
                    continue;
                }
            };
            let element = match session.describe(handle).await {
                Ok(element) => element,
                Err(e) => {
                    debug!(selector = %selector, "{}", e);
                    continue;
                }
            };
            if element.is_effectively_invisible(&viewport) {
                continue;
            }

            if let Some(value) = patterns::element_value(data_type, &element).filter(|v| is_valid_result(v)) {
                attempt.result = Some(value.trim().to_string());
                attempt.succeeded = true;
                attempt.winning_selector = Some(selector.clone());
                break;
            }
        }
        attempt
    }

    fn from_snapshot(
        &self,
        data_type: DataType,
        strategy: Strategy,
        url_pattern: &str,
        snapshot: &DomSnapshot,
    ) -> ExtractionAttempt {
        let mut attempt = ExtractionAttempt::new(data_type, strategy);
        match strategy {
            Strategy::Selector => {}
            Strategy::Pattern => {
                let learned = self.store.learned_patterns(data_type.key(), url_pattern);
                let patterns = patterns::pattern_list(data_type, &learned);
                if let Some((pattern, value)) = patterns::match_patterns(data_type, &patterns, &snapshot.visible_text())
                    && is_valid_result(&value)
                {
                    attempt.result = Some(value.trim().to_string());
                    attempt.succeeded = true;
                    attempt.winning_pattern = Some(pattern);
                }
            }
            Strategy::Heuristic => {
                if let Some(hit) = heuristics::apply(data_type, snapshot) {
                    accept_hit(&mut attempt, hit);
                }
            }
            Strategy::Scored => {
                if let Some(hit) = best_scored(data_type, snapshot) {
                    accept_hit(&mut attempt, hit);
                }
            }
        }
        attempt
    }
}

fn accept_hit(attempt: &mut ExtractionAttempt, hit: Hit) {
    if let Some(selector) = &hit.selector {
        attempt.tried(selector);
    }
    if is_valid_result(&hit.value) {
        attempt.result = Some(hit.value.trim().to_string());
        attempt.succeeded = true;
        attempt.winning_selector = hit.selector;
    }
}

/// Highest-scoring visible element with content; ties go to the earliest
/// in document order. A zero score is never a match.
fn best_scored(data_type: DataType, snapshot: &DomSnapshot) -> Option<Hit> {
    let mut best = None;
    let mut best_score = 0;
    for element in snapshot.visible() {
        if element.own_text.trim().is_empty() && element.tag != "img" {
            continue;
        }
        let score = patterns::score(data_type, element);
        if score > best_score {
            best_score = score;
            best = Some(element);
        }
    }
    let element = best?;
    let value = patterns::element_value(data_type, element)?;
    Some(Hit {
        value,
        selector: Some(snapshot.synthesize_selector(element)),
    })
}
