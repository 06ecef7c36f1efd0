//! Honeypot detection and stripping.
//!
//! A honeypot is an element a human never sees but a naive scraper would
//! read or click: hidden contact links, invisible form fields, offscreen
//! anchors. The classifier works on a `DomSnapshot`; the detector ties it to
//! a live session and the per-host `TrapRegistry`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{Instrument, debug, info, warn};

use crate::config::TrapPolicy;
use crate::dom::{DomElement, DomSnapshot};
use crate::session::Session;
use crate::store::TrapRegistry;

/// Trap markers as whole words of an id, name or class. `camelCase` words
/// are split before matching.
static SUSPICIOUS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[-_\s])(honey-?pot|trap|bot|do-?not-?fill|human-?check|leave-?(this-?)?empty)($|[-_\s])")
        .expect("suspicious name regex is valid")
});

/// Bound on flagged elements per reported selector. Many flagged elements
/// can collapse into one selector, so this caps work on pages full of
/// look-alike hidden nodes.
const FLAGGED_PER_SELECTOR: usize = 4;

/// Elements that never render and therefore cannot be traps.
const UNRENDERED: &[&str] = &[
    "html", "head", "body", "script", "style", "meta", "link", "title", "noscript", "template", "base",
];

const INTERACTIVE: &[&str] = &[
    "a", "button", "input", "textarea", "select", "option", "label", "form", "img", "iframe",
];

/// Whether the element's id, name or class reads like a trap marker.
pub fn has_suspicious_name(element: &DomElement) -> bool {
    [element.id(), element.name(), element.attr("class")]
        .into_iter()
        .flatten()
        .any(|value| SUSPICIOUS_NAME.is_match(&split_camel_case(value)))
}

/// `honeypotField` -> `honeypot-Field`.
fn split_camel_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut previous_lower = false;
    for c in value.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            out.push('-');
        }
        previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c);
    }
    out
}

fn is_candidate(element: &DomElement) -> bool {
    if UNRENDERED.contains(&element.tag.as_str()) {
        return false;
    }
    INTERACTIVE.contains(&element.tag.as_str()) || !element.own_text.trim().is_empty()
}

/// Selectors for every trap in `snapshot`, deduplicated, at most `limit`.
///
/// Descendants of an element already flagged are covered by its selector
/// and are not reported separately.
pub fn classify_traps(snapshot: &DomSnapshot, limit: usize) -> Vec<String> {
    let max_flagged = limit.saturating_mul(FLAGGED_PER_SELECTOR);
    let mut flagged = 0usize;
    // Flagged elements plus the descendants they already cover; ancestor
    // walks stop at the nearest one.
    let mut covered: HashSet<usize> = HashSet::new();
    let mut selectors: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for element in &snapshot.elements {
        if selectors.len() >= limit || flagged >= max_flagged {
            break;
        }
        if !is_candidate(element) {
            continue;
        }
        if !element.is_effectively_invisible(&snapshot.viewport) && !has_suspicious_name(element) {
            continue;
        }
        if snapshot.ancestors(element.index).any(|a| covered.contains(&a)) {
            covered.insert(element.index);
            continue;
        }

        flagged += 1;
        covered.insert(element.index);
        let selector = snapshot.synthesize_selector(element);
        if seen.insert(selector.clone()) {
            selectors.push(selector);
        }
    }
    selectors
}

/// What one stripping pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    pub known: usize,
    pub detected: Vec<String>,
    pub removed: usize,
}

#[derive(Clone)]
pub struct HoneypotDetector {
    registry: TrapRegistry,
    policy: TrapPolicy,
}

impl HoneypotDetector {
    pub fn new(registry: TrapRegistry, policy: TrapPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &TrapRegistry {
        &self.registry
    }

    /// Classify the live page. A page that cannot be scanned yields no traps.
    pub async fn detect(&self, session: &Session) -> Vec<String> {
        match session.snapshot().await {
            Ok(snapshot) => classify_traps(&snapshot, self.policy.max_detected),
            Err(e) => {
                warn!("Honeypot scan failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn get_known_traps_for(&self, url: &str) -> Vec<String> {
        self.registry.get_known_traps_for(url)
    }

    pub async fn add_traps(&self, url: &str, traps: &[String]) -> Vec<String> {
        self.registry.add_traps(url, traps).await
    }

    /// Remove known traps, detect and remove live ones, then persist the
    /// union for the host.
    pub async fn strip(&self, session: &mut Session) -> StripReport {
        let span = session.span();
        self.strip_traps(session).instrument(span).await
    }

    /// Strip unless the current page was already stripped in this session.
    pub async fn ensure_stripped(&self, session: &mut Session) {
        if !session.traps_cleared() {
            self.strip(session).await;
        }
    }

    async fn strip_traps(&self, session: &mut Session) -> StripReport {
        let url = session.url().to_string();
        let known = self.get_known_traps_for(&url);
        let mut report = StripReport {
            known: known.len(),
            ..StripReport::default()
        };

        report.removed += remove_all(session, &known).await;
        if session.is_cancelled() {
            return report;
        }

        report.detected = self.detect(session).await;
        report.removed += remove_all(session, &report.detected).await;

        if !report.detected.is_empty() {
            self.add_traps(&url, &report.detected).await;
        }
        if !session.is_cancelled() {
            session.mark_traps_cleared();
        }
        info!(
            known = report.known,
            detected = report.detected.len(),
            removed = report.removed,
            "Stripped honeypots"
        );
        report
    }
}

async fn remove_all(session: &mut Session, selectors: &[String]) -> usize {
    let mut removed = 0;
    for selector in selectors {
        match session.remove_matching(selector).await {
            Ok(count) => removed += count,
            Err(e) => debug!(selector = %selector, "Could not remove trap: {}", e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn shown(index: usize, tag: &str, text: &str) -> DomElement {
        DomElement::new(index, tag)
            .with_text(text)
            .with_rect(Rect::new(0.0, 40.0 * index as f64, 300.0, 24.0))
    }

    fn snapshot(elements: Vec<DomElement>) -> DomSnapshot {
        DomSnapshot {
            elements,
            ..DomSnapshot::default()
        }
    }

    #[test]
    fn flags_hidden_and_suspiciously_named_elements() {
        let mut hidden = shown(1, "a", "mail").with_attr("class", "contact-link");
        hidden.style.display = "none".to_string();
        let doc = snapshot(vec![
            shown(0, "h1", "Acme"),
            hidden,
            shown(2, "input", "").with_attr("name", "leave-empty"),
            shown(3, "div", "promo").with_attr("id", "bot"),
            shown(4, "span", "robot arms").with_attr("class", "robot"),
        ]);

        assert_eq!(
            classify_traps(&doc, 10),
            vec!["a.contact-link", "input[name=\"leave-empty\"]", "#bot"]
        );
    }

    #[test]
    fn trap_markers_match_whole_words_only() {
        let named = |class: &str| shown(0, "div", "x").with_attr("class", class);
        for class in ["honeypot-mailto", "hp_honeypot", "trap-link", "no-bot", "doNotFill", "honeypotField", "leave-this-empty"] {
            assert!(has_suspicious_name(&named(class)), "{class}");
        }
        for class in ["robot", "footer-bottom", "strap", "entrapment", "button"] {
            assert!(!has_suspicious_name(&named(class)), "{class}");
        }
    }

    #[test]
    fn descendants_of_a_flagged_element_are_covered() {
        let doc = snapshot(vec![
            shown(0, "div", "win a prize").with_attr("id", "honeypot-box"),
            shown(1, "a", "click").with_parent(0, 1).with_attr("class", "trap-link"),
            DomElement::new(2, "span").with_text("hidden by size"),
        ]);
        assert_eq!(classify_traps(&doc, 10), vec!["#honeypot-box", "span:nth-child(1)"]);
    }

    #[test]
    fn output_is_capped() {
        let doc = snapshot((0..20).map(|i| DomElement::new(i, "a").with_attr("id", &format!("t{i}"))).collect());
        assert_eq!(classify_traps(&doc, 5).len(), 5);
    }

    #[test]
    fn look_alike_traps_stop_at_the_flag_cap() {
        let mut elements = vec![shown(0, "div", "feed")];
        elements.extend((1..100_000).map(|i| {
            DomElement::new(i, "a")
                .with_parent(0, i)
                .with_attr("class", "ghost")
        }));
        let doc = snapshot(elements);

        assert_eq!(classify_traps(&doc, 25), vec!["a.ghost"]);
    }

    #[test]
    fn deep_hidden_subtree_reports_only_its_root() {
        let mut root = shown(0, "div", "wrapper").with_attr("id", "shadow");
        root.style.display = "none".to_string();
        let mut elements = vec![root];
        elements.extend((1..5_000).map(|i| DomElement::new(i, "span").with_text("x").with_parent(i - 1, 1)));
        let doc = snapshot(elements);

        assert_eq!(classify_traps(&doc, 10), vec!["#shadow"]);
    }

    #[test]
    fn unrendered_tags_are_ignored() {
        let doc = snapshot(vec![
            DomElement::new(0, "script").with_text("var x"),
            DomElement::new(1, "title").with_text("Acme"),
        ]);
        assert!(classify_traps(&doc, 10).is_empty());
    }
}
