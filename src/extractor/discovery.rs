//! Candidate selector discovery from a live snapshot.
//!
//! Used on a cold bucket and whenever the learned selectors lose
//! confidence. Only visible elements are considered, so a stripped page
//! never yields a selector for a trap.

use crate::dom::{DomElement, DomSnapshot};
use crate::models::DataType;
use crate::patterns;

const MAX_CANDIDATES: usize = 10;

/// Tags that commonly carry a clickable section label.
const CLICKABLE: &[&str] = &["a", "button", "span", "div", "li"];

#[derive(Default)]
struct Candidates(Vec<String>);

impl Candidates {
    fn push(&mut self, selector: String) {
        if self.0.len() < MAX_CANDIDATES && !self.0.contains(&selector) {
            self.0.push(selector);
        }
    }
}

/// Bare tag name when it is the only one of its kind, otherwise a
/// synthesized selector.
fn selector_for(snapshot: &DomSnapshot, element: &DomElement) -> String {
    let anonymous = element.id().is_none() && element.name().is_none() && element.classes().next().is_none();
    if anonymous && snapshot.count_tag(&element.tag) == 1 {
        element.tag.clone()
    } else {
        snapshot.synthesize_selector(element)
    }
}

fn href_starts_with(element: &DomElement, scheme: &str) -> bool {
    element
        .href()
        .is_some_and(|href| href.to_ascii_lowercase().starts_with(scheme))
}

fn mentions(element: &DomElement, token: &str) -> bool {
    [element.id(), element.attr("class"), element.attr("data-testid"), element.attr("aria-label")]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(token))
}

/// Candidate selectors for `data_type`, strongest signature first.
pub fn discover_selectors(data_type: DataType, snapshot: &DomSnapshot) -> Vec<String> {
    let mut found = Candidates::default();
    let visible: Vec<&DomElement> = snapshot.visible().collect();

    for element in &visible {
        let own = element.own_text.trim();
        let signature = match data_type {
            DataType::CompanyName => element.tag == "h1",
            DataType::Email => looks_like_contact_link(element, "mailto:") || patterns::looks_like_email(own),
            DataType::Phone => looks_like_contact_link(element, "tel:") || patterns::looks_like_phone(own),
            DataType::Address => element.tag == "address" || patterns::has_street_suffix(own),
            DataType::Website => element.tag == "a" && href_starts_with(element, "http"),
            DataType::Followers | DataType::Likes => {
                patterns::labeled_count(own).is_some_and(|(_, label)| label == data_type.key())
            }
            DataType::ProfilePhoto => element.tag == "img" && patterns::is_square(element),
            DataType::PageCreated => patterns::looks_like_date(own),
            DataType::Category => false,
        };
        if !signature {
            continue;
        }
        match data_type {
            DataType::Email if element.tag == "a" && href_starts_with(element, "mailto:") => {
                found.push("a[href^=\"mailto:\"]".to_string())
            }
            DataType::Phone if element.tag == "a" && href_starts_with(element, "tel:") => {
                found.push("a[href^=\"tel:\"]".to_string())
            }
            _ => found.push(selector_for(snapshot, element)),
        }
    }

    let token = data_type.class_token();
    for element in &visible {
        let has_content = !element.text.trim().is_empty() || element.tag == "img";
        if has_content && mentions(element, token) {
            found.push(snapshot.synthesize_selector(element));
        }
    }

    found.0
}

fn looks_like_contact_link(element: &DomElement, scheme: &str) -> bool {
    element.tag == "a" && href_starts_with(element, scheme)
}

/// Selectors for clickable elements labelled `target`, exact labels first.
pub fn discover_navigation(snapshot: &DomSnapshot, target: &str) -> Vec<String> {
    let target = target.trim().to_lowercase();
    if target.is_empty() {
        return Vec::new();
    }
    let label = |element: &DomElement| {
        let text = element.text.trim().to_lowercase();
        if text.is_empty() {
            element.attr("aria-label").unwrap_or_default().trim().to_lowercase()
        } else {
            text
        }
    };
    let clickable = |element: &&DomElement| {
        CLICKABLE.contains(&element.tag.as_str())
            || matches!(element.attr("role"), Some("tab" | "link" | "button" | "menuitem"))
    };

    let mut found = Candidates::default();
    let mut loose = Vec::new();
    for element in snapshot.visible().filter(clickable) {
        let text = label(element);
        if text == target {
            found.push(snapshot.synthesize_selector(element));
        } else if text.starts_with(&target) && text.len() <= target.len() + 20 {
            loose.push(snapshot.synthesize_selector(element));
        }
    }
    for selector in loose {
        found.push(selector);
    }
    found.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn shown(index: usize, tag: &str, text: &str) -> DomElement {
        DomElement::new(index, tag)
            .with_text(text)
            .with_rect(Rect::new(0.0, 30.0 * index as f64, 400.0, 24.0))
    }

    fn snapshot(elements: Vec<DomElement>) -> DomSnapshot {
        DomSnapshot {
            elements,
            ..DomSnapshot::default()
        }
    }

    #[test]
    fn single_heading_is_discovered_by_tag() {
        let doc = snapshot(vec![shown(0, "h1", "Acme Corp"), shown(1, "p", "Bakery")]);
        assert_eq!(discover_selectors(DataType::CompanyName, &doc), vec!["h1"]);
    }

    #[test]
    fn contact_links_use_scheme_signatures() {
        let doc = snapshot(vec![
            shown(0, "a", "Email us").with_attr("href", "mailto:real@acme.test"),
            shown(1, "span", "sales@acme.test").with_attr("class", "contact"),
            shown(2, "a", "Call").with_attr("href", "tel:+15550100199"),
        ]);
        assert_eq!(
            discover_selectors(DataType::Email, &doc),
            vec!["a[href^=\"mailto:\"]", "span.contact"]
        );
        assert_eq!(discover_selectors(DataType::Phone, &doc), vec!["a[href^=\"tel:\"]"]);
    }

    #[test]
    fn hidden_elements_are_never_candidates() {
        let mut trap = shown(0, "a", "mail").with_attr("href", "mailto:trap@acme.test");
        trap.style.display = "none".to_string();
        let doc = snapshot(vec![trap]);
        assert!(discover_selectors(DataType::Email, &doc).is_empty());
    }

    #[test]
    fn class_tokens_add_candidates() {
        let doc = snapshot(vec![shown(0, "div", "Bakery").with_attr("class", "page-category")]);
        assert_eq!(discover_selectors(DataType::Category, &doc), vec!["div.page-category"]);
    }

    #[test]
    fn navigation_prefers_exact_labels() {
        let doc = snapshot(vec![
            shown(0, "a", "About the founders").with_attr("class", "story"),
            shown(1, "a", "About").with_attr("class", "tab"),
            shown(2, "p", "About"),
        ]);
        assert_eq!(discover_navigation(&doc, "about"), vec!["a.tab", "a.story"]);
    }
}
