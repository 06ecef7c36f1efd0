//! Named heuristics, one per data type: structural signals that hold on
//! most profile pages even when no selector or regex is known.

use url::Url;

use crate::dom::{DomElement, DomSnapshot, collapse_whitespace};
use crate::models::DataType;
use crate::patterns;

/// Value found by a heuristic and, when it came from a single element,
/// that element's selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub value: String,
    pub selector: Option<String>,
}

impl Hit {
    fn at(snapshot: &DomSnapshot, element: &DomElement, value: String) -> Self {
        Self {
            value,
            selector: Some(snapshot.synthesize_selector(element)),
        }
    }
}

pub fn apply(data_type: DataType, snapshot: &DomSnapshot) -> Option<Hit> {
    match data_type {
        DataType::CompanyName => name_from_title(snapshot),
        DataType::Email => link_target(snapshot, data_type, "mailto:"),
        DataType::Phone => link_target(snapshot, data_type, "tel:"),
        DataType::Address => address_tag(snapshot),
        DataType::Website => external_link(snapshot),
        DataType::Followers | DataType::Likes => labeled_count(snapshot, data_type),
        DataType::ProfilePhoto => square_image(snapshot),
        DataType::PageCreated => dated_element(snapshot),
        DataType::Category => None,
    }
}

/// "(3) Acme Corp | Social" -> "Acme Corp".
fn name_from_title(snapshot: &DomSnapshot) -> Option<Hit> {
    let mut title = snapshot.title.trim();
    if title.starts_with('(')
        && let Some(close) = title.find(") ")
        && title[1..close].chars().all(|c| c.is_ascii_digit() || c == '+')
    {
        title = &title[close + 2..];
    }
    let name = [" | ", " - ", " – ", " · "]
        .iter()
        .fold(title, |name, separator| name.split(separator).next().unwrap_or(name))
        .trim();
    (!name.is_empty()).then(|| Hit {
        value: collapse_whitespace(name),
        selector: None,
    })
}

fn link_target(snapshot: &DomSnapshot, data_type: DataType, scheme: &str) -> Option<Hit> {
    snapshot
        .visible()
        .filter(|e| e.tag == "a")
        .filter(|e| e.href().is_some_and(|h| h.to_ascii_lowercase().starts_with(scheme)))
        .find_map(|e| patterns::element_value(data_type, e).map(|value| Hit::at(snapshot, e, value)))
}

fn address_tag(snapshot: &DomSnapshot) -> Option<Hit> {
    snapshot
        .visible()
        .filter(|e| e.tag == "address" && !e.text.trim().is_empty())
        .map(|e| Hit::at(snapshot, e, collapse_whitespace(&e.text)))
        .next()
}

/// First visible absolute link leaving the page's own host.
fn external_link(snapshot: &DomSnapshot) -> Option<Hit> {
    let own_host = Url::parse(&snapshot.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));

    snapshot.visible().filter(|e| e.tag == "a").find_map(|e| {
        let href = e.href()?;
        let target = Url::parse(href).ok()?;
        if !matches!(target.scheme(), "http" | "https") {
            return None;
        }
        let host = target.host_str()?.trim_start_matches("www.");
        if own_host.as_deref().is_some_and(|own| host == own || host.ends_with(&format!(".{own}"))) {
            return None;
        }
        Some(Hit::at(snapshot, e, href.to_string()))
    })
}

fn labeled_count(snapshot: &DomSnapshot, data_type: DataType) -> Option<Hit> {
    snapshot.visible().find_map(|e| {
        let (count, label) = patterns::labeled_count(e.text.trim())?;
        (label == data_type.key()).then(|| Hit::at(snapshot, e, count))
    })
}

/// Largest visible square image, the usual shape of a profile photo.
fn square_image(snapshot: &DomSnapshot) -> Option<Hit> {
    snapshot
        .visible()
        .filter(|e| e.tag == "img" && patterns::is_square(e))
        .filter_map(|e| patterns::element_value(DataType::ProfilePhoto, e).map(|src| (e, src)))
        .fold(None::<(&DomElement, String)>, |best, (e, src)| match best {
            Some((b, _)) if b.rect.area() >= e.rect.area() => best,
            _ => Some((e, src)),
        })
        .map(|(e, src)| Hit::at(snapshot, e, src))
}

fn dated_element(snapshot: &DomSnapshot) -> Option<Hit> {
    snapshot.visible().find_map(|e| {
        let text = e.text.trim();
        if !text.to_lowercase().contains("created") {
            return None;
        }
        let patterns = patterns::pattern_list(DataType::PageCreated, &[]);
        let (_, value) = patterns::match_patterns(DataType::PageCreated, &patterns, text)?;
        Some(Hit::at(snapshot, e, value))
    })
}
