//! Regex patterns, value refinement and scoring heuristics per data type.
//!
//! Everything here is stateless. Learned patterns live in the Knowledge
//! Store and are merged in front of the built-in defaults by
//! [`pattern_list`]; the defaults are always kept as a fallback.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::dom::{DomElement, collapse_whitespace};
use crate::models::DataType;

const EMAIL: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const PHONE: &str = r"(?:\+\d{1,3}[\s.-]?)?\(?\d{2,4}\)?[\s.-]?\d{3,4}[\s.-]?\d{3,4}";
const ADDRESS: &str = r"\d{1,5}\s+(?:[A-Za-z0-9.'-]+\s+){0,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Way|Court|Ct|Place|Pl)\b\.?(?:,\s*[A-Za-z .'-]+)*(?:,?\s*[A-Z]{2})?(?:\s+\d{5}(?:-\d{4})?)?";
const FOLLOWERS: &str = r"(?i)(\d[\d.,]*\s?[KMB]?)\s+followers\b";
const FOLLOWERS_LABEL_FIRST: &str = r"(?i)\bfollowers\s*[:·]?\s*(\d[\d.,]*\s?[KMB]?)\b";
const LIKES: &str = r"(?i)(\d[\d.,]*\s?[KMB]?)\s+(?:likes|people like this)\b";
const LIKES_LABEL_FIRST: &str = r"(?i)\blikes\s*[:·]?\s*(\d[\d.,]*\s?[KMB]?)\b";
const WEBSITE: &str = r#"(?i)\bhttps?://[^\s<>"']+"#;
const PAGE_CREATED: &str = r"(?i)(?:page\s+)?created\s*[-:–]?\s*((?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4})";
const CATEGORY: &str = r"(?i)\b(?:page|category)\s*[·:]\s*([A-Z][A-Za-z &/-]{2,40})";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(EMAIL).expect("email regex is valid"));
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PHONE).expect("phone regex is valid"));
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d[\d.,]*\s?[KMB]?\b").expect("count regex is valid"));
static LABELED_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d.,]*\s?[KMB]?)\s*(followers|likes|people like this)\b").expect("labeled count regex is valid")
});
static STREET_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,5}\s+\w+.*\b(street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|way|court|ct|place|pl)\b")
        .expect("street regex is valid")
});
static FIVE_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").expect("zip regex is valid"));
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:[a-z0-9-]+\.)+[a-z]{2,}(?:/\S*)?$").expect("domain regex is valid")
});
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PAGE_CREATED).expect("date regex is valid"));

/// Built-in patterns for `data_type`, most specific first.
pub fn default_patterns(data_type: DataType) -> &'static [&'static str] {
    match data_type {
        DataType::Email => &[EMAIL],
        DataType::Phone => &[PHONE],
        DataType::Address => &[ADDRESS],
        DataType::Website => &[WEBSITE],
        DataType::Followers => &[FOLLOWERS, FOLLOWERS_LABEL_FIRST],
        DataType::Likes => &[LIKES, LIKES_LABEL_FIRST],
        DataType::PageCreated => &[PAGE_CREATED],
        DataType::Category => &[CATEGORY],
        DataType::CompanyName | DataType::ProfilePhoto => &[],
    }
}

/// Learned patterns first, then the defaults not already learned.
pub fn pattern_list(data_type: DataType, learned: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::with_capacity(learned.len() + 2);
    for pattern in learned
        .iter()
        .map(String::as_str)
        .chain(default_patterns(data_type).iter().copied())
    {
        if !patterns.iter().any(|p| p == pattern) {
            patterns.push(pattern.to_string());
        }
    }
    patterns
}

/// First pattern producing a refined value in `text`, as `(pattern, value)`.
/// A pattern's first capture group is the value when present.
pub fn match_patterns(data_type: DataType, patterns: &[String], text: &str) -> Option<(String, String)> {
    for pattern in patterns {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(field = %data_type, pattern = %pattern, "Skipping invalid pattern: {}", e);
                continue;
            }
        };
        for captures in regex.captures_iter(text) {
            let Some(found) = captures.get(1).or_else(|| captures.get(0)) else {
                continue;
            };
            if let Some(value) = refine(data_type, found.as_str()) {
                return Some((pattern.clone(), value));
            }
        }
    }
    None
}

/// Normalize a raw candidate to the shape expected for `data_type`, or
/// reject it.
pub fn refine(data_type: DataType, raw: &str) -> Option<String> {
    let text = collapse_whitespace(raw);
    if text.is_empty() {
        return None;
    }
    match data_type {
        DataType::Email => EMAIL_RE.find(&text).map(|m| m.as_str().to_string()),
        DataType::Phone => PHONE_RE
            .find(&text)
            .map(|m| m.as_str().trim().to_string())
            .filter(|phone| phone.chars().filter(char::is_ascii_digit).count() >= 7),
        DataType::Followers | DataType::Likes => COUNT_RE
            .find(&text)
            .map(|m| m.as_str().split_whitespace().collect::<String>().to_uppercase()),
        DataType::Website => DOMAIN_RE.is_match(&text).then_some(text),
        DataType::PageCreated => {
            let date = DATE_RE
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            Some(date.unwrap_or(text))
        }
        _ => Some(text),
    }
}

/// Semantically relevant value of an element: image source, decoded
/// `mailto:`/`tel:` target, link target for websites, otherwise its text.
pub fn element_value(data_type: DataType, element: &DomElement) -> Option<String> {
    if let Some(href) = element.href() {
        let lower = href.to_ascii_lowercase();
        if let Some(target) = lower.strip_prefix("mailto:").map(|_| &href["mailto:".len()..]) {
            return refine(data_type, &decode_target(target));
        }
        if let Some(target) = lower.strip_prefix("tel:").map(|_| &href["tel:".len()..]) {
            return refine(data_type, &decode_target(target));
        }
        if data_type == DataType::Website
            && let Some(value) = refine(data_type, href)
        {
            return Some(value);
        }
    }

    if element.tag == "img" || data_type == DataType::ProfilePhoto {
        let source = element
            .attr("src")
            .or_else(|| element.attr("data-src"))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(source) = source {
            return Some(source.to_string());
        }
    }

    if element.tag == "meta" {
        return element.attr("content").and_then(|c| refine(data_type, c));
    }

    refine(data_type, &element.text)
}

fn decode_target(target: &str) -> String {
    let target = target.split('?').next().unwrap_or_default();
    urlencoding::decode(target)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| target.to_string())
}

pub fn looks_like_phone(text: &str) -> bool {
    refine(DataType::Phone, text).is_some()
}

pub fn looks_like_email(text: &str) -> bool {
    EMAIL_RE.is_match(text)
}

pub fn has_street_suffix(text: &str) -> bool {
    STREET_SUFFIX_RE.is_match(text)
}

pub fn looks_like_date(text: &str) -> bool {
    DATE_RE.is_match(text)
}

/// Count and label (`followers` / `likes`) in a labelled count such as
/// "1.2K followers".
pub fn labeled_count(text: &str) -> Option<(String, String)> {
    let captures = LABELED_COUNT_RE.captures(text)?;
    let count = refine(DataType::Followers, captures.get(1)?.as_str())?;
    let label = captures.get(2)?.as_str().to_lowercase();
    let label = if label.starts_with("follower") { "followers" } else { "likes" };
    Some((count, label.to_string()))
}

pub fn is_square(element: &DomElement) -> bool {
    let (w, h) = (element.rect.width, element.rect.height);
    w >= 40.0 && h >= 40.0 && (w - h).abs() <= w.max(h) * 0.1
}

/// Deterministic score of `element` as a candidate for `data_type`.
pub fn score(data_type: DataType, element: &DomElement) -> i32 {
    let text = element.text.trim();
    let href = element.href().unwrap_or_default().to_ascii_lowercase();
    let mut score = 0;

    match data_type {
        DataType::CompanyName => {
            if element.tag == "h1" {
                score += 20;
            }
            if (5..100).contains(&text.chars().count()) {
                score += 10;
            }
            if text.chars().next().is_some_and(char::is_uppercase) {
                score += 5;
            }
            if element.rect.y >= 0.0 && element.rect.y < 300.0 {
                score += 10;
            }
        }
        DataType::Email => {
            if text.contains('@') {
                score += 30;
            }
            if element.tag == "a" && href.starts_with("mailto:") {
                score += 25;
            }
        }
        DataType::Phone => {
            if looks_like_phone(text) {
                score += 25;
            }
            if element.tag == "a" && href.starts_with("tel:") {
                score += 20;
            }
        }
        DataType::Address => {
            if has_street_suffix(text) {
                score += 20;
            }
            if FIVE_DIGITS_RE.is_match(text) {
                score += 15;
            }
        }
        DataType::Website => {
            if element.tag == "a" && (href.starts_with("http://") || href.starts_with("https://")) {
                score += 20;
            }
            if DOMAIN_RE.is_match(text) {
                score += 10;
            }
        }
        DataType::Followers | DataType::Likes => {
            if labeled_count(text).is_some_and(|(_, label)| label == data_type.key()) {
                score += 25;
            }
        }
        DataType::ProfilePhoto => {
            if element.tag == "img" {
                score += 20;
                if is_square(element) {
                    score += 20;
                }
            }
        }
        DataType::PageCreated => {
            if looks_like_date(text) {
                score += 25;
            }
        }
        DataType::Category => {}
    }

    if element.attr("data-testid").is_some() {
        score += 15;
    }
    if element.attr("aria-label").is_some() {
        score += 10;
    }
    if element.class_attr().to_lowercase().contains(data_type.class_token()) {
        score += 10;
    }
    score
}
