//! Data models for learned selectors, trap registries and extracted profiles

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A field the engine knows how to extract from a profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    CompanyName,
    Category,
    Email,
    Phone,
    Address,
    Website,
    Followers,
    Likes,
    ProfilePhoto,
    PageCreated,
}

impl DataType {
    pub const ALL: [DataType; 10] = [
        DataType::CompanyName,
        DataType::Category,
        DataType::Email,
        DataType::Phone,
        DataType::Address,
        DataType::Website,
        DataType::Followers,
        DataType::Likes,
        DataType::ProfilePhoto,
        DataType::PageCreated,
    ];

    /// Knowledge Store field key.
    pub fn key(self) -> &'static str {
        match self {
            DataType::CompanyName => "company_name",
            DataType::Category => "category",
            DataType::Email => "email",
            DataType::Phone => "phone",
            DataType::Address => "address",
            DataType::Website => "website",
            DataType::Followers => "followers",
            DataType::Likes => "likes",
            DataType::ProfilePhoto => "profile_photo",
            DataType::PageCreated => "page_created",
        }
    }

    /// Token looked for in class names by the scoring heuristics.
    pub fn class_token(self) -> &'static str {
        match self {
            DataType::CompanyName => "name",
            DataType::Category => "category",
            DataType::Email => "email",
            DataType::Phone => "phone",
            DataType::Address => "address",
            DataType::Website => "website",
            DataType::Followers => "follower",
            DataType::Likes => "like",
            DataType::ProfilePhoto => "photo",
            DataType::PageCreated => "created",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Bucket key for navigation selectors leading to a labelled section.
pub fn navigation_key(target: &str) -> String {
    format!("navigation:{}", target.trim().to_lowercase())
}

/// Success/failure statistics for one selector within a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorRecord {
    pub selector: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl SelectorRecord {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            success_count: 0,
            failure_count: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Share of attempts that succeeded; 0.0 for an untried record.
    pub fn success_ratio(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            total => self.success_count as f64 / total as f64,
        }
    }
}

/// Learned selectors and regex patterns for one (field, URL pattern) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorBucket {
    #[serde(default)]
    pub selectors: Vec<SelectorRecord>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SelectorBucket {
    pub fn record(&self, selector: &str) -> Option<&SelectorRecord> {
        self.selectors.iter().find(|r| r.selector == selector)
    }

    /// Existing record for `selector`, created at the end of the bucket if absent.
    pub fn record_mut(&mut self, selector: &str) -> &mut SelectorRecord {
        let position = match self.selectors.iter().position(|r| r.selector == selector) {
            Some(position) => position,
            None => {
                self.selectors.push(SelectorRecord::new(selector));
                self.selectors.len() - 1
            }
        };
        &mut self.selectors[position]
    }
}

/// Persisted Knowledge Store document: field key -> URL pattern -> bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    #[serde(default)]
    pub buckets: BTreeMap<String, BTreeMap<String, SelectorBucket>>,
}

impl KnowledgeSnapshot {
    pub fn bucket(&self, field: &str, url_pattern: &str) -> Option<&SelectorBucket> {
        self.buckets.get(field)?.get(url_pattern)
    }

    pub fn bucket_mut(&mut self, field: &str, url_pattern: &str) -> &mut SelectorBucket {
        self.buckets
            .entry(field.to_string())
            .or_default()
            .entry(url_pattern.to_string())
            .or_default()
    }

    pub fn buckets_mut(&mut self) -> impl Iterator<Item = (&str, &str, &mut SelectorBucket)> {
        self.buckets.iter_mut().flat_map(|(field, by_pattern)| {
            by_pattern
                .iter_mut()
                .map(move |(pattern, bucket)| (field.as_str(), pattern.as_str(), bucket))
        })
    }
}

/// Persisted Trap Registry document: host -> selectors in admission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapSnapshot {
    #[serde(default)]
    pub hosts: BTreeMap<String, Vec<String>>,
}

/// Extraction approaches, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Selector,
    Pattern,
    Heuristic,
    Scored,
}

impl Strategy {
    pub const CASCADE: [Strategy; 4] = [
        Strategy::Selector,
        Strategy::Pattern,
        Strategy::Heuristic,
        Strategy::Scored,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Selector => "selector",
            Strategy::Pattern => "pattern",
            Strategy::Heuristic => "heuristic",
            Strategy::Scored => "scored",
        };
        f.write_str(name)
    }
}

/// Outcome of running one strategy for one field. Never persisted.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub data_type: DataType,
    pub selectors_tried: Vec<String>,
    pub strategy_used: Strategy,
    pub result: Option<String>,
    pub succeeded: bool,
    /// Selector that produced `result`, when the strategy is selector-driven.
    pub winning_selector: Option<String>,
    /// Regex that produced `result`, for the pattern strategy.
    pub winning_pattern: Option<String>,
}

impl ExtractionAttempt {
    pub fn new(data_type: DataType, strategy: Strategy) -> Self {
        Self {
            data_type,
            selectors_tried: Vec::new(),
            strategy_used: strategy,
            result: None,
            succeeded: false,
            winning_selector: None,
            winning_pattern: None,
        }
    }

    pub fn tried(&mut self, selector: &str) {
        if !self.selectors_tried.iter().any(|s| s == selector) {
            self.selectors_tried.push(selector.to_string());
        }
    }
}

/// Business data extracted from one profile page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub url: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub followers: Option<String>,
    pub likes: Option<String>,
    pub profile_photo: Option<String>,
    pub page_created: Option<String>,
    pub extracted_at: Option<DateTime<Utc>>,
}

impl BusinessProfile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn field(&self, data_type: DataType) -> Option<&str> {
        match data_type {
            DataType::CompanyName => self.name.as_deref(),
            DataType::Category => self.category.as_deref(),
            DataType::Email => self.email.as_deref(),
            DataType::Phone => self.phone.as_deref(),
            DataType::Address => self.address.as_deref(),
            DataType::Website => self.website.as_deref(),
            DataType::Followers => self.followers.as_deref(),
            DataType::Likes => self.likes.as_deref(),
            DataType::ProfilePhoto => self.profile_photo.as_deref(),
            DataType::PageCreated => self.page_created.as_deref(),
        }
    }

    pub fn set_field(&mut self, data_type: DataType, value: Option<String>) {
        let slot = match data_type {
            DataType::CompanyName => &mut self.name,
            DataType::Category => &mut self.category,
            DataType::Email => &mut self.email,
            DataType::Phone => &mut self.phone,
            DataType::Address => &mut self.address,
            DataType::Website => &mut self.website,
            DataType::Followers => &mut self.followers,
            DataType::Likes => &mut self.likes,
            DataType::ProfilePhoto => &mut self.profile_photo,
            DataType::PageCreated => &mut self.page_created,
        };
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untried_record_has_zero_ratio() {
        let record = SelectorRecord::new("h1");
        assert_eq!(record.attempts(), 0);
        assert_eq!(record.success_ratio(), 0.0);
    }

    #[test]
    fn record_mut_creates_once() {
        let mut bucket = SelectorBucket::default();
        bucket.record_mut("h1").success_count += 1;
        bucket.record_mut("h1").success_count += 1;
        assert_eq!(bucket.selectors.len(), 1);
        assert_eq!(bucket.record("h1").unwrap().success_count, 2);
    }

    #[test]
    fn snapshot_json_shape_is_nested_by_field_then_pattern() {
        let mut snapshot = KnowledgeSnapshot::default();
        snapshot.bucket_mut("email", "acme.test/about").record_mut("a.mail");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json["buckets"]["email"]["acme.test/about"]["selectors"][0]["selector"],
            "a.mail"
        );
        let back: KnowledgeSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn navigation_key_is_case_insensitive() {
        assert_eq!(navigation_key(" About "), navigation_key("about"));
    }
}
