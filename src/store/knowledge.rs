use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::shared::SharedDocument;
use crate::config::LearningPolicy;
use crate::models::{KnowledgeSnapshot, SelectorBucket, SelectorRecord};

/// Selector statistics and learned patterns per (field, URL pattern).
///
/// The store is the only component allowed to mutate learned knowledge.
/// Callers read ranked selectors from the committed snapshot and report
/// outcomes through `record_success` / `record_failure`, each of which is
/// one serialized round trip against the document on disk.
#[derive(Clone)]
pub struct KnowledgeStore {
    document: SharedDocument<KnowledgeSnapshot>,
    policy: LearningPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub buckets: usize,
    pub selectors: usize,
    pub patterns: usize,
}

impl KnowledgeStore {
    pub async fn open(path: impl Into<PathBuf>, policy: LearningPolicy) -> Self {
        Self {
            document: SharedDocument::open(path).await,
            policy,
        }
    }

    pub fn policy(&self) -> &LearningPolicy {
        &self.policy
    }

    /// Re-read the persisted knowledge and make it the committed snapshot.
    pub async fn load(&self) -> Arc<KnowledgeSnapshot> {
        self.document.reload().await
    }

    /// Latest committed snapshot.
    pub fn snapshot(&self) -> Arc<KnowledgeSnapshot> {
        self.document.current()
    }

    /// Selectors for the bucket, best first.
    pub fn get_adaptive_selectors(&self, field: &str, url_pattern: &str) -> Vec<String> {
        self.snapshot()
            .bucket(field, url_pattern)
            .map(|bucket| {
                rank_selectors(bucket)
                    .into_iter()
                    .map(|r| r.selector.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Learned regex patterns for the bucket, oldest first.
    pub fn learned_patterns(&self, field: &str, url_pattern: &str) -> Vec<String> {
        self.snapshot()
            .bucket(field, url_pattern)
            .map(|bucket| bucket.patterns.clone())
            .unwrap_or_default()
    }

    pub fn should_rediscover(&self, field: &str, url_pattern: &str) -> bool {
        self.snapshot()
            .bucket(field, url_pattern)
            .is_some_and(|bucket| should_rediscover(bucket, Utc::now(), &self.policy))
    }

    pub async fn record_success(&self, field: &str, selectors: &[String], url_pattern: &str) {
        if selectors.is_empty() {
            return;
        }
        let (field, url_pattern, selectors) = owned(field, url_pattern, selectors);
        debug!(field = %field, url_pattern = %url_pattern, ?selectors, "Recording selector success");

        self.document
            .mutate(move |snapshot| {
                let now = Utc::now();
                let bucket = snapshot.bucket_mut(&field, &url_pattern);
                for selector in &selectors {
                    let record = bucket.record_mut(selector);
                    record.success_count += 1;
                    record.last_success_at = Some(now);
                }
            })
            .await;
    }

    pub async fn record_failure(&self, field: &str, selectors: &[String], reason: &str, url_pattern: &str) {
        if selectors.is_empty() {
            return;
        }
        let (field, url_pattern, selectors) = owned(field, url_pattern, selectors);
        debug!(field = %field, url_pattern = %url_pattern, reason, ?selectors, "Recording selector failure");

        self.document
            .mutate(move |snapshot| {
                let now = Utc::now();
                let bucket = snapshot.bucket_mut(&field, &url_pattern);
                for selector in &selectors {
                    let record = bucket.record_mut(selector);
                    record.failure_count += 1;
                    record.last_failure_at = Some(now);
                }
            })
            .await;
    }

    /// Remember a regex that produced a valid value for the bucket.
    pub async fn learn_pattern(&self, field: &str, url_pattern: &str, pattern: &str) {
        let known = self.snapshot().bucket(field, url_pattern).is_some_and(|b| b.patterns.iter().any(|p| p == pattern));
        if known {
            return;
        }
        let (field, url_pattern, pattern) = (field.to_string(), url_pattern.to_string(), pattern.to_string());

        self.document
            .mutate(move |snapshot| {
                let bucket = snapshot.bucket_mut(&field, &url_pattern);
                if !bucket.patterns.contains(&pattern) {
                    bucket.patterns.push(pattern);
                }
            })
            .await;
    }

    /// Prune persistently poor selectors from every bucket. Returns the
    /// number of records removed.
    pub async fn optimize_extraction(&self) -> usize {
        let policy = self.policy.clone();
        let pruned = self
            .document
            .mutate(move |snapshot| {
                snapshot
                    .buckets_mut()
                    .map(|(field, pattern, bucket)| {
                        let pruned = prune_bucket(bucket, &policy);
                        if pruned > 0 {
                            debug!(field, url_pattern = pattern, pruned, "Pruned selectors");
                        }
                        pruned
                    })
                    .sum::<usize>()
            })
            .await
            .unwrap_or_default();

        info!("Optimization pruned {} selector records", pruned);
        pruned
    }

    pub fn stats(&self) -> KnowledgeStats {
        let snapshot = self.snapshot();
        snapshot
            .buckets
            .values()
            .flat_map(|by_pattern| by_pattern.values())
            .fold(KnowledgeStats::default(), |mut stats, bucket| {
                stats.buckets += 1;
                stats.selectors += bucket.selectors.len();
                stats.patterns += bucket.patterns.len();
                stats
            })
    }
}

fn owned(field: &str, url_pattern: &str, selectors: &[String]) -> (String, String, Vec<String>) {
    (field.to_string(), url_pattern.to_string(), selectors.to_vec())
}

/// Records ordered by success ratio, then total attempts, then most recent
/// success. Full ties keep bucket order.
pub fn rank_selectors(bucket: &SelectorBucket) -> Vec<&SelectorRecord> {
    let mut ranked: Vec<&SelectorRecord> = bucket.selectors.iter().collect();
    ranked.sort_by(|a, b| compare_records(b, a));
    ranked
}

fn compare_records(a: &SelectorRecord, b: &SelectorRecord) -> Ordering {
    a.success_ratio()
        .partial_cmp(&b.success_ratio())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.attempts().cmp(&b.attempts()))
        .then_with(|| a.last_success_at.cmp(&b.last_success_at))
}

/// True when more than `rediscover_fraction` of the bucket's records both
/// failed within the recent window and sit below the low-confidence ratio.
pub fn should_rediscover(bucket: &SelectorBucket, now: DateTime<Utc>, policy: &LearningPolicy) -> bool {
    if bucket.selectors.is_empty() {
        return false;
    }
    let window = chrono::Duration::from_std(policy.recent_failure_window).unwrap_or_else(|_| chrono::Duration::weeks(5200));

    let weak = bucket
        .selectors
        .iter()
        .filter(|r| {
            let recent = r
                .last_failure_at
                .is_some_and(|at| now.signed_duration_since(at) <= window);
            recent && r.success_ratio() < policy.low_confidence_ratio
        })
        .count();

    weak as f64 > bucket.selectors.len() as f64 * policy.rediscover_fraction
}

/// Drop records below the prune ratio with enough attempts, sparing the
/// best-ranked record of the bucket.
pub fn prune_bucket(bucket: &mut SelectorBucket, policy: &LearningPolicy) -> usize {
    let Some(best) = rank_selectors(bucket).first().map(|r| r.selector.clone()) else {
        return 0;
    };
    let before = bucket.selectors.len();
    bucket.selectors.retain(|r| {
        r.selector == best || r.attempts() < policy.prune_min_attempts || r.success_ratio() >= policy.prune_ratio
    });
    before - bucket.selectors.len()
}
