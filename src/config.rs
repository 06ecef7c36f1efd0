//! Environment-driven configuration.
//!
//! Values come from a `.env` file (loaded by the binary through `dotenvy`)
//! and the process environment. Every setting has a default, so
//! `Config::default()` is a complete configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Thresholds that drive rediscovery and pruning of learned selectors.
#[derive(Debug, Clone)]
pub struct LearningPolicy {
    /// A failure counts as recent when it happened within this window.
    pub recent_failure_window: Duration,
    /// Records below this success ratio count as low confidence.
    pub low_confidence_ratio: f64,
    /// Rediscover when recent low-confidence records exceed this share of the bucket.
    pub rediscover_fraction: f64,
    /// The optimizer prunes records below this success ratio...
    pub prune_ratio: f64,
    /// ...once they have at least this many attempts.
    pub prune_min_attempts: u64,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            recent_failure_window: Duration::from_secs(60),
            low_confidence_ratio: 0.3,
            rediscover_fraction: 0.5,
            prune_ratio: 0.3,
            prune_min_attempts: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrapPolicy {
    pub max_per_host: usize,
    pub max_detected: usize,
}

impl Default for TrapPolicy {
    fn default() -> Self {
        Self {
            max_per_host: 500,
            max_detected: 200,
        }
    }
}

/// Ceiling on navigation attempts; retries are never unbounded.
pub const MAX_NAVIGATION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub presence_timeout: Duration,
    pub settle: Duration,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_NAVIGATION_ATTEMPTS,
            base_delay: Duration::from_millis(1000),
            presence_timeout: Duration::from_millis(3000),
            settle: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub knowledge_path: PathBuf,
    pub traps_path: PathBuf,
    pub targets: Vec<String>,
    pub schedule: String,
    pub log_json: bool,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Deadline for scraping one target end to end.
    pub session_timeout: Duration,
    pub about_tab: String,
    pub transparency_tab: String,
    pub learning: LearningPolicy,
    pub traps: TrapPolicy,
    pub navigation: NavigationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            knowledge_path: PathBuf::from("data/knowledge.json"),
            traps_path: PathBuf::from("data/traps.json"),
            targets: Vec::new(),
            schedule: "0 */30 * * * *".to_string(),
            log_json: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(20),
            session_timeout: Duration::from_secs(120),
            about_tab: "About".to_string(),
            transparency_tab: "Page transparency".to_string(),
            learning: LearningPolicy::default(),
            traps: TrapPolicy::default(),
            navigation: NavigationPolicy::default(),
        }
    }
}

impl Config {
    /// Build the configuration from `EXTRACTOR_*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get("EXTRACTOR_KNOWLEDGE_PATH") {
            config.knowledge_path = PathBuf::from(path);
        }
        if let Some(path) = get("EXTRACTOR_TRAPS_PATH") {
            config.traps_path = PathBuf::from(path);
        }
        if let Some(targets) = get("EXTRACTOR_TARGETS") {
            config.targets = targets
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(schedule) = get("EXTRACTOR_SCHEDULE") {
            config.schedule = schedule;
        }
        if let Some(agent) = get("EXTRACTOR_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(label) = get("EXTRACTOR_ABOUT_TAB") {
            config.about_tab = label;
        }
        if let Some(label) = get("EXTRACTOR_TRANSPARENCY_TAB") {
            config.transparency_tab = label;
        }

        config.log_json = parse(&get, "EXTRACTOR_LOG_JSON")?.unwrap_or(config.log_json);
        if let Some(secs) = parse::<u64, _>(&get, "EXTRACTOR_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&get, "EXTRACTOR_SESSION_TIMEOUT_SECS")? {
            config.session_timeout = Duration::from_secs(secs);
        }

        let learning = &mut config.learning;
        if let Some(secs) = parse::<u64, _>(&get, "EXTRACTOR_RECENT_FAILURE_SECS")? {
            learning.recent_failure_window = Duration::from_secs(secs);
        }
        learning.low_confidence_ratio =
            ratio(&get, "EXTRACTOR_LOW_CONFIDENCE_RATIO")?.unwrap_or(learning.low_confidence_ratio);
        learning.rediscover_fraction =
            ratio(&get, "EXTRACTOR_REDISCOVER_FRACTION")?.unwrap_or(learning.rediscover_fraction);
        learning.prune_ratio = ratio(&get, "EXTRACTOR_PRUNE_RATIO")?.unwrap_or(learning.prune_ratio);
        learning.prune_min_attempts =
            parse(&get, "EXTRACTOR_PRUNE_MIN_ATTEMPTS")?.unwrap_or(learning.prune_min_attempts);

        config.traps.max_per_host =
            parse(&get, "EXTRACTOR_MAX_TRAPS_PER_HOST")?.unwrap_or(config.traps.max_per_host);
        config.traps.max_detected =
            parse(&get, "EXTRACTOR_MAX_DETECTED_TRAPS")?.unwrap_or(config.traps.max_detected);

        let navigation = &mut config.navigation;
        navigation.max_attempts = parse(&get, "EXTRACTOR_NAV_ATTEMPTS")?.unwrap_or(navigation.max_attempts);
        if !(1..=MAX_NAVIGATION_ATTEMPTS).contains(&navigation.max_attempts) {
            return Err(invalid("EXTRACTOR_NAV_ATTEMPTS", "must be 1 or 2"));
        }
        if let Some(ms) = parse::<u64, _>(&get, "EXTRACTOR_NAV_BASE_DELAY_MS")? {
            navigation.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&get, "EXTRACTOR_PRESENCE_TIMEOUT_MS")? {
            navigation.presence_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&get, "EXTRACTOR_SETTLE_MS")? {
            navigation.settle = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T, G>(get: &G, key: &str) -> EngineResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(key, &e.to_string())))
        .transpose()
}

fn ratio<G>(get: &G, key: &str) -> EngineResult<Option<f64>>
where
    G: Fn(&str) -> Option<String>,
{
    match parse::<f64, _>(get, key)? {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(invalid(key, "must be within 0.0..=1.0")),
        other => Ok(other),
    }
}

fn invalid(key: &str, message: &str) -> EngineError {
    EngineError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}
