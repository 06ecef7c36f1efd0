#![allow(dead_code)]

use std::time::Duration;

use adaptive_extractor::config::{LearningPolicy, NavigationPolicy, TrapPolicy};
use adaptive_extractor::driver::StaticPage;
use adaptive_extractor::{CascadingExtractor, HoneypotDetector, KnowledgeStore, NavigationController, Session, TrapRegistry};
use tempfile::TempDir;

pub const URL: &str = "https://social.test/acme";
pub const URL_PATTERN: &str = "social.test/acme";

pub struct Fixture {
    pub dir: TempDir,
    pub store: KnowledgeStore,
    pub registry: TrapRegistry,
    pub detector: HoneypotDetector,
    pub extractor: CascadingExtractor,
    pub navigator: NavigationController,
}

pub fn fast_navigation() -> NavigationPolicy {
    NavigationPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        presence_timeout: Duration::ZERO,
        settle: Duration::ZERO,
    }
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path().join("knowledge.json"), LearningPolicy::default()).await;
        let registry = TrapRegistry::open(dir.path().join("traps.json"), 500).await;
        let detector = HoneypotDetector::new(registry.clone(), TrapPolicy::default());
        let extractor = CascadingExtractor::new(store.clone(), detector.clone());
        let navigator = NavigationController::new(store.clone(), detector.clone(), fast_navigation());
        Self {
            dir,
            store,
            registry,
            detector,
            extractor,
            navigator,
        }
    }

    pub async fn reopen_store(&self) -> KnowledgeStore {
        KnowledgeStore::open(self.dir.path().join("knowledge.json"), LearningPolicy::default()).await
    }

    pub async fn reopen_registry(&self) -> TrapRegistry {
        TrapRegistry::open(self.dir.path().join("traps.json"), 500).await
    }
}

pub async fn session(html: &str) -> Session {
    Session::open(Box::new(StaticPage::from_html(URL, html))).await.unwrap()
}
