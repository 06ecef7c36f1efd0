use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};

use crate::config::Config;
use crate::driver::StaticPage;
use crate::extractor::CascadingExtractor;
use crate::honeypot::HoneypotDetector;
use crate::models::{BusinessProfile, DataType};
use crate::navigation::NavigationController;
use crate::session::Session;
use crate::store::{KnowledgeStore, TrapRegistry};
use crate::traits::PageDriver;

/// Fields read from the landing view of a profile.
const LANDING_FIELDS: [DataType; 9] = [
    DataType::CompanyName,
    DataType::Category,
    DataType::Followers,
    DataType::Likes,
    DataType::ProfilePhoto,
    DataType::Email,
    DataType::Phone,
    DataType::Address,
    DataType::Website,
];

/// Fields usually only shown in the About section.
const CONTACT_FIELDS: [DataType; 4] = [DataType::Email, DataType::Phone, DataType::Address, DataType::Website];

#[derive(Clone)]
pub struct ProfileFinder {
    config: Arc<Config>,
    client: Client,
    store: KnowledgeStore,
    detector: HoneypotDetector,
    extractor: CascadingExtractor,
    navigator: NavigationController,
}

impl ProfileFinder {
    pub async fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let store = KnowledgeStore::open(&config.knowledge_path, config.learning.clone()).await;
        let registry = TrapRegistry::open(&config.traps_path, config.traps.max_per_host).await;
        let detector = HoneypotDetector::new(registry, config.traps.clone());
        let extractor = CascadingExtractor::new(store.clone(), detector.clone());
        let navigator = NavigationController::new(store.clone(), detector.clone(), config.navigation.clone());

        Ok(Self {
            config: Arc::new(config),
            client,
            store,
            detector,
            extractor,
            navigator,
        })
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Strip traps, read the landing fields, then visit the About and
    /// transparency sections for what the landing view did not show.
    /// Section navigation failures only leave fields empty.
    pub async fn scrape_profile(&self, session: &mut Session) -> BusinessProfile {
        let span = session.span();
        async {
            let mut profile = BusinessProfile::new(session.url());
            self.detector.strip(session).await;

            for data_type in LANDING_FIELDS {
                let value = self.extractor.extract(data_type, session).await;
                profile.set_field(data_type, value);
            }

            let missing: Vec<DataType> = CONTACT_FIELDS
                .into_iter()
                .filter(|&data_type| profile.field(data_type).is_none())
                .collect();
            if !missing.is_empty() && self.navigator.navigate(session, &self.config.about_tab, None).await {
                for data_type in missing {
                    let value = self.extractor.extract(data_type, session).await;
                    profile.set_field(data_type, value);
                }
            }

            if self
                .navigator
                .navigate(session, &self.config.transparency_tab, None)
                .await
            {
                let created = self.extractor.extract(DataType::PageCreated, session).await;
                profile.set_field(DataType::PageCreated, created);
            }

            profile.extracted_at = Some(Utc::now());
            let found = DataType::ALL.iter().filter(|&&d| profile.field(d).is_some()).count();
            info!(found, total = DataType::ALL.len(), "Profile scraped");
            profile
        }
        .instrument(span)
        .await
    }

    /// Scrape a page the caller already opened. The session is cancelled
    /// when the configured deadline passes.
    pub async fn scrape_page(&self, page: Box<dyn PageDriver>) -> Result<BusinessProfile> {
        let mut session = Session::open(page).await?;
        let cancel = session.cancel_handle();
        let deadline = self.config.session_timeout;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        });
        let profile = self.scrape_profile(&mut session).await;
        timer.abort();

        if session.is_cancelled() {
            warn!(url = %session.url(), "Session hit its deadline, profile is partial");
        }
        Ok(profile)
    }

    pub async fn scrape_url(&self, url: &str) -> Result<BusinessProfile> {
        let page = StaticPage::fetch(self.client.clone(), url).await?;
        self.scrape_page(Box::new(page)).await
    }

    /// Scrape every configured target concurrently.
    pub async fn check_targets(&self) -> Result<Vec<BusinessProfile>> {
        if self.config.targets.is_empty() {
            info!("No targets configured");
            return Ok(Vec::new());
        }

        let mut tasks = JoinSet::new();
        for target in self.config.targets.iter().cloned() {
            let finder = self.clone();
            tasks.spawn(async move {
                let result = finder.scrape_url(&target).await;
                (target, result)
            });
        }

        let mut profiles = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(profile))) => {
                    info!("{}", serde_json::to_string(&profile)?);
                    profiles.push(profile);
                }
                Ok((target, Err(e))) => error!(target = %target, "Error scraping profile: {:#}", e),
                Err(e) => error!("Scrape task failed: {}", e),
            }
        }

        info!(scraped = profiles.len(), targets = self.config.targets.len(), "Finished target run");
        Ok(profiles)
    }

    /// Prune weak selectors and log what the store now holds.
    pub async fn optimize(&self) -> usize {
        let removed = self.store.optimize_extraction().await;
        let stats = self.store.stats();
        info!(
            removed,
            buckets = stats.buckets,
            selectors = stats.selectors,
            patterns = stats.patterns,
            "Knowledge store optimized"
        );
        removed
    }
}
