use std::path::PathBuf;

use tracing::info;

use super::shared::SharedDocument;
use crate::models::TrapSnapshot;
use crate::url_pattern::host_of;

/// Honeypot selectors per host, persisted across sessions.
///
/// Entries are only ever added. When a host exceeds its cap the
/// earliest-admitted selectors are evicted.
#[derive(Clone)]
pub struct TrapRegistry {
    document: SharedDocument<TrapSnapshot>,
    max_per_host: usize,
}

impl TrapRegistry {
    pub async fn open(path: impl Into<PathBuf>, max_per_host: usize) -> Self {
        Self {
            document: SharedDocument::open(path).await,
            max_per_host,
        }
    }

    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    /// Known trap selectors for the host of `url`; empty on a first visit.
    pub fn get_known_traps_for(&self, url: &str) -> Vec<String> {
        self.document
            .current()
            .hosts
            .get(&host_of(url))
            .cloned()
            .unwrap_or_default()
    }

    /// Merge `traps` into the host's registry. Returns the host's registry
    /// after the merge.
    pub async fn add_traps(&self, url: &str, traps: &[String]) -> Vec<String> {
        let host = host_of(url);
        let incoming = traps.to_vec();
        let cap = self.max_per_host;

        let merged = self
            .document
            .mutate({
                let host = host.clone();
                move |snapshot: &mut TrapSnapshot| {
                    let entry = snapshot.hosts.entry(host).or_default();
                    let added = merge_traps(entry, &incoming, cap);
                    (added, entry.clone())
                }
            })
            .await;

        match merged {
            Some((added, registry)) => {
                if added > 0 {
                    info!(host = %host, added, total = registry.len(), "Trap registry updated");
                }
                registry
            }
            None => self.get_known_traps_for(url),
        }
    }
}

/// Append unseen selectors in order, then evict from the front down to
/// `cap`. Returns how many selectors were newly admitted.
pub fn merge_traps(existing: &mut Vec<String>, incoming: &[String], cap: usize) -> usize {
    let mut added = 0;
    for trap in incoming.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !existing.iter().any(|e| e == trap) {
            existing.push(trap.to_string());
            added += 1;
        }
    }
    if existing.len() > cap {
        let overflow = existing.len() - cap;
        existing.drain(..overflow);
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let incoming = set(&["#a", ".b", "#a"]);
        let mut once = set(&["#z"]);
        merge_traps(&mut once, &incoming, 10);

        let mut twice = set(&["#z"]);
        merge_traps(&mut twice, &incoming, 10);
        assert_eq!(merge_traps(&mut twice, &incoming, 10), 0);

        assert_eq!(once, twice);
        assert_eq!(once, set(&["#z", "#a", ".b"]));
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let mut registry = Vec::new();
        for batch in [set(&["1", "2", "3"]), set(&["4", "5"]), set(&["6"])] {
            merge_traps(&mut registry, &batch, 4);
            assert!(registry.len() <= 4);
        }
        assert_eq!(registry, set(&["3", "4", "5", "6"]));
    }

    #[tokio::test]
    async fn registry_is_keyed_by_host_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.json");
        let registry = TrapRegistry::open(&path, 3).await;

        assert!(registry.get_known_traps_for("https://social.test/acme").is_empty());
        registry
            .add_traps("https://www.social.test/acme", &set(&["a.honeypot", "#bot"]))
            .await;
        let after = registry
            .add_traps("https://social.test/other/page", &set(&["#bot", "input[name=\"leave-empty\"]", "#x"]))
            .await;
        assert_eq!(after, set(&["#bot", "input[name=\"leave-empty\"]", "#x"]));

        let reopened = TrapRegistry::open(&path, 3).await;
        assert_eq!(reopened.get_known_traps_for("https://social.test/anything"), after);
        assert!(reopened.get_known_traps_for("https://elsewhere.test/").is_empty());
    }
}
