//! Persistent knowledge: learned selectors and trap registries.

mod document;
mod knowledge;
mod shared;
mod traps;

pub use document::JsonDocument;
pub use knowledge::{KnowledgeStats, KnowledgeStore, prune_bucket, rank_selectors, should_rediscover};
pub use shared::SharedDocument;
pub use traps::{TrapRegistry, merge_traps};
