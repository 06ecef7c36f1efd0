//! Adaptive extraction of business data from social profile pages.
//!
//! The engine learns which selectors work per site and page shape, strips
//! honeypot elements before reading anything, falls back through a cascade
//! of strategies when learned selectors stop working, and clicks through to
//! labelled sections with bounded retries.

pub mod config;
pub mod dom;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod honeypot;
pub mod models;
pub mod navigation;
pub mod patterns;
pub mod profile_finder;
pub mod session;
pub mod store;
pub mod traits;
pub mod url_pattern;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use extractor::CascadingExtractor;
pub use honeypot::HoneypotDetector;
pub use models::{BusinessProfile, DataType};
pub use navigation::NavigationController;
pub use profile_finder::ProfileFinder;
pub use session::{CancelHandle, Session};
pub use store::{KnowledgeStore, TrapRegistry};
pub use traits::{ElementHandle, PageDriver};
