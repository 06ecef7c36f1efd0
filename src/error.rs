//! Error taxonomy for the extraction engine.
//!
//! Extraction and navigation misses are not represented here: they are
//! ordinary `None` / `false` results. These variants cover the faults that
//! the cascade catches at the point of use and the storage faults that the
//! stores log and swallow.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("store I/O failed for {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("page evaluation failed: {0}")]
    DomEvaluation(String),

    #[error("element {0} vanished from the page")]
    ElementVanished(usize),

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("session cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;
