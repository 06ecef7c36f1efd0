use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// A whole JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the document; `Ok(None)` when it does not exist yet.
    pub async fn read<T: DeserializeOwned>(&self) -> EngineResult<Option<T>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EngineError::Store {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Overwrite the whole document. Writes a sibling temp file and renames
    /// it over the target so readers never see a half-written document.
    pub async fn write<T: Serialize>(&self, value: &T) -> EngineResult<()> {
        let body = serde_json::to_vec_pretty(value)?;
        let store_err = |source: std::io::Error| EngineError::Store {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(store_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).await.map_err(store_err)?;
        fs::rename(&tmp, &self.path).await.map_err(store_err)?;
        debug!(path = %self.path.display(), "Store document written");
        Ok(())
    }
}
