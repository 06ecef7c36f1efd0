use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{error, warn};

use super::document::JsonDocument;

/// Process-wide shared document with a single-writer discipline.
///
/// Every mutation is a load -> mutate -> save round trip executed under one
/// writer lock, so concurrent sessions never overwrite each other's
/// updates. The round trip runs on a spawned task: a caller that gives up
/// waiting does not abort a write that already started. Reads are served
/// from the last committed value without touching the lock.
pub struct SharedDocument<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    document: JsonDocument,
    writer: Mutex<()>,
    committed: RwLock<Arc<T>>,
}

impl<T> Clone for SharedDocument<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static,
{
    /// Open the document at `path`. An absent or unreadable document starts
    /// out empty; the failure is logged.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let document = JsonDocument::new(path);
        let initial = match document.read::<T>().await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(path = %document.path().display(), "Starting from an empty store: {}", e);
                T::default()
            }
        };

        Self {
            inner: Arc::new(Inner {
                document,
                writer: Mutex::new(()),
                committed: RwLock::new(Arc::new(initial)),
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.inner.document.path().to_path_buf()
    }

    /// Last committed value.
    pub fn current(&self) -> Arc<T> {
        let guard = self.inner.committed.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Re-read the document from disk and commit it. Keeps the committed
    /// value when the document is absent or unreadable.
    pub async fn reload(&self) -> Arc<T> {
        let _writer = self.inner.writer.lock().await;
        match self.inner.document.read::<T>().await {
            Ok(Some(value)) => self.inner.commit(value),
            Ok(None) => self.current(),
            Err(e) => {
                warn!(path = %self.inner.document.path().display(), "Store reload failed: {}", e);
                self.current()
            }
        }
    }

    /// Apply `mutate` as one serialized load-merge-save round trip.
    ///
    /// A failed save is logged and swallowed; the mutation is still
    /// committed in memory. Returns `None` only if the writer task died.
    pub async fn mutate<R, F>(&self, mutate: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _writer = inner.writer.lock().await;

            let mut value = match inner.document.read::<T>().await {
                Ok(Some(value)) => value,
                Ok(None) => T::clone(&inner.current()),
                Err(e) => {
                    warn!(path = %inner.document.path().display(), "Store read failed, merging into memory: {}", e);
                    T::clone(&inner.current())
                }
            };

            let result = mutate(&mut value);

            if let Err(e) = inner.document.write(&value).await {
                warn!(path = %inner.document.path().display(), "Store save failed: {}", e);
            }
            inner.commit(value);
            result
        });

        match task.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(path = %self.inner.document.path().display(), "Store writer task failed: {}", e);
                None
            }
        }
    }
}

impl<T> Inner<T> {
    fn current(&self) -> Arc<T> {
        let guard = self.committed.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn commit(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut guard = self.committed.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&value);
        value
    }
}
