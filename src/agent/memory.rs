use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("memory store error: {0}")]
pub struct MemoryError(pub String);

/// Optional long-lived notes shared across steps and runs.
///
/// The loop treats every failure here as non-fatal.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn recall(&self, key: &str) -> Result<Option<String>, MemoryError>;
    async fn remember(&self, key: &str, value: &str) -> Result<(), MemoryError>;
}

#[async_trait]
impl<T: MemoryStore + ?Sized> MemoryStore for Arc<T> {
    async fn recall(&self, key: &str) -> Result<Option<String>, MemoryError> {
        (**self).recall(key).await
    }

    async fn remember(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        (**self).remember(key, value).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn recall(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| MemoryError(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn remember(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| MemoryError(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
