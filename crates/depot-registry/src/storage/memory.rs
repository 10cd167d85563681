use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::Storage;
use crate::content::Content;
use crate::error::{Result, StorageError};
use crate::key::Key;

/// An in-memory `Storage` implementation using `tokio::sync::RwLock`.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<BTreeMap<Key, Bytes>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save(&self, key: &Key, content: Content) -> Result<()> {
        // Drain the stream before taking the lock so a slow producer does
        // not block other keys.
        let bytes = content.into_bytes().await?;
        self.data.write().await.insert(key.clone(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &Key) -> Result<bool> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn read(&self, key: &Key) -> Result<Content> {
        let guard = self.data.read().await;
        match guard.get(key) {
            Some(bytes) => Ok(Content::from_bytes(bytes.clone())),
            None => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
        }
    }

    async fn list(&self, prefix: &Key) -> Result<Vec<Key>> {
        let guard = self.data.read().await;
        Ok(guard
            .range(prefix.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .filter(|key| *key != prefix)
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        match self.data.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
        }
    }
}
