//! Key-addressed byte storage.
//!
//! The `Storage` trait abstracts over storage engines. Two backends ship with
//! the crate: [`InMemoryStorage`] for tests and embedding, and
//! [`FileStorage`] which lays keys out as files under a root directory.
//!
//! A `save` must become visible atomically: concurrent readers see either
//! the previous value or the complete new one, never a partial write. The
//! proxy cache relies on this when it releases waiters.

use async_trait::async_trait;

use crate::content::Content;
use crate::error::Result;
use crate::key::Key;

mod fs;
mod memory;

pub use fs::FileStorage;
pub use memory::InMemoryStorage;

/// Abstract storage backend.
#[async_trait]
pub trait Storage: std::fmt::Debug + Send + Sync {
    /// Store `content` under `key`, replacing any previous value.
    ///
    /// An error from the content stream itself is returned unchanged and
    /// leaves the previous value in place.
    async fn save(&self, key: &Key, content: Content) -> Result<()>;

    /// Check whether a value is stored under `key`.
    async fn exists(&self, key: &Key) -> Result<bool>;

    /// Stream the value stored under `key`.
    ///
    /// Fails with `StorageError::NotFound` if the key is absent.
    async fn read(&self, key: &Key) -> Result<Content>;

    /// All keys strictly below `prefix`, sorted.
    async fn list(&self, prefix: &Key) -> Result<Vec<Key>>;

    /// Remove the value under `key`.
    ///
    /// Fails with `StorageError::NotFound` if the key is absent.
    async fn delete(&self, key: &Key) -> Result<()>;
}
