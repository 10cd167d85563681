//! Proxy caches in front of a remote repository.
//!
//! A [`ProxyCache`] decides whether a remote fetch is needed. [`NoopCache`]
//! always fetches. [`StorageCache`] serves stored content and writes remote
//! content through to its storage, running at most one fetch per key no
//! matter how many callers ask for it at once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::content::Content;
use crate::error::{RegistryError, Result};
use crate::key::Key;
use crate::storage::Storage;

/// Deferred remote fetch, invoked only if the cache decides it needs one.
pub type RemoteFetch = Box<dyn FnOnce() -> BoxFuture<'static, Result<Content>> + Send>;

/// Loads content for a key, consulting the remote only when required.
#[async_trait]
pub trait ProxyCache: fmt::Debug + Send + Sync {
    async fn load(&self, key: &Key, remote: RemoteFetch) -> Result<Content>;
}

/// A cache that stores nothing; every load goes to the remote.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl ProxyCache for NoopCache {
    async fn load(&self, _key: &Key, remote: RemoteFetch) -> Result<Content> {
        remote().await
    }
}

/// Outcome of one write-through fetch, shared by every caller waiting on it.
type SharedFetch = Shared<BoxFuture<'static, Result<()>>>;

/// A write-through cache backed by a [`Storage`].
///
/// Clones share the same in-flight registry.
#[derive(Clone)]
pub struct StorageCache {
    storage: Arc<dyn Storage>,
    inflight: Arc<DashMap<Key, SharedFetch>>,
}

impl StorageCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        StorageCache {
            storage,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys with a remote fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Join the running fetch for `key`, or register a new one.
    ///
    /// The sender is returned only to the caller that registered the fetch;
    /// that caller must start it. No map guard outlives this call.
    fn join_or_start(&self, key: &Key) -> (SharedFetch, Option<oneshot::Sender<Result<()>>>) {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(%key, "joining in-flight remote fetch");
                (entry.get().clone(), None)
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                let path = key.to_string();
                let outcome = rx
                    .map(move |received| {
                        received.unwrap_or_else(|_| {
                            Err(RegistryError::Fetch {
                                path,
                                status: None,
                                detail: "remote fetch task ended without an outcome".to_string(),
                            })
                        })
                    })
                    .boxed()
                    .shared();
                entry.insert(outcome.clone());
                (outcome, Some(tx))
            }
        }
    }
}

impl fmt::Debug for StorageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCache")
            .field("storage", &self.storage)
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

#[async_trait]
impl ProxyCache for StorageCache {
    async fn load(&self, key: &Key, remote: RemoteFetch) -> Result<Content> {
        if self.storage.exists(key).await? {
            tracing::debug!(%key, "cache hit");
            return self.storage.read(key).await;
        }

        let (outcome, initiator) = self.join_or_start(key);
        if let Some(done) = initiator {
            tracing::debug!(%key, "cache miss, fetching from remote");
            let guard = InFlightGuard {
                inflight: Arc::clone(&self.inflight),
                key: key.clone(),
            };
            // Spawned so the fetch completes even if every caller goes away.
            tokio::spawn(fetch_through(
                Arc::clone(&self.storage),
                guard,
                remote,
                done,
            ));
        }

        outcome.await?;
        self.storage.read(key).await
    }
}

/// Removes an in-flight entry when the fetch ends, including by panic.
struct InFlightGuard {
    inflight: Arc<DashMap<Key, SharedFetch>>,
    key: Key,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

async fn fetch_through(
    storage: Arc<dyn Storage>,
    guard: InFlightGuard,
    remote: RemoteFetch,
    done: oneshot::Sender<Result<()>>,
) {
    let outcome = write_through(storage.as_ref(), &guard.key, remote).await;
    if let Err(err) = &outcome {
        tracing::debug!(key = %guard.key, error = %err, "remote fetch failed");
    }
    // Deregister before publishing so later callers find the stored entry.
    drop(guard);
    let _ = done.send(outcome);
}

async fn write_through(storage: &dyn Storage, key: &Key, remote: RemoteFetch) -> Result<()> {
    // An earlier fetch may have finished between the caller's check and ours.
    if storage.exists(key).await? {
        return Ok(());
    }
    let content = remote().await?;
    storage.save(key, content).await?;
    tracing::debug!(%key, "stored remote artifact");
    Ok(())
}
