//! Digest siblings persisted next to stored artifacts.
//!
//! Layout:
//! ```text
//! org/example/artifact/1.0/
//!   artifact-1.0.jar
//!   artifact-1.0.jar.md5
//!   artifact-1.0.jar.sha1
//!   artifact-1.0.jar.sha256
//!   artifact-1.0.jar.sha512
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::content::Content;
use crate::error::Result;
use crate::integrity::{self, Algorithm, Checksum, ChecksumMap};
use crate::key::Key;
use crate::storage::Storage;

/// Reads, writes, and regenerates digest siblings in a storage.
#[derive(Debug, Clone)]
pub struct RepositoryChecksums {
    storage: Arc<dyn Storage>,
    algorithms: Vec<Algorithm>,
}

impl RepositoryChecksums {
    /// Checksums for every supported algorithm.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_algorithms(storage, &Algorithm::ALL)
    }

    pub fn with_algorithms(storage: Arc<dyn Storage>, algorithms: &[Algorithm]) -> Self {
        RepositoryChecksums {
            storage,
            algorithms: algorithms.to_vec(),
        }
    }

    /// Algorithms computed by [`generate`](Self::generate).
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Recompute the digests of the bytes stored under `key`, without
    /// persisting them.
    pub async fn compute(&self, key: &Key, algorithms: &[Algorithm]) -> Result<ChecksumMap> {
        let content = self.storage.read(key).await?;
        integrity::compute(content, algorithms).await
    }

    /// Recompute the digests of `key` and write them as siblings.
    pub async fn generate(&self, key: &Key) -> Result<ChecksumMap> {
        let sums = self.compute(key, &self.algorithms).await?;
        self.persist(key, &sums).await?;
        Ok(sums)
    }

    /// Write every digest in `sums` to its sibling key, overwriting older
    /// values.
    pub async fn persist(&self, key: &Key, sums: &ChecksumMap) -> Result<()> {
        for (algorithm, sum) in sums {
            let sibling = algorithm.sibling(key);
            self.storage
                .save(&sibling, Content::from_bytes(sum.as_str().to_string()))
                .await?;
        }
        tracing::debug!(%key, algorithms = sums.len(), "persisted checksums");
        Ok(())
    }

    /// The recorded digest text of `key` for `algorithm`, trimmed; `None` if
    /// it was never written.
    pub async fn of(&self, key: &Key, algorithm: Algorithm) -> Result<Option<String>> {
        let sibling = algorithm.sibling(key);
        if !self.storage.exists(&sibling).await? {
            return Ok(None);
        }
        let bytes = self.storage.read(&sibling).await?.into_bytes().await?;
        Ok(Some(String::from_utf8_lossy(&bytes).trim().to_string()))
    }

    /// Every recorded digest sibling of `key`.
    pub async fn recorded(&self, key: &Key) -> Result<BTreeMap<Algorithm, String>> {
        let mut recorded = BTreeMap::new();
        for algorithm in Algorithm::ALL {
            if let Some(text) = self.of(key, algorithm).await? {
                recorded.insert(algorithm, text);
            }
        }
        Ok(recorded)
    }

    /// Whether the recorded `algorithm` digest of `key` matches `sum`.
    pub async fn verify(&self, key: &Key, sum: &Checksum) -> Result<bool> {
        Ok(self
            .of(key, sum.algorithm())
            .await?
            .is_some_and(|text| sum.matches(&text)))
    }
}
