//! The repository facade: download, upload and batch validation on top of a
//! storage, optionally proxying a remote repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::{FutureExt, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::cache::{ProxyCache, RemoteFetch};
use crate::checksums::RepositoryChecksums;
use crate::content::Content;
use crate::coordinate::Coordinate;
use crate::error::{RegistryError, Result, StorageError};
use crate::integrity::{self, is_checksum_key, Algorithm, ChecksumMap};
use crate::key::Key;
use crate::metadata::{self, is_metadata_key};
use crate::remote::{self, RemoteFetcher};
use crate::storage::Storage;
use crate::validate::{ValidUpload, ValidationReport};

/// A stored artifact and the digests computed while uploading it.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactDescriptor {
    key: Key,
    checksums: ChecksumMap,
}

impl ArtifactDescriptor {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn checksums(&self) -> &ChecksumMap {
        &self.checksums
    }

    /// Lowercase hex digest for `algorithm`.
    pub fn checksum(&self, algorithm: Algorithm) -> Option<&str> {
        self.checksums.get(&algorithm).map(|sum| sum.as_str())
    }

    pub fn sha1(&self) -> Option<&str> {
        self.checksum(Algorithm::Sha1)
    }
}

#[derive(Debug)]
struct Proxy {
    remote: Arc<RemoteFetcher>,
    cache: Arc<dyn ProxyCache>,
}

/// A Maven repository backed by a [`Storage`].
#[derive(Debug)]
pub struct Repository {
    storage: Arc<dyn Storage>,
    checksums: RepositoryChecksums,
    validator: ValidUpload,
    proxy: Option<Proxy>,
    /// One lock per version index being rewritten, removed once released.
    index_locks: DashMap<Key, Arc<Mutex<()>>>,
}

impl Repository {
    /// A repository serving only what has been uploaded to `storage`.
    pub fn local(storage: Arc<dyn Storage>) -> Self {
        Repository {
            checksums: RepositoryChecksums::new(Arc::clone(&storage)),
            validator: ValidUpload::new(Arc::clone(&storage)),
            storage,
            proxy: None,
            index_locks: DashMap::new(),
        }
    }

    /// A repository that loads missing artifacts from `remote` through
    /// `cache`.
    pub fn proxied(
        storage: Arc<dyn Storage>,
        remote: RemoteFetcher,
        cache: Arc<dyn ProxyCache>,
    ) -> Self {
        let mut repository = Repository::local(storage);
        repository.proxy = Some(Proxy {
            remote: Arc::new(remote),
            cache,
        });
        repository
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn checksums(&self) -> &RepositoryChecksums {
        &self.checksums
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Content of the artifact at `uri`.
    ///
    /// Only the URI's path is used. A proxy consults its cache, which in
    /// turn may fetch from the remote.
    pub async fn artifact(&self, uri: &str) -> Result<Content> {
        let key = remote::cache_key(uri)?;
        if key.is_root() {
            return Err(RegistryError::InvalidKey {
                raw: uri.to_string(),
                detail: "no artifact path".to_string(),
            });
        }
        let loaded = match &self.proxy {
            None => self.storage.read(&key).await,
            Some(proxy) => {
                let fetcher = Arc::clone(&proxy.remote);
                let path = key.to_string();
                let fetch: RemoteFetch =
                    Box::new(move || async move { fetcher.fetch(&path).await }.boxed());
                proxy.cache.load(&key, fetch).await
            }
        };
        loaded.map_err(|e| match e {
            RegistryError::Storage(StorageError::NotFound { key }) => {
                RegistryError::ArtifactNotFound { path: key }
            }
            other => other,
        })
    }

    /// Store `content` at `path`.
    ///
    /// Digests are computed in the same pass that stores the bytes. Primary
    /// artifacts get digest siblings, and files of a versioned coordinate
    /// are added to their artifact's version index.
    pub async fn upload(&self, path: &str, content: Content) -> Result<ArtifactDescriptor> {
        let key = Key::parse(path)?;
        if key.is_root() {
            return Err(RegistryError::Upload {
                path: path.to_string(),
                detail: "no file name".to_string(),
            });
        }

        let origin = key.to_string();
        let content = Content::new(
            content.size(),
            content
                .into_stream()
                .map_err(move |err| upload_failure(&origin, err))
                .boxed(),
        );
        let (observed, pending) = integrity::digest_stream(content, self.checksums.algorithms());
        self.storage.save(&key, observed).await?;
        let checksums = pending.resolve(&key).await?;

        if !is_checksum_key(&key) && !is_metadata_key(&key) {
            self.checksums.persist(&key, &checksums).await?;
        }
        if let Some(coordinate) = Coordinate::from_key(&key) {
            self.merge_index(&coordinate).await?;
        }
        tracing::info!(%key, "uploaded artifact");
        Ok(ArtifactDescriptor { key, checksums })
    }

    /// Validate the upload batch under `prefix`.
    pub async fn validate(&self, prefix: &str) -> Result<ValidationReport> {
        let prefix = Key::parse(prefix)?;
        self.validator.validate(&prefix).await
    }

    /// Delete every key under `prefix` and bring affected version indexes in
    /// line with what remains. Returns the deleted keys.
    pub async fn discard(&self, prefix: &str) -> Result<Vec<Key>> {
        let prefix = Key::parse(prefix)?;
        if prefix.is_root() {
            return Err(RegistryError::InvalidKey {
                raw: String::new(),
                detail: "refusing to discard the repository root".to_string(),
            });
        }

        let keys = self.storage.list(&prefix).await?;
        let artifacts: BTreeSet<Key> = keys
            .iter()
            .filter_map(Coordinate::from_key)
            .map(|coordinate| coordinate.artifact_key())
            .collect();
        for key in &keys {
            self.storage.delete(key).await?;
        }

        for artifact in &artifacts {
            let index_key = artifact.child(metadata::METADATA_FILE);
            let lock = self.index_lock(&index_key);
            let rebuilt = {
                let _guard = lock.lock().await;
                self.rebuild_index(artifact, &index_key).await
            };
            drop(lock);
            self.release_index_lock(&index_key);
            rebuilt?;
        }
        tracing::info!(%prefix, deleted = keys.len(), "discarded upload batch");
        Ok(keys)
    }

    async fn merge_index(&self, coordinate: &Coordinate) -> Result<()> {
        let index_key = coordinate.index_key();
        let lock = self.index_lock(&index_key);
        let merged = {
            let _guard = lock.lock().await;
            self.write_index(coordinate, &index_key).await
        };
        drop(lock);
        self.release_index_lock(&index_key);
        merged
    }

    async fn write_index(&self, coordinate: &Coordinate, index_key: &Key) -> Result<()> {
        metadata::merge(self.storage.as_ref(), coordinate).await?;
        self.checksums.generate(index_key).await?;
        Ok(())
    }

    async fn rebuild_index(&self, artifact: &Key, index_key: &Key) -> Result<()> {
        match metadata::rebuild(self.storage.as_ref(), artifact).await? {
            Some(_) => {
                self.checksums.generate(index_key).await?;
            }
            None => self.delete_siblings(index_key).await?,
        }
        Ok(())
    }

    /// Lock serializing rewrites of the index at `index_key`. Indexes of
    /// other artifacts are not affected.
    fn index_lock(&self, index_key: &Key) -> Arc<Mutex<()>> {
        Arc::clone(self.index_locks.entry(index_key.clone()).or_default().value())
    }

    /// Drop the lock entry once no other upload holds or awaits it.
    fn release_index_lock(&self, index_key: &Key) {
        self.index_locks
            .remove_if(index_key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn delete_siblings(&self, key: &Key) -> Result<()> {
        for algorithm in Algorithm::ALL {
            let sibling = algorithm.sibling(key);
            if self.storage.exists(&sibling).await? {
                self.storage.delete(&sibling).await?;
            }
        }
        Ok(())
    }
}

/// Errors raised by the upload stream itself, as opposed to the store.
fn upload_failure(path: &str, err: RegistryError) -> RegistryError {
    match err {
        RegistryError::Upload { .. } => err,
        other => RegistryError::Upload {
            path: path.to_string(),
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::Checksum;
    use crate::storage::{FileStorage, InMemoryStorage};

    fn key(raw: &str) -> Key {
        Key::parse(raw).unwrap()
    }

    fn local() -> (Arc<InMemoryStorage>, Repository) {
        let storage = Arc::new(InMemoryStorage::new());
        (storage.clone(), Repository::local(storage))
    }

    #[tokio::test]
    async fn stores_empty_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().join("asto")));
        let repository = Repository::local(storage.clone());

        let path = "example/artifact/1.0/artifact-1.0.jar";
        repository.upload(path, Content::empty()).await.unwrap();
        assert!(storage.exists(&key(path)).await.unwrap());
    }

    #[tokio::test]
    async fn upload_checksums_match_content() {
        let (_storage, repository) = local();
        let artifact = repository
            .upload("example/artifact/1.0/artifact-1.0.pom", Content::empty())
            .await
            .unwrap();
        assert_eq!(artifact.sha1(), Some("da39a3ee5e6b4b0d3255bfef95601890afd80709"));
        assert_eq!(artifact.checksums().len(), 4);
        assert_eq!(artifact.key().to_string(), "example/artifact/1.0/artifact-1.0.pom");
    }

    #[tokio::test]
    async fn upload_creates_version_index() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        let repository = Repository::local(storage.clone());

        repository
            .upload("org/example/artifact/1.0/artifact-1.0.jar", Content::empty())
            .await
            .unwrap();

        let index_key = key("org/example/artifact/maven-metadata.xml");
        assert!(storage.exists(&index_key).await.unwrap());
        let index = metadata::load(storage.as_ref(), &index_key).await.unwrap().unwrap();
        assert_eq!(index.versions(), &["1.0"]);
        assert!(storage
            .exists(&key("org/example/artifact/maven-metadata.xml.sha1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn uploaded_bytes_read_back_with_recorded_digests() {
        let (storage, repository) = local();
        let payload = vec![0xAB_u8; 150_000];
        let path = "org/example/artifact/2.0/artifact-2.0.jar";
        let artifact = repository
            .upload(path, Content::from_bytes(payload.clone()))
            .await
            .unwrap();

        let stored = repository.artifact(path).await.unwrap().into_bytes().await.unwrap();
        assert_eq!(stored.to_vec(), payload);
        for algorithm in Algorithm::ALL {
            let expected = Checksum::compute(algorithm, &payload);
            assert_eq!(artifact.checksum(algorithm), Some(expected.as_str()));
            let recorded = storage
                .read(&algorithm.sibling(&key(path)))
                .await
                .unwrap()
                .into_bytes()
                .await
                .unwrap();
            assert_eq!(&recorded[..], expected.as_str().as_bytes());
        }
        assert!(repository.validate("org/example/artifact/2.0").await.unwrap().passed());
    }

    #[tokio::test]
    async fn sibling_uploads_get_no_siblings_of_their_own() {
        let (storage, repository) = local();
        repository
            .upload("a/b/1.0/b-1.0.jar.sha1", Content::from_bytes(&b"abc"[..]))
            .await
            .unwrap();
        assert!(!storage.exists(&key("a/b/1.0/b-1.0.jar.sha1.md5")).await.unwrap());
        assert!(!storage.exists(&key("a/b/maven-metadata.xml")).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_uploads_all_land_in_index() {
        let (storage, repository) = local();
        let repository = Arc::new(repository);
        let uploads = (0..8).map(|minor| {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move {
                let path = format!("org/example/artifact/1.{minor}/artifact-1.{minor}.jar");
                repository.upload(&path, Content::empty()).await
            })
        });
        for result in futures::future::join_all(uploads).await {
            result.unwrap().unwrap();
        }
        let index = metadata::load(storage.as_ref(), &key("org/example/artifact/maven-metadata.xml"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.versions().len(), 8);
        assert_eq!(index.latest(), Some("1.7"));
    }

    #[tokio::test]
    async fn local_missing_artifact_is_not_found() {
        let (_storage, repository) = local();
        let err = repository.artifact("/org/example/missing.jar").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn artifact_uses_uri_path_only() {
        let (_storage, repository) = local();
        repository
            .upload("org/example/a/1.0/a-1.0.pom", Content::from_bytes(&b"<project/>"[..]))
            .await
            .unwrap();
        let content = repository
            .artifact("http://localhost:8080/org/example/a/1.0/a-1.0.pom?x=1")
            .await
            .unwrap();
        assert_eq!(content.size(), Some(10));
    }

    #[tokio::test]
    async fn discard_rolls_back_failed_batch() {
        let (storage, repository) = local();
        repository
            .upload("org/example/artifact/1.0/artifact-1.0.jar", Content::from_bytes(&b"one"[..]))
            .await
            .unwrap();
        repository
            .upload("org/example/artifact/1.1/artifact-1.1.jar", Content::from_bytes(&b"two"[..]))
            .await
            .unwrap();
        storage
            .save(
                &key("org/example/artifact/1.1/artifact-1.1.jar.sha256"),
                Content::from_bytes(&b"123"[..]),
            )
            .await
            .unwrap();
        assert!(!repository.validate("org/example/artifact/1.1").await.unwrap().passed());

        let deleted = repository.discard("org/example/artifact/1.1").await.unwrap();
        assert_eq!(deleted.len(), 5);
        let index = metadata::load(storage.as_ref(), &key("org/example/artifact/maven-metadata.xml"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.versions(), &["1.0"]);
        assert!(repository.validate("org/example/artifact").await.unwrap().passed());
    }

    #[tokio::test]
    async fn failing_upload_stream_is_an_upload_error() {
        let (storage, repository) = local();
        let chunks: Vec<Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"partial")),
            Err(StorageError::io("/home/user/app.jar", "read error").into()),
        ];
        let content = Content::new(None, futures::stream::iter(chunks).boxed());

        let err = repository
            .upload("org/example/a/1.0/a-1.0.jar", content)
            .await
            .unwrap_err();
        match err {
            RegistryError::Upload { path, detail } => {
                assert_eq!(path, "org/example/a/1.0/a-1.0.jar");
                assert!(detail.contains("read error"));
            }
            other => panic!("expected an upload error, got {other:?}"),
        }
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn artifact_at_root_is_rejected() {
        let (_storage, repository) = local();
        for uri in ["/", "", "http://localhost:8080/?q=1"] {
            let err = repository.artifact(uri).await.unwrap_err();
            assert!(matches!(err, RegistryError::InvalidKey { .. }), "{uri}: {err:?}");
        }
    }

    /// Storage whose index writes under `org/a` stall until released.
    #[derive(Debug, Default)]
    struct StallingStorage {
        inner: InMemoryStorage,
        stalled: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl Storage for StallingStorage {
        async fn save(&self, key: &Key, content: Content) -> Result<()> {
            if key.to_string() == "org/a/lib/maven-metadata.xml" {
                self.stalled.notify_one();
                self.release.notified().await;
            }
            self.inner.save(key, content).await
        }
        async fn exists(&self, key: &Key) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn read(&self, key: &Key) -> Result<Content> {
            self.inner.read(key).await
        }
        async fn list(&self, prefix: &Key) -> Result<Vec<Key>> {
            self.inner.list(prefix).await
        }
        async fn delete(&self, key: &Key) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn index_rewrite_does_not_block_other_artifacts() {
        let storage = Arc::new(StallingStorage::default());
        let repository = Arc::new(Repository::local(storage.clone()));

        let stalled = {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move {
                repository
                    .upload("org/a/lib/1.0/lib-1.0.jar", Content::empty())
                    .await
            })
        };
        storage.stalled.notified().await;

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            repository.upload("com/b/other/2.0/other-2.0.jar", Content::empty()),
        )
        .await
        .expect("unrelated upload waited on another artifact's index");
        other.unwrap();

        storage.release.notify_one();
        stalled.await.unwrap().unwrap();
        let index = metadata::load(storage.as_ref(), &key("org/a/lib/maven-metadata.xml"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.versions(), &["1.0"]);
        assert!(repository.index_locks.is_empty());
    }

    #[tokio::test]
    async fn discarding_last_version_removes_index() {
        let (storage, repository) = local();
        repository
            .upload("org/example/artifact/1.0/artifact-1.0.jar", Content::empty())
            .await
            .unwrap();
        repository.discard("org/example/artifact/1.0").await.unwrap();
        assert!(storage.is_empty().await);
        assert!(repository.discard("").await.is_err());
    }
}
