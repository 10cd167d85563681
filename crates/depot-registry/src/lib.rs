//! Maven repository adapter with a caching proxy.
//!
//! Serves artifacts from a pluggable [`Storage`], optionally falling back to
//! an upstream repository over HTTP. Remote content is written through to
//! storage, and concurrent requests for the same missing artifact share one
//! upstream fetch.
//!
//! # Architecture
//!
//! - **Storage** ([`storage`]): keyed byte streams, in memory or on disk
//! - **Checksums** ([`integrity`], [`checksums`]): streaming digests and
//!   their sibling files
//! - **Validation** ([`validate`]): recorded digests checked against an
//!   upload batch
//! - **Proxying** ([`cache`], [`remote`]): write-through cache in front of
//!   an HTTP fetcher
//! - **Repository** ([`repository`], [`metadata`]): upload and download with
//!   per-artifact version indexes

pub mod cache;
pub mod checksums;
pub mod content;
pub mod coordinate;
pub mod download;
pub mod error;
pub mod integrity;
pub mod key;
pub mod metadata;
pub mod remote;
pub mod repository;
pub mod storage;
pub mod validate;
pub mod version;

// Re-exports for convenience.
pub use cache::{NoopCache, ProxyCache, RemoteFetch, StorageCache};
pub use checksums::RepositoryChecksums;
pub use content::Content;
pub use coordinate::Coordinate;
pub use download::{download, DownloadResponse};
pub use error::{RegistryError, Result, StorageError};
pub use integrity::{Algorithm, Checksum, ChecksumMap};
pub use key::Key;
pub use metadata::VersionIndex;
pub use remote::{RemoteConfig, RemoteFetcher};
pub use repository::{ArtifactDescriptor, Repository};
pub use storage::{FileStorage, InMemoryStorage, Storage};
pub use validate::{FileStatus, FileValidation, ValidUpload, ValidationReport};
pub use version::MavenVersion;
