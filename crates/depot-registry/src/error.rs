//! Registry error types.
//!
//! Every variant carries owned string context so an error can be cloned and
//! handed to each caller waiting on the same remote fetch.

/// Errors raised by a [`Storage`](crate::storage::Storage) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No value is stored under the key.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// The backend failed to read or write the key.
    #[error("storage I/O error at {key}: {detail}")]
    Io { key: String, detail: String },
}

impl StorageError {
    pub(crate) fn io(key: impl ToString, err: impl std::fmt::Display) -> Self {
        StorageError::Io {
            key: key.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Errors that can occur during repository operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Neither the local store nor the remote repository has the artifact.
    #[error("artifact not found: {path}")]
    ArtifactNotFound { path: String },

    /// The upstream repository answered with an unexpected status, or the
    /// transport failed before an answer arrived (`status` is `None`).
    #[error("failed to fetch {path} from remote repository: {detail}")]
    Fetch {
        path: String,
        status: Option<u16>,
        detail: String,
    },

    /// An upload could not be completed.
    #[error("upload of {path} failed: {detail}")]
    Upload { path: String, detail: String },

    /// Recorded checksums under an upload batch did not match the content.
    #[error("upload validation failed under {prefix}: {}", .failed.join(", "))]
    ValidationFailed { prefix: String, failed: Vec<String> },

    /// A version index could not be parsed or written.
    #[error("invalid metadata at {path}: {detail}")]
    Metadata { path: String, detail: String },

    /// A path could not be turned into a storage key.
    #[error("invalid key '{raw}': {detail}")]
    InvalidKey { raw: String, detail: String },

    /// Storage backend failure, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    /// Whether this error means "the artifact does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::ArtifactNotFound { .. })
    }

    /// A message that is safe to show to a remote client.
    ///
    /// Storage paths and transport internals are replaced with a generic
    /// description; the full error should be logged instead.
    pub fn public_message(&self) -> String {
        match self {
            RegistryError::ArtifactNotFound { .. } => "artifact not found".to_string(),
            RegistryError::Fetch {
                status: Some(status),
                ..
            } => format!("failed to fetch remote repo: {status}"),
            RegistryError::Fetch { status: None, .. } => {
                "failed to reach remote repository".to_string()
            }
            RegistryError::InvalidKey { raw, detail } => format!("invalid path '{raw}': {detail}"),
            RegistryError::Upload { .. } => "upload failed".to_string(),
            RegistryError::ValidationFailed { .. } => "upload validation failed".to_string(),
            RegistryError::Metadata { .. } => "repository metadata is corrupt".to_string(),
            RegistryError::Storage(_) => "internal storage error".to_string(),
        }
    }
}

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
