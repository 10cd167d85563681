//! Maps repository lookups to download responses.

use crate::content::Content;
use crate::repository::Repository;

/// Outcome of a download request, ready to be written by any transport.
#[derive(Debug)]
pub enum DownloadResponse {
    /// 200 with the artifact body.
    Ok { content: Content },
    /// 404; the artifact exists neither locally nor upstream.
    NotFound,
    /// 500 with a message safe to show to the client.
    Error { message: String },
}

impl DownloadResponse {
    /// HTTP status code of the response.
    pub fn status(&self) -> u16 {
        match self {
            DownloadResponse::Ok { .. } => 200,
            DownloadResponse::NotFound => 404,
            DownloadResponse::Error { .. } => 500,
        }
    }

    /// Value for `Content-Length`, when the body size is known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            DownloadResponse::Ok { content } => content.size(),
            DownloadResponse::NotFound => None,
            DownloadResponse::Error { message } => Some(message.len() as u64),
        }
    }
}

/// Look up `uri` in `repository`.
///
/// Failures other than "not found" are logged in full; the response only
/// carries [`RegistryError::public_message`](crate::RegistryError::public_message).
pub async fn download(repository: &Repository, uri: &str) -> DownloadResponse {
    match repository.artifact(uri).await {
        Ok(content) => DownloadResponse::Ok { content },
        Err(err) if err.is_not_found() => {
            tracing::debug!(%uri, "artifact not found");
            DownloadResponse::NotFound
        }
        Err(err) => {
            tracing::error!(%uri, error = %err, "failed to download artifact");
            DownloadResponse::Error {
                message: err.public_message(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::StorageError;
    use crate::key::Key;
    use crate::storage::{InMemoryStorage, Storage};

    #[tokio::test]
    async fn found_artifact_is_200_with_length() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .save(&Key::parse("org/a/1.0/a-1.0.jar").unwrap(), Content::from_bytes(&b"12345"[..]))
            .await
            .unwrap();
        let repository = Repository::local(storage);

        let response = download(&repository, "/org/a/1.0/a-1.0.jar").await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.content_length(), Some(5));
    }

    #[tokio::test]
    async fn missing_artifact_is_404() {
        let repository = Repository::local(Arc::new(InMemoryStorage::new()));
        let response = download(&repository, "/org/a/1.0/a-1.0.jar").await;
        assert_eq!(response.status(), 404);
        assert!(matches!(response, DownloadResponse::NotFound));
    }

    /// A storage whose disk is gone.
    #[derive(Debug)]
    struct BrokenStorage;

    #[async_trait::async_trait]
    impl Storage for BrokenStorage {
        async fn save(&self, key: &Key, _content: Content) -> crate::Result<()> {
            Err(broken(key))
        }
        async fn exists(&self, key: &Key) -> crate::Result<bool> {
            Err(broken(key))
        }
        async fn read(&self, key: &Key) -> crate::Result<Content> {
            Err(broken(key))
        }
        async fn list(&self, prefix: &Key) -> crate::Result<Vec<Key>> {
            Err(broken(prefix))
        }
        async fn delete(&self, key: &Key) -> crate::Result<()> {
            Err(broken(key))
        }
    }

    fn broken(key: &Key) -> crate::RegistryError {
        StorageError::io(format!("/srv/depot/{key}"), "input/output error").into()
    }

    #[tokio::test]
    async fn storage_failure_is_500_without_paths() {
        let repository = Repository::local(Arc::new(BrokenStorage));
        let response = download(&repository, "/org/a/1.0/a-1.0.jar").await;
        assert_eq!(response.status(), 500);
        match response {
            DownloadResponse::Error { message } => {
                assert!(!message.contains("/srv/depot"));
                assert_eq!(message, "internal storage error");
            }
            other => panic!("expected an error response, got {other:?}"),
        }
    }
}
