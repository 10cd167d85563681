//! Upload batch validation.
//!
//! A batch is every key below a prefix, typically one deploy of an artifact.
//! Each primary file must carry at least one digest sibling, and every
//! recorded sibling must match the stored bytes. A file with no recorded
//! digests fails: unverified uploads are never accepted silently.

use std::sync::Arc;

use serde::Serialize;

use crate::checksums::RepositoryChecksums;
use crate::error::{RegistryError, Result};
use crate::integrity::{is_checksum_key, Algorithm};
use crate::key::Key;
use crate::metadata::is_metadata_key;
use crate::storage::Storage;

/// Outcome for one primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    /// Every recorded digest matched.
    Valid,
    /// At least one recorded digest differs from the stored bytes.
    Mismatch,
    /// No digest sibling was recorded.
    MissingChecksums,
}

/// Validation detail for one primary file.
#[derive(Debug, Clone, Serialize)]
pub struct FileValidation {
    pub key: Key,
    pub status: FileStatus,
    /// Algorithms that had a recorded sibling.
    pub checked: Vec<Algorithm>,
    /// Recorded algorithms whose value did not match.
    pub mismatched: Vec<Algorithm>,
}

/// Result of validating one upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub prefix: Key,
    pub files: Vec<FileValidation>,
}

impl ValidationReport {
    /// Whether every file in the batch passed.
    pub fn passed(&self) -> bool {
        self.files.iter().all(|f| f.status == FileStatus::Valid)
    }

    /// Files that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &FileValidation> {
        self.files.iter().filter(|f| f.status != FileStatus::Valid)
    }

    /// Turn a failed report into [`RegistryError::ValidationFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(RegistryError::ValidationFailed {
            prefix: self.prefix.to_string(),
            failed: self.failures().map(|f| f.key.to_string()).collect(),
        })
    }
}

/// Validates upload batches against their recorded digests.
#[derive(Debug, Clone)]
pub struct ValidUpload {
    storage: Arc<dyn Storage>,
    checksums: RepositoryChecksums,
}

impl ValidUpload {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let checksums = RepositoryChecksums::new(Arc::clone(&storage));
        ValidUpload { storage, checksums }
    }

    /// Validate every primary file below `prefix`. A prefix naming a single
    /// stored file is validated as a batch of that one file.
    ///
    /// Digest mismatches are reported, not returned as errors; only storage
    /// failures are.
    pub async fn validate(&self, prefix: &Key) -> Result<ValidationReport> {
        let mut keys = self.storage.list(prefix).await?;
        if keys.is_empty() && !prefix.is_root() && self.storage.exists(prefix).await? {
            keys.push(prefix.clone());
        }
        let mut files = Vec::new();
        for key in keys {
            if is_checksum_key(&key) || is_metadata_key(&key) {
                continue;
            }
            files.push(self.validate_file(key).await?);
        }
        let report = ValidationReport {
            prefix: prefix.clone(),
            files,
        };
        if report.passed() {
            tracing::debug!(%prefix, files = report.files.len(), "upload batch is valid");
        } else {
            tracing::warn!(
                %prefix,
                failed = report.failures().count(),
                "upload batch failed checksum validation"
            );
        }
        Ok(report)
    }

    /// Convenience wrapper returning only the pass/fail verdict.
    pub async fn is_valid(&self, prefix: &Key) -> Result<bool> {
        Ok(self.validate(prefix).await?.passed())
    }

    async fn validate_file(&self, key: Key) -> Result<FileValidation> {
        let recorded = self.checksums.recorded(&key).await?;
        if recorded.is_empty() {
            return Ok(FileValidation {
                key,
                status: FileStatus::MissingChecksums,
                checked: Vec::new(),
                mismatched: Vec::new(),
            });
        }

        let checked: Vec<Algorithm> = recorded.keys().copied().collect();
        let actual = self.checksums.compute(&key, &checked).await?;
        let mismatched: Vec<Algorithm> = recorded
            .iter()
            .filter(|(algorithm, text)| {
                !actual
                    .get(algorithm)
                    .is_some_and(|sum| sum.matches(text.as_str()))
            })
            .map(|(algorithm, _)| *algorithm)
            .collect();
        let status = if mismatched.is_empty() {
            FileStatus::Valid
        } else {
            FileStatus::Mismatch
        };
        Ok(FileValidation {
            key,
            status,
            checked,
            mismatched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::storage::InMemoryStorage;

    const METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.test</groupId>
  <artifactId>my-package</artifactId>
  <versioning>
    <versions>
      <version>1.0</version>
    </versions>
  </versioning>
</metadata>
"#;

    fn key(raw: &str) -> Key {
        Key::parse(raw).unwrap()
    }

    async fn save(storage: &InMemoryStorage, raw: &str, bytes: &'static [u8]) {
        storage.save(&key(raw), Content::from_bytes(bytes)).await.unwrap();
    }

    fn setup() -> (Arc<InMemoryStorage>, RepositoryChecksums, ValidUpload) {
        let storage = Arc::new(InMemoryStorage::new());
        let checksums = RepositoryChecksums::new(storage.clone());
        let validator = ValidUpload::new(storage.clone());
        (storage, checksums, validator)
    }

    #[tokio::test]
    async fn passes_when_all_checksums_are_valid() {
        let (storage, checksums, validator) = setup();
        save(&storage, "com/test/1.0/my-package.jar", b"jar artifact").await;
        save(&storage, "com/test/1.0/my-package.war", b"war artifact").await;
        save(&storage, "com/test/maven-metadata.xml", METADATA.as_bytes()).await;
        checksums.generate(&key("com/test/1.0/my-package.jar")).await.unwrap();
        checksums.generate(&key("com/test/1.0/my-package.war")).await.unwrap();

        let report = validator.validate(&key("com/test")).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.files.len(), 2);
        assert!(report.files.iter().all(|f| f.checked.len() == 4));
    }

    #[tokio::test]
    async fn fails_when_not_all_checksums_are_valid() {
        let (storage, checksums, validator) = setup();
        save(&storage, "org/example/1.0/my-package.jar", b"artifact").await;
        save(&storage, "org/example/1.0/my-package.war", b"war artifact").await;
        save(&storage, "org/example/1.0/my-package.war.sha256", b"123").await;
        save(&storage, "org/example/maven-metadata.xml", METADATA.as_bytes()).await;
        checksums.generate(&key("org/example/1.0/my-package.jar")).await.unwrap();

        let report = validator.validate(&key("org/example")).await.unwrap();
        assert!(!report.passed());
        let failed: Vec<&FileValidation> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, key("org/example/1.0/my-package.war"));
        assert_eq!(failed[0].status, FileStatus::Mismatch);
        assert_eq!(failed[0].mismatched, vec![Algorithm::Sha256]);
    }

    #[tokio::test]
    async fn artifact_without_checksums_is_invalid() {
        let (storage, _checksums, validator) = setup();
        save(&storage, "com/test/1.0/my-package.jar", b"jar artifact").await;

        let report = validator.validate(&key("com/test")).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.files[0].status, FileStatus::MissingChecksums);
        assert!(!validator.is_valid(&key("com/test")).await.unwrap());
    }

    #[tokio::test]
    async fn tampering_after_upload_is_detected() {
        let (storage, checksums, validator) = setup();
        let jar = "com/test/1.0/my-package.jar";
        save(&storage, jar, b"jar artifact").await;
        checksums.generate(&key(jar)).await.unwrap();
        assert!(validator.is_valid(&key("com/test")).await.unwrap());

        save(&storage, jar, b"jar artifacT").await;
        let report = validator.validate(&key("com/test")).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.files[0].mismatched.len(), 4);
    }

    #[tokio::test]
    async fn partial_algorithm_set_is_enough() {
        let (storage, _checksums, validator) = setup();
        save(&storage, "com/test/1.0/a.jar", b"").await;
        save(
            &storage,
            "com/test/1.0/a.jar.sha1",
            b"da39a3ee5e6b4b0d3255bfef95601890afd80709",
        )
        .await;

        let report = validator.validate(&key("com/test")).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.files[0].checked, vec![Algorithm::Sha1]);
    }

    #[tokio::test]
    async fn single_file_prefix_is_validated() {
        let (storage, checksums, validator) = setup();
        let jar = "org/x/1.0/x-1.0.jar";
        save(&storage, jar, b"lone jar").await;

        let report = validator.validate(&key(jar)).await.unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].key, key(jar));
        assert_eq!(report.files[0].status, FileStatus::MissingChecksums);
        assert!(!report.passed());

        checksums.generate(&key(jar)).await.unwrap();
        assert!(validator.is_valid(&key(jar)).await.unwrap());

        let sibling = format!("{jar}.sha1");
        let report = validator.validate(&key(&sibling)).await.unwrap();
        assert!(report.files.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_passes() {
        let (_storage, _checksums, validator) = setup();
        let report = validator.validate(&key("nothing/here")).await.unwrap();
        assert!(report.passed());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn failed_report_converts_to_error() {
        let (storage, _checksums, validator) = setup();
        save(&storage, "com/test/1.0/a.jar", b"x").await;
        let report = validator.validate(&key("com/test")).await.unwrap();
        match report.into_result() {
            Err(RegistryError::ValidationFailed { prefix, failed }) => {
                assert_eq!(prefix, "com/test");
                assert_eq!(failed, vec!["com/test/1.0/a.jar".to_string()]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
