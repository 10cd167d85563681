use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::Storage;
use crate::content::Content;
use crate::error::{Result, StorageError};
use crate::key::Key;

/// Suffix of in-progress writes; such files are invisible to `list`.
const PART_SUFFIX: &str = ".part";

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A `Storage` backed by the filesystem.
///
/// Layout mirrors the key: `org/example/a.jar` lives at
/// `<root>/org/example/a.jar`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at the given directory. The directory is
    /// created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &Key) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key.segments());
        path
    }

    fn part_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
        target.with_file_name(format!(".{name}.{}-{id}{PART_SUFFIX}", std::process::id()))
    }

    async fn write_part(part: &Path, key: &Key, content: Content) -> Result<()> {
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| StorageError::io(key, format!("creating {}: {e}", part.display())))?;
        let mut stream = content.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        file.flush().await.map_err(|e| StorageError::io(key, e))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, key: &Key, content: Content) -> Result<()> {
        if key.is_root() {
            return Err(StorageError::io(key, "cannot save to the root key").into());
        }
        let target = self.path(key);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(key, format!("creating {}: {e}", dir.display())))?;
        }
        let part = Self::part_path(&target);
        if let Err(err) = Self::write_part(&part, key, content).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(err);
        }
        tokio::fs::rename(&part, &target).await.map_err(|e| {
            StorageError::io(key, format!("renaming into {}: {e}", target.display()))
        })?;
        Ok(())
    }

    async fn exists(&self, key: &Key) -> Result<bool> {
        match tokio::fs::metadata(self.path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e).into()),
        }
    }

    async fn read(&self, key: &Key) -> Result<Content> {
        let path = self.path(key);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                }
                .into())
            }
            Err(e) => return Err(StorageError::io(key, e).into()),
        };
        let meta = file.metadata().await.map_err(|e| StorageError::io(key, e))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into());
        }
        Ok(Content::from_reader(file, Some(meta.len()), key.to_string()))
    }

    async fn list(&self, prefix: &Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.path(prefix), prefix.clone())];
        while let Some((dir, dir_key)) = pending.pop() {
            match tokio::fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&dir_key, e).into()),
            }
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::io(&dir_key, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&dir_key, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(&dir_key, e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), dir_key.child(&name)));
                } else if !(name.starts_with('.') && name.ends_with(PART_SUFFIX)) {
                    keys.push(dir_key.child(&name));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
            Err(e) => Err(StorageError::io(key, e).into()),
        }
    }
}
