//! `depot upload <path> <file>`.

use std::path::Path;

use anyhow::{Context, Result};
use depot_registry::{Content, Repository};

/// Stream `file` into the repository at `path` and print its digests.
pub async fn run(repository: &Repository, path: &str, file: &Path) -> Result<()> {
    let handle = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    let size = handle.metadata().await.ok().map(|meta| meta.len());
    let content = Content::from_reader(handle, size, file.display().to_string());

    let artifact = repository
        .upload(path, content)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    println!("Uploaded {}", artifact.key());
    for (algorithm, sum) in artifact.checksums() {
        println!("  {algorithm:<6} {sum}");
    }
    Ok(())
}
