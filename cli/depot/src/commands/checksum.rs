//! `depot checksum <path>`.

use anyhow::{Context, Result};
use depot_registry::{Key, Repository};

/// Regenerate the checksum files of a stored artifact.
pub async fn run(repository: &Repository, path: &str) -> Result<()> {
    let key = Key::parse(path)?;
    let sums = repository
        .checksums()
        .generate(&key)
        .await
        .with_context(|| format!("computing checksums of {key}"))?;
    for (algorithm, sum) in &sums {
        println!("{algorithm:<6} {sum}");
    }
    Ok(())
}
