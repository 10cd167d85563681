//! `depot get <path> [--output <file>]`.

use std::path::Path;

use anyhow::{Context, Result};
use depot_registry::Repository;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Download `path` to `output`, or to stdout.
pub async fn run(repository: &Repository, path: &str, output: Option<&Path>) -> Result<()> {
    let content = repository
        .artifact(path)
        .await
        .with_context(|| format!("fetching {path}"))?;

    let mut writer: Box<dyn AsyncWrite + Send + Unpin> = match output {
        Some(output) => Box::new(
            tokio::fs::File::create(output)
                .await
                .with_context(|| format!("creating {}", output.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0u64;
    let mut stream = content.into_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("reading {path}"))?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    if let Some(output) = output {
        eprintln!("Wrote {written} bytes to {}", output.display());
    }
    Ok(())
}
