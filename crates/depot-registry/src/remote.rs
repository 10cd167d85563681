//! HTTP fetcher for an upstream Maven repository.
//!
//! Each fetch is a single `GET` below the configured base URL. Successful
//! bodies are streamed, never buffered. Non-success bodies are drained so
//! the connection can be reused.

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use url::Url;

use crate::content::Content;
use crate::error::{RegistryError, Result};
use crate::key::Key;

/// Response header carrying the declared artifact size.
pub const CONTENT_SIZE_HEADER: &str = "Content-Size";

/// Configuration for a [`RemoteFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the upstream repository, e.g.
    /// `https://repo.maven.apache.org/maven2`.
    pub url: String,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl RemoteConfig {
    /// Create a new configuration with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        RemoteConfig {
            url: url.into(),
            timeout_secs: 30,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Fetches artifacts from an upstream repository over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    base: Url,
}

impl RemoteFetcher {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RegistryError::Fetch {
                path: config.url.clone(),
                status: None,
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Self::with_client(client, &config.url)
    }

    /// Use an existing client, e.g. one shared with other components.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| RegistryError::Fetch {
            path: base_url.to_string(),
            status: None,
            detail: format!("invalid remote URL: {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::Fetch {
                path: base_url.to_string(),
                status: None,
                detail: "remote URL cannot be used as a base".to_string(),
            });
        }
        Ok(RemoteFetcher { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The upstream URL for a requested path.
    ///
    /// The path is appended to the base URL's path after resolving `.` and
    /// `..`, which can never climb above the base.
    pub fn resolve(&self, path: &str) -> Url {
        let mut segments = normalize(self.base.path());
        segments.extend(normalize(strip_query(path)));
        let mut url = self.base.clone();
        url.set_path(&format!("/{}", segments.join("/")));
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Fetch `path` from the upstream repository.
    pub async fn fetch(&self, path: &str) -> Result<Content> {
        let url = self.resolve(path);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url.path(), &e))?;

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "remote response");

        if status == StatusCode::OK {
            let size = response
                .headers()
                .get(CONTENT_SIZE_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let origin = url.path().to_string();
            let body = response
                .bytes_stream()
                .map(move |chunk| chunk.map_err(|e| transport_error(&origin, &e)));
            return Ok(Content::new(size, body.boxed()));
        }

        // Drain so the pooled connection stays usable.
        let _ = response.bytes().await;
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::ArtifactNotFound {
                path: url.path().to_string(),
            });
        }
        Err(RegistryError::Fetch {
            path: url.path().to_string(),
            status: Some(status.as_u16()),
            detail: format!("HTTP {status}"),
        })
    }
}

/// The storage key for a requested URI.
///
/// Only the path counts: scheme, host, port, query and fragment are
/// dropped, so one artifact reached through different hosts maps to one
/// key.
pub fn cache_key(uri: &str) -> Result<Key> {
    let path = match Url::parse(uri) {
        Ok(url) if !url.cannot_be_a_base() => url.path().to_string(),
        _ => strip_query(uri).to_string(),
    };
    Key::parse(&normalize(&path).join("/"))
}

fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(end) => &path[..end],
        None => path,
    }
}

/// Split `path` into segments, resolving `.` and `..` without escaping the
/// root.
fn normalize(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments
}

fn transport_error(path: &str, err: &reqwest::Error) -> RegistryError {
    let detail = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    RegistryError::Fetch {
        path: path.to_string(),
        status: None,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base: &str) -> RemoteFetcher {
        RemoteFetcher::new(&RemoteConfig::new(base)).unwrap()
    }

    #[test]
    fn resolves_below_base_path() {
        let remote = fetcher("https://repo.example.com/maven2");
        assert_eq!(
            remote.resolve("/org/example/a.jar").as_str(),
            "https://repo.example.com/maven2/org/example/a.jar"
        );
        assert_eq!(
            remote.resolve("org/example/a.jar").as_str(),
            "https://repo.example.com/maven2/org/example/a.jar"
        );
    }

    #[test]
    fn resolve_normalizes_dot_segments() {
        let remote = fetcher("https://repo.example.com/maven2/");
        assert_eq!(
            remote.resolve("/org/./x/../example/a.jar").path(),
            "/maven2/org/example/a.jar"
        );
        assert_eq!(remote.resolve("/../../etc/passwd").path(), "/maven2/etc/passwd");
    }

    #[test]
    fn resolve_drops_query() {
        let remote = fetcher("http://localhost:8080");
        assert_eq!(
            remote.resolve("/a/b.jar?x=1#frag").as_str(),
            "http://localhost:8080/a/b.jar"
        );
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(RemoteFetcher::new(&RemoteConfig::new("not a url")).is_err());
        assert!(RemoteFetcher::new(&RemoteConfig::new("mailto:ops@example.com")).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = RemoteConfig::new("https://repo.example.com");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.with_timeout_secs(5).timeout_secs, 5);
    }

    #[test]
    fn cache_key_ignores_host() {
        let a = cache_key("http://mirror-a:8080/org/example/a.jar").unwrap();
        let b = cache_key("https://mirror-b/org/example/a.jar?checksum=1").unwrap();
        let c = cache_key("/org/example/a.jar").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_string(), "org/example/a.jar");
    }

    #[test]
    fn cache_key_normalizes() {
        assert_eq!(
            cache_key("/org/../com/./test/a.jar").unwrap().to_string(),
            "com/test/a.jar"
        );
        assert!(cache_key("/").unwrap().is_root());
    }
}
