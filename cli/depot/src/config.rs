//! `depot.toml` configuration.
//!
//! ```toml
//! [storage]
//! root = "repo"
//!
//! [proxy]
//! url = "https://repo.maven.apache.org/maven2"
//! cache = true
//! timeout_secs = 30
//!
//! [log]
//! filter = "info"
//! ```
//!
//! Every section is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File name searched for by [`DepotConfig::find_and_load`].
pub const CONFIG_FILE: &str = "depot.toml";

/// The top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Where artifacts are stored.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upstream repository; absent for a purely local repository.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Storage section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Repository root, relative to the directory holding `depot.toml`.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("repo")
}

/// Proxy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Base URL of the upstream repository.
    pub url: String,
    /// Write remote artifacts through to local storage.
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ProxyConfig {
            url: url.into(),
            cache: default_cache(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_cache() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

/// Log section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

impl DepotConfig {
    /// Search upward from `start_dir` for a `depot.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse a configuration from a TOML string.
    pub fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// The storage root, resolving a relative path against `base_dir`.
    pub fn storage_root(&self, base_dir: &Path) -> PathBuf {
        if self.storage.root.is_absolute() {
            self.storage.root.clone()
        } else {
            base_dir.join(&self.storage.root)
        }
    }
}
