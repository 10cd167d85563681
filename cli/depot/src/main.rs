//! depot CLI: upload, download and validate artifacts in a Maven repository.

mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use depot_registry::{
    FileStorage, NoopCache, ProxyCache, RemoteConfig, RemoteFetcher, Repository, Storage,
    StorageCache,
};
use tracing_subscriber::EnvFilter;

use config::{DepotConfig, ProxyConfig};

#[derive(Parser)]
#[command(name = "depot", version, about = "Caching Maven artifact repository")]
struct Cli {
    /// Configuration file (default: depot.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Repository root directory (overrides [storage] root)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Upstream repository URL (overrides [proxy] url)
    #[arg(long, global = true)]
    remote: Option<String>,
    /// Do not write upstream artifacts to the local store
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file into the repository
    Upload {
        /// Repository path, e.g. org/example/app/1.0/app-1.0.jar
        path: String,
        /// File to upload
        file: PathBuf,
    },
    /// Download an artifact, from the upstream repository if needed
    Get {
        /// Repository path of the artifact
        path: String,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check the recorded checksums of an upload batch
    Validate {
        /// Path prefix of the batch, e.g. org/example/app/1.0
        prefix: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Delete the batch if validation fails
        #[arg(long)]
        discard: bool,
    },
    /// Recompute and store the checksum files of an artifact
    Checksum {
        /// Repository path of the artifact
        path: String,
    },
}

/// Effective settings after merging `depot.toml` with command-line flags.
#[derive(Debug)]
struct Settings {
    store: PathBuf,
    proxy: Option<ProxyConfig>,
    log_filter: String,
}

impl Settings {
    fn resolve(cli: &Cli, cwd: &Path) -> Result<Self> {
        let (config, base_dir) = match &cli.config {
            Some(path) => {
                let config = DepotConfig::load(path)?;
                let dir = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
                (config, dir)
            }
            None => DepotConfig::find_and_load(cwd)?
                .unwrap_or_else(|| (DepotConfig::default(), cwd.to_path_buf())),
        };

        let store = match &cli.store {
            Some(store) => store.clone(),
            None => config.storage_root(&base_dir),
        };
        let mut proxy = match &cli.remote {
            Some(url) => {
                let mut proxy = config.proxy.clone().unwrap_or_else(|| ProxyConfig::new(url));
                proxy.url = url.clone();
                Some(proxy)
            }
            None => config.proxy.clone(),
        };
        if cli.no_cache {
            if let Some(proxy) = proxy.as_mut() {
                proxy.cache = false;
            }
        }

        Ok(Settings {
            store,
            proxy,
            log_filter: config.log.filter,
        })
    }

    fn open_repository(&self) -> Result<Repository> {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&self.store));
        let Some(proxy) = &self.proxy else {
            return Ok(Repository::local(storage));
        };
        let remote = RemoteFetcher::new(
            &RemoteConfig::new(&proxy.url).with_timeout_secs(proxy.timeout_secs),
        )
        .with_context(|| format!("configuring upstream {}", proxy.url))?;
        let cache: Arc<dyn ProxyCache> = if proxy.cache {
            Arc::new(StorageCache::new(Arc::clone(&storage)))
        } else {
            Arc::new(NoopCache)
        };
        Ok(Repository::proxied(storage, remote, cache))
    }
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let settings = Settings::resolve(&cli, &cwd)?;
    init_logging(&settings.log_filter);
    tracing::debug!(store = %settings.store.display(), proxy = settings.proxy.is_some(), "resolved settings");

    let repository = settings.open_repository()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Commands::Upload { path, file } => commands::upload::run(&repository, &path, &file).await,
            Commands::Get { path, output } => {
                commands::get::run(&repository, &path, output.as_deref()).await
            }
            Commands::Validate {
                prefix,
                json,
                discard,
            } => commands::validate::run(&repository, &prefix, json, discard).await,
            Commands::Checksum { path } => commands::checksum::run(&repository, &path).await,
        }
    })
}
