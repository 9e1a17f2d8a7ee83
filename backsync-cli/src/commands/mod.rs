//! Subcommands and the plumbing they share.

pub mod add;
pub mod config;
pub mod delete;
pub mod status;
pub mod top;
pub mod worker;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use backsync_core::{config as core_config, BacksyncConfig};
use backsync_sync::{Manager, RedisStore};

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file [default: ~/.backsync/config.yaml].
    #[arg(long, global = true, env = "BACKSYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Redis endpoint, overriding `redis_url` from the config file.
    #[arg(long, global = true, env = "BACKSYNC_REDIS_URL", value_name = "URL")]
    pub redis_url: Option<String>,
}

impl GlobalArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => core_config::config_path().context("could not locate the default config"),
        }
    }

    /// Config file (or defaults when absent), validated, with flag and env
    /// overrides applied.
    pub fn load_config(&self) -> Result<BacksyncConfig> {
        let path = self.config_path()?;
        let mut config = core_config::load_at(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
        Ok(config)
    }
}

/// Connect to the configured Redis, bounded by the call deadline.
pub async fn connect(config: &BacksyncConfig) -> Result<Manager> {
    let store = tokio::time::timeout(config.call_timeout(), RedisStore::connect(&config.redis_url))
        .await
        .with_context(|| format!("timed out connecting to {}", config.redis_url))?
        .with_context(|| format!("failed to connect to {}", config.redis_url))?;
    Ok(Manager::new(Arc::new(store), config))
}

/// Drive `fut` on a fresh single-threaded runtime.
pub fn block_on<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(fut)
}
