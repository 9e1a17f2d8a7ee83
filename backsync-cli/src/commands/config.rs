//! `backsync config` — effective configuration.

use anyhow::{Context, Result};
use clap::Subcommand;

use backsync_core::config as core_config;

use super::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (file, defaults and overrides).
    Show,
    /// Write a default config file unless one already exists.
    Init,
}

pub fn run(command: ConfigCommand, global: &GlobalArgs) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = global.load_config()?;
            print!(
                "{}",
                core_config::to_yaml(&config).context("failed to render config")?
            );
        }
        ConfigCommand::Init => {
            let path = global.config_path()?;
            if path.exists() {
                core_config::load_at(&path)
                    .with_context(|| format!("existing config at {} is invalid", path.display()))?;
                println!("config already exists at {}", path.display());
            } else {
                core_config::init_at(&path)
                    .with_context(|| format!("failed to write config to {}", path.display()))?;
                println!("wrote default config to {}", path.display());
            }
        }
    }
    Ok(())
}
