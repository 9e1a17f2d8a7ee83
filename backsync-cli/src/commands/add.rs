//! `backsync add` — record updates.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use backsync_core::ItemKey;

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Keys of the updated items.
    #[arg(required = true, value_name = "ITEM")]
    pub items: Vec<String>,
}

impl AddArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        super::block_on(async move {
            let manager = super::connect(&config).await?;
            for item in self.items.into_iter().map(ItemKey::from) {
                let added = manager
                    .add(&item)
                    .await
                    .with_context(|| format!("failed to add {item}"))?;
                let label = if added {
                    "added".green()
                } else {
                    "updated".yellow()
                };
                println!("{label} {item}");
            }
            Ok(())
        })
    }
}
