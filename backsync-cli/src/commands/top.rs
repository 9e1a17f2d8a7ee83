//! `backsync top` — claim a batch by hand.
//!
//! Prints one key per line so the output can be piped into a sync step and
//! then into `backsync delete`.

use anyhow::{Context, Result};
use clap::Args;

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct TopArgs {
    /// Maximum number of items to claim [default: worker.batch_size].
    #[arg(value_name = "N")]
    pub count: Option<usize>,

    /// Emit a JSON array instead of one key per line.
    #[arg(long)]
    pub json: bool,
}

impl TopArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let count = self.count.unwrap_or(config.worker.batch_size);
        let claimed = super::block_on(async move {
            let manager = super::connect(&config).await?;
            manager.top(count).await.context("failed to claim items")
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&claimed).context("failed to serialize claim")?
            );
            return Ok(());
        }
        for item in &claimed {
            println!("{item}");
        }
        Ok(())
    }
}
