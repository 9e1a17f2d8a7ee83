//! `backsync worker` — run the sync loop in the foreground.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use backsync_worker::{start_blocking, CommandHandler, LogHandler, SyncHandler};

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Items claimed per pass [default: worker.batch_size].
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Pause after an empty pass or a store error [default: worker.idle_interval_ms].
    #[arg(long, value_name = "MS")]
    pub idle_ms: Option<u64>,

    /// Shell command run once per batch with the keys on stdin. A zero exit
    /// commits the batch. Without it batches are only logged.
    #[arg(long, value_name = "CMD")]
    pub exec: Option<String>,
}

impl WorkerArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut config = global.load_config()?;
        if let Some(batch_size) = self.batch_size {
            config.worker.batch_size = batch_size;
        }
        if let Some(idle_ms) = self.idle_ms {
            config.worker.idle_interval_ms = idle_ms;
        }
        config.validate().context("invalid worker settings")?;

        let handler: Arc<dyn SyncHandler> = match self.exec {
            Some(command) => Arc::new(CommandHandler::new(command)),
            None => Arc::new(LogHandler),
        };

        let summary = start_blocking(config, handler).context("worker exited with error")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
        );
        Ok(())
    }
}
