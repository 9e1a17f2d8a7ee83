//! backsync — lease-based change tracking for background sync workers.
//!
//! # Usage
//!
//! ```text
//! backsync add <ITEM>...
//! backsync top [N] [--json]
//! backsync delete [ITEM]... [--json]        (keys from stdin when none given)
//! backsync status [ITEM]... [--json]
//! backsync worker [--batch-size N] [--idle-ms MS] [--exec CMD]
//! backsync config show|init
//! ```
//!
//! Every command accepts `--config <PATH>` (`BACKSYNC_CONFIG`) and
//! `--redis-url <URL>` (`BACKSYNC_REDIS_URL`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    add::AddArgs, config::ConfigCommand, delete::DeleteArgs, status::StatusArgs, top::TopArgs,
    worker::WorkerArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "backsync",
    version,
    about = "Track items that need syncing and hand them out to workers under leases",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mark items as needing sync.
    Add(AddArgs),

    /// Claim up to N eligible items, oldest update first.
    Top(TopArgs),

    /// Commit synced items; updated ones stay pending.
    Delete(DeleteArgs),

    /// Show pending count and per-item lease state.
    Status(StatusArgs),

    /// Run the claim → sync → commit loop until ctrl-c.
    Worker(WorkerArgs),

    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Add(args) => args.run(&cli.global),
        Commands::Top(args) => args.run(&cli.global),
        Commands::Delete(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
        Commands::Worker(args) => args.run(&cli.global),
        Commands::Config { command } => commands::config::run(command, &cli.global),
    }
}
