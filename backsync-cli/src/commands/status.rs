//! `backsync status` — pending count and per-item lease state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use backsync_core::{BacksyncConfig, ItemKey, Timestamp};
use backsync_sync::{ItemStatus, LeaseState};

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Items to inspect. Only the summary is shown when omitted.
    #[arg(value_name = "ITEM")]
    pub items: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    pending: usize,
    lease_timeout_secs: u64,
    items: Vec<ItemStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "pending")]
    pending: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "lease")]
    lease: String,
    #[tabled(rename = "state")]
    state: String,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let items: Vec<ItemKey> = self.items.into_iter().map(ItemKey::from).collect();
        let lease_timeout_secs = config.lease_timeout_secs;

        let report = super::block_on(async {
            let manager = super::connect(&config).await?;
            let pending = manager
                .pending_count()
                .await
                .context("failed to count pending items")?;
            let mut statuses = Vec::with_capacity(items.len());
            for item in &items {
                statuses.push(
                    manager
                        .inspect(item)
                        .await
                        .with_context(|| format!("failed to inspect {item}"))?,
                );
            }
            Ok(StatusReport {
                pending,
                lease_timeout_secs,
                items: statuses,
            })
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&config, report);
        Ok(())
    }
}

fn print_table(config: &BacksyncConfig, report: StatusReport) {
    println!(
        "backsync v{} | {} pending | lease timeout {}s | {:?} claims",
        env!("CARGO_PKG_VERSION"),
        report.pending,
        report.lease_timeout_secs,
        config.claim_mode,
    );
    if report.items.is_empty() {
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .items
        .into_iter()
        .map(|status| StatusTableRow {
            item: status.item.to_string(),
            pending: if status.pending { "yes" } else { "no" }.to_string(),
            version: format_stamp(status.version),
            lease: format_stamp(status.lease),
            state: state_label(&status.lease_state),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_stamp(stamp: Option<Timestamp>) -> String {
    match stamp {
        None => "-".to_string(),
        Some(at) => match at.to_datetime() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => at.to_string(),
        },
    }
}

fn state_label(state: &LeaseState) -> String {
    match state {
        LeaseState::Unclaimed => "UNCLAIMED".bright_black().to_string(),
        LeaseState::Active { age_secs } => format!("ACTIVE ({age_secs}s)").green().to_string(),
        LeaseState::Stale { age_secs } => format!("STALE ({age_secs}s)").yellow().to_string(),
    }
}
