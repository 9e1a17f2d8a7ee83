//! `backsync delete` — commit a synced batch.

use std::io::BufRead;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use backsync_core::ItemKey;

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Keys that were synced. Read from stdin, one per line, when omitted.
    #[arg(value_name = "ITEM")]
    pub items: Vec<String>,

    /// Emit `{"retired": [...], "kept": [...]}`.
    #[arg(long)]
    pub json: bool,
}

impl DeleteArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let items = if self.items.is_empty() {
            read_keys(std::io::stdin().lock())?
        } else {
            self.items.into_iter().map(ItemKey::from).collect()
        };

        let outcome = super::block_on(async move {
            let manager = super::connect(&config).await?;
            manager.delete(&items).await.context("failed to commit items")
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?
            );
            return Ok(());
        }
        for item in &outcome.retired {
            println!("{} {item}", "retired".green());
        }
        for item in &outcome.kept {
            println!("{} {item}", "kept".yellow());
        }
        Ok(())
    }
}

fn read_keys(input: impl BufRead) -> Result<Vec<ItemKey>> {
    let mut keys = Vec::new();
    for line in input.lines() {
        let line = line.context("failed to read keys from stdin")?;
        let key = line.trim();
        if !key.is_empty() {
            keys.push(ItemKey::from(key));
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_keys_skip_blank_lines() {
        let keys = read_keys("a\n\n  b  \n\nc".as_bytes()).expect("read");
        assert_eq!(
            keys,
            vec![ItemKey::from("a"), ItemKey::from("b"), ItemKey::from("c")]
        );
    }
}
