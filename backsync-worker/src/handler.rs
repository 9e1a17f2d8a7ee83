//! What a worker does with a claimed batch.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use backsync_core::ItemKey;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },

    #[error("{0}")]
    Other(String),
}

/// Pushes a batch of claimed items to the external system.
///
/// Returning `Ok` commits the batch. Returning an error leaves it claimed
/// until the leases go stale, so the same keys can be handed out again.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, batch: &[ItemKey]) -> Result<(), HandlerError>;
}

/// Logs each batch and reports success. Useful for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait]
impl SyncHandler for LogHandler {
    async fn sync(&self, batch: &[ItemKey]) -> Result<(), HandlerError> {
        for item in batch {
            tracing::info!(item = %item, "sync");
        }
        Ok(())
    }
}

/// Runs `sh -c <command>` once per batch with the keys on stdin, one per
/// line. The batch succeeds iff the command exits zero.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    command: String,
}

impl CommandHandler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn spawn_err(&self, source: std::io::Error) -> HandlerError {
        HandlerError::Spawn {
            command: self.command.clone(),
            source,
        }
    }
}

#[async_trait]
impl SyncHandler for CommandHandler {
    async fn sync(&self, batch: &[ItemKey]) -> Result<(), HandlerError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("BACKSYNC_BATCH_SIZE", batch.len().to_string())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_err(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = String::new();
            for item in batch {
                payload.push_str(item.as_str());
                payload.push('\n');
            }
            // A command that ignores stdin may exit before we finish writing.
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                Err(err) => return Err(self.spawn_err(err)),
            }
        }

        let status = child.wait().await.map_err(|e| self.spawn_err(e))?;
        if status.success() {
            Ok(())
        } else {
            Err(HandlerError::Failed {
                command: self.command.clone(),
                status,
            })
        }
    }
}
