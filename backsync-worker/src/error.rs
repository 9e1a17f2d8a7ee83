use thiserror::Error;

/// Error surface for the worker runtime.
///
/// Per-batch failures never end up here; the loop counts them in its
/// summary and keeps going. These are the failures that stop a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] backsync_core::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] backsync_sync::StoreError),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("signal handler failed: {0}")]
    Signal(std::io::Error),
}

pub(crate) fn io_err(context: &'static str, source: std::io::Error) -> WorkerError {
    WorkerError::Io { context, source }
}
