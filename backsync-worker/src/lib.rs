//! Long-running worker: claim a batch, push it through a [`SyncHandler`],
//! commit it, repeat until shutdown.

mod error;
pub mod handler;
mod runtime;

pub use error::WorkerError;
pub use handler::{CommandHandler, HandlerError, LogHandler, SyncHandler};
pub use runtime::{
    init_tracing, process_batch, run, run_until_signal, start_blocking, BatchOutcome,
    WorkerOptions, WorkerSummary,
};
