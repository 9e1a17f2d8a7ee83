use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use backsync_core::{BacksyncConfig, ItemKey, WorkerConfig};
use backsync_sync::{Manager, RedisStore, RetireOutcome, SyncError};

use crate::error::{io_err, WorkerError};
use crate::handler::SyncHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// `n` passed to `Top` on every pass.
    pub batch_size: usize,
    /// Pause after an empty claim or a store failure.
    pub idle_interval: Duration,
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            idle_interval: config.idle_interval(),
        }
    }
}

/// Result of one claim → sync → commit pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// `Top` returned nothing.
    Idle,
    Committed {
        claimed: Vec<ItemKey>,
        outcome: RetireOutcome,
    },
    /// The handler rejected the batch; its leases were left to expire.
    HandlerFailed {
        claimed: Vec<ItemKey>,
        error: String,
    },
}

/// Counters accumulated by [`run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    /// Passes that claimed at least one item.
    pub batches: usize,
    pub claimed: usize,
    pub retired: usize,
    /// Synced but not retired because they were updated mid-flight.
    pub kept: usize,
    pub handler_failures: usize,
    pub store_failures: usize,
}

impl WorkerSummary {
    fn record(&mut self, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Idle => {}
            BatchOutcome::Committed { claimed, outcome } => {
                self.batches += 1;
                self.claimed += claimed.len();
                self.retired += outcome.retired.len();
                self.kept += outcome.kept.len();
            }
            BatchOutcome::HandlerFailed { claimed, .. } => {
                self.batches += 1;
                self.claimed += claimed.len();
                self.handler_failures += 1;
            }
        }
    }
}

/// Claim up to `batch_size` items, hand them to `handler`, and commit them
/// if it succeeds.
///
/// A handler failure is an `Ok(HandlerFailed)`: nothing is committed and the
/// leases stay in place until they go stale. A store failure during `Delete`
/// after a successful sync has the same effect, so items are synced at least
/// once but possibly more.
pub async fn process_batch(
    manager: &Manager,
    handler: &dyn SyncHandler,
    batch_size: usize,
) -> Result<BatchOutcome, SyncError> {
    let claimed = manager.top(batch_size).await?;
    if claimed.is_empty() {
        return Ok(BatchOutcome::Idle);
    }

    let started = Instant::now();
    if let Err(err) = handler.sync(&claimed).await {
        tracing::warn!(
            claimed = claimed.len(),
            error = %err,
            "handler failed; leaving batch to expire",
        );
        return Ok(BatchOutcome::HandlerFailed {
            claimed,
            error: err.to_string(),
        });
    }

    let outcome = manager.delete(&claimed).await?;
    tracing::info!(
        claimed = claimed.len(),
        retired = outcome.retired.len(),
        kept = outcome.kept.len(),
        duration_ms = millis(started.elapsed()),
        "batch synced",
    );
    Ok(BatchOutcome::Committed { claimed, outcome })
}

/// Loop [`process_batch`] until `shutdown` fires.
///
/// The batch in flight always runs to completion; shutdown is only observed
/// between batches and while idling.
pub async fn run(
    manager: Arc<Manager>,
    handler: Arc<dyn SyncHandler>,
    options: WorkerOptions,
    mut shutdown: broadcast::Receiver<()>,
) -> WorkerSummary {
    let mut summary = WorkerSummary::default();
    tracing::info!(
        batch_size = options.batch_size,
        idle_ms = millis(options.idle_interval),
        mode = ?manager.claim_mode(),
        "worker started",
    );

    loop {
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        let idle = match process_batch(&manager, handler.as_ref(), options.batch_size).await {
            Ok(outcome) => {
                summary.record(&outcome);
                outcome == BatchOutcome::Idle
            }
            Err(err) => {
                summary.store_failures += 1;
                tracing::error!(op = err.op(), error = %err, "store call failed");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(options.idle_interval) => {}
            }
        }
    }

    tracing::info!(
        batches = summary.batches,
        claimed = summary.claimed,
        retired = summary.retired,
        kept = summary.kept,
        handler_failures = summary.handler_failures,
        store_failures = summary.store_failures,
        "worker stopped",
    );
    summary
}

/// Run the worker until ctrl-c.
pub async fn run_until_signal(
    manager: Arc<Manager>,
    handler: Arc<dyn SyncHandler>,
    options: WorkerOptions,
) -> Result<WorkerSummary, WorkerError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let worker_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let summary = run(manager, handler, options, shutdown_rx).await;
            let _ = shutdown.send(());
            summary
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, finishing current batch");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => {
                            let _ = shutdown.send(());
                            Err(WorkerError::Signal(err))
                        }
                    }
                }
            }
        })
    };

    let (worker_result, signal_result) = tokio::join!(worker_handle, signal_handle);
    handle_join("signal_handler", signal_result)??;
    handle_join("worker", worker_result)
}

/// Build a runtime, connect to the configured Redis, and run the worker
/// until ctrl-c. Blocks the current thread.
pub fn start_blocking(
    config: BacksyncConfig,
    handler: Arc<dyn SyncHandler>,
) -> Result<WorkerSummary, WorkerError> {
    init_tracing();
    config.validate()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio runtime", e))?;

    runtime.block_on(async move {
        let store = RedisStore::connect(&config.redis_url).await?;
        let manager = Arc::new(Manager::new(Arc::new(store), &config));
        run_until_signal(manager, handler, WorkerOptions::from(&config.worker)).await
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn handle_join<T>(
    task: &'static str,
    result: Result<T, tokio::task::JoinError>,
) -> Result<T, WorkerError> {
    result.map_err(|err| WorkerError::Join {
        task,
        message: err.to_string(),
    })
}

/// Install the fmt subscriber on stderr, filtered by `RUST_LOG` (default
/// `info`). Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use backsync_core::ManualClock;
    use backsync_sync::MemoryStore;

    use crate::handler::HandlerError;

    #[derive(Default)]
    struct RecordingHandler {
        fail: AtomicBool,
        batches: Mutex<Vec<Vec<ItemKey>>>,
    }

    impl RecordingHandler {
        fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Self::default()
            }
        }

        fn seen(&self) -> Vec<Vec<ItemKey>> {
            self.batches.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl SyncHandler for RecordingHandler {
        async fn sync(&self, batch: &[ItemKey]) -> Result<(), HandlerError> {
            self.batches.lock().expect("lock").push(batch.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                Err(HandlerError::Other("downstream unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn manager_at(secs: i64) -> (Arc<Manager>, Arc<ManualClock>) {
        let config = BacksyncConfig::default();
        let clock = Arc::new(ManualClock::new(secs));
        let manager = Manager::new(Arc::new(MemoryStore::new()), &config).with_clock(clock.clone());
        (Arc::new(manager), clock)
    }

    async fn add_all(manager: &Manager, keys: &[&str]) {
        for key in keys {
            manager.add(&ItemKey::from(*key)).await.expect("add");
        }
    }

    fn options(batch_size: usize) -> WorkerOptions {
        WorkerOptions {
            batch_size,
            idle_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn successful_batch_is_committed() {
        let (manager, _clock) = manager_at(100);
        add_all(&manager, &["a", "b"]).await;
        let handler = RecordingHandler::default();

        let outcome = process_batch(&manager, &handler, 10).await.expect("batch");

        match outcome {
            BatchOutcome::Committed { claimed, outcome } => {
                assert_eq!(claimed.len(), 2);
                assert_eq!(outcome.retired.len(), 2);
            }
            other => panic!("expected Committed, got {other:?}"),
        }
        assert_eq!(handler.seen().len(), 1);
        assert_eq!(manager.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn failed_batch_stays_leased_until_stale() {
        let (manager, clock) = manager_at(100);
        add_all(&manager, &["a"]).await;
        let handler = RecordingHandler::failing();

        let outcome = process_batch(&manager, &handler, 10).await.expect("batch");
        assert!(matches!(outcome, BatchOutcome::HandlerFailed { .. }));
        assert_eq!(manager.pending_count().await.expect("count"), 1);

        clock.set(120);
        let again = process_batch(&manager, &handler, 10).await.expect("batch");
        assert_eq!(again, BatchOutcome::Idle, "lease still live");

        clock.set(131);
        handler.fail.store(false, Ordering::SeqCst);
        let retry = process_batch(&manager, &handler, 10).await.expect("batch");
        assert!(matches!(retry, BatchOutcome::Committed { .. }));
        assert_eq!(handler.seen().len(), 2);
        assert_eq!(manager.pending_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn empty_set_is_idle() {
        let (manager, _clock) = manager_at(100);
        let handler = RecordingHandler::default();

        let outcome = process_batch(&manager, &handler, 10).await.expect("batch");

        assert_eq!(outcome, BatchOutcome::Idle);
        assert!(handler.seen().is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn run_drains_pending_items_then_stops() {
        let (manager, _clock) = manager_at(100);
        add_all(&manager, &["a", "b", "c", "d", "e"]).await;
        let handler = Arc::new(RecordingHandler::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let worker = tokio::spawn(run(manager.clone(), handler.clone(), options(2), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).expect("send shutdown");
        let summary = worker.await.expect("join");

        assert_eq!(
            summary,
            WorkerSummary {
                batches: 3,
                claimed: 5,
                retired: 5,
                ..WorkerSummary::default()
            }
        );
        assert!(handler.seen().iter().all(|batch| batch.len() <= 2));
        assert_eq!(manager.pending_count().await.expect("count"), 0);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn run_counts_handler_failures() {
        let (manager, _clock) = manager_at(100);
        add_all(&manager, &["a"]).await;
        let handler = Arc::new(RecordingHandler::failing());
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let worker = tokio::spawn(run(manager.clone(), handler, options(10), shutdown_rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(()).expect("send shutdown");
        let summary = worker.await.expect("join");

        // The clock never moves, so the failed lease never goes stale.
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.handler_failures, 1);
        assert_eq!(summary.retired, 0);
        assert_eq!(manager.pending_count().await.expect("count"), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn shutdown_before_start_claims_nothing() {
        let (manager, _clock) = manager_at(100);
        add_all(&manager, &["a"]).await;
        let handler = Arc::new(RecordingHandler::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        shutdown_tx.send(()).expect("send shutdown");

        let summary = run(manager.clone(), handler.clone(), options(10), shutdown_rx).await;

        assert_eq!(summary, WorkerSummary::default());
        assert!(handler.seen().is_empty());
    }

    #[test]
    fn millis_saturates_instead_of_wrapping() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn options_follow_worker_config() {
        let config = WorkerConfig {
            batch_size: 7,
            idle_interval_ms: 250,
        };
        assert_eq!(
            WorkerOptions::from(&config),
            WorkerOptions {
                batch_size: 7,
                idle_interval: Duration::from_millis(250),
            }
        );
    }
}
