//! Buffered pipeline that keeps rendered pairs ready for evaluators.
//!
//! A single refill worker walks the store in identifier order, renders each
//! unprocessed pair and pushes it into a bounded in-memory queue. Consumers
//! block on [`BufferedPipeline::dequeue_next`] until a pair is available.
//!
//! # Features
//!
//! - Bounded queue, never holds more than `capacity` pairs
//! - Cursor-based iteration, a pair is enqueued at most once per pipeline
//! - Store and render failures are logged and counted, never fatal
//! - Graceful, idempotent shutdown with a broadcast channel
//! - Per-pipeline statistics and Prometheus metrics

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{
    PipelineMetrics, OUTCOME_ENQUEUED, OUTCOME_FAILED, OUTCOME_NO_ENTRY, OUTCOME_QUEUE_FULL,
};
use crate::render::{render_pair, Renderer};
use crate::storage::PairStore;
use crate::trajectory::{PairId, TrajectoryPair};

/// Errors that can occur when starting a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The queue must hold at least one pair.
    #[error("Queue capacity must be greater than 0")]
    ZeroCapacity,

    /// Metric registration failed.
    #[error("Metrics initialization failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Configuration for the buffered pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedPipelineConfig {
    /// Maximum number of rendered pairs held in memory.
    pub capacity: usize,
    /// Pause after every refill cycle.
    pub poll_interval: Duration,
}

impl Default for BufferedPipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl BufferedPipelineConfig {
    /// Creates a configuration with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Result of one refill cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A pair was rendered and enqueued.
    Enqueued(PairId),
    /// The store had no unprocessed pair after the cursor.
    NoEntry,
    /// The queue was full; the store was not queried.
    QueueFull,
    /// A store or render failure; counted and logged.
    Failed,
}

impl CycleOutcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Enqueued(_) => OUTCOME_ENQUEUED,
            CycleOutcome::NoEntry => OUTCOME_NO_ENTRY,
            CycleOutcome::QueueFull => OUTCOME_QUEUE_FULL,
            CycleOutcome::Failed => OUTCOME_FAILED,
        }
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Queue capacity.
    pub capacity: usize,
    /// Pairs currently buffered.
    pub queued: usize,
    /// Pairs pushed into the queue.
    pub enqueued: u64,
    /// Pairs handed to consumers.
    pub dequeued: u64,
    /// Cycles that found nothing to do in the store.
    pub empty_polls: u64,
    /// Store errors seen by the worker.
    pub store_errors: u64,
    /// Pairs dropped because rendering failed.
    pub render_failures: u64,
    /// Identifier of the last pair the worker moved past.
    pub last_cursor: Option<PairId>,
}

const NO_CURSOR: i64 = i64::MIN;

/// Shared state for tracking pipeline statistics.
struct SharedPipelineStats {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    empty_polls: AtomicU64,
    store_errors: AtomicU64,
    render_failures: AtomicU64,
    cursor: AtomicI64,
}

impl SharedPipelineStats {
    fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            render_failures: AtomicU64::new(0),
            cursor: AtomicI64::new(NO_CURSOR),
        }
    }

    fn cursor(&self) -> Option<PairId> {
        match self.cursor.load(Ordering::SeqCst) {
            NO_CURSOR => None,
            id => Some(PairId(id)),
        }
    }

    fn set_cursor(&self, id: PairId) {
        self.cursor.store(id.get(), Ordering::SeqCst);
    }

    fn snapshot(&self, capacity: usize, queued: usize) -> PipelineStats {
        PipelineStats {
            capacity,
            queued,
            enqueued: self.enqueued.load(Ordering::SeqCst),
            dequeued: self.dequeued.load(Ordering::SeqCst),
            empty_polls: self.empty_polls.load(Ordering::SeqCst),
            store_errors: self.store_errors.load(Ordering::SeqCst),
            render_failures: self.render_failures.load(Ordering::SeqCst),
            last_cursor: self.cursor(),
        }
    }
}

/// Number of items currently held by the channel behind `sender`.
fn queued(sender: &mpsc::Sender<TrajectoryPair>) -> usize {
    sender.max_capacity() - sender.capacity()
}

/// Bounded queue of rendered pairs fed by a background refill worker.
pub struct BufferedPipeline {
    config: BufferedPipelineConfig,
    // Keeps the channel open so an empty queue blocks instead of closing.
    sender: mpsc::Sender<TrajectoryPair>,
    receiver: Mutex<mpsc::Receiver<TrajectoryPair>>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<SharedPipelineStats>,
    metrics: PipelineMetrics,
    is_running: Arc<AtomicBool>,
}

impl BufferedPipeline {
    /// Starts the refill worker and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ZeroCapacity` for a zero-sized queue.
    pub fn start(
        config: BufferedPipelineConfig,
        store: Arc<dyn PairStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, PipelineError> {
        if config.capacity == 0 {
            return Err(PipelineError::ZeroCapacity);
        }

        let (sender, receiver) = mpsc::channel(config.capacity);
        let (shutdown_tx, _) = broadcast::channel(1);
        let stats = Arc::new(SharedPipelineStats::new());
        let metrics = PipelineMetrics::new()?;
        let is_running = Arc::new(AtomicBool::new(true));

        let worker = RefillWorker {
            store,
            renderer,
            sender: sender.clone(),
            shutdown_rx: shutdown_tx.subscribe(),
            poll_interval: config.poll_interval,
            cursor: None,
            stats: Arc::clone(&stats),
            metrics: metrics.clone(),
        };

        let running = Arc::clone(&is_running);
        let handle = tokio::spawn(async move {
            worker.run().await;
            running.store(false, Ordering::SeqCst);
        });

        info!(
            capacity = config.capacity,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Buffered pipeline started"
        );

        Ok(Self {
            config,
            sender,
            receiver: Mutex::new(receiver),
            shutdown_tx,
            worker_handle: Mutex::new(Some(handle)),
            stats,
            metrics,
            is_running,
        })
    }

    /// Removes and returns the oldest buffered pair.
    ///
    /// Waits without timeout until a pair is available. Once the pipeline
    /// has been shut down nothing refills the queue, so calling this on an
    /// empty queue then never returns; check [`Self::len`] first.
    pub async fn dequeue_next(&self) -> TrajectoryPair {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(pair) => {
                self.stats.dequeued.fetch_add(1, Ordering::SeqCst);
                self.metrics.dequeued.inc();
                self.metrics.queue_depth.set(queued(&self.sender) as f64);
                debug!(pair_id = %pair.id, "Dequeued pair");
                pair
            }
            // Unreachable while `self.sender` is alive.
            None => std::future::pending().await,
        }
    }

    /// Removes every buffered pair without waiting.
    ///
    /// Intended for cleanup after [`Self::shutdown`].
    pub async fn drain(&self) -> Vec<TrajectoryPair> {
        let mut receiver = self.receiver.lock().await;
        let mut drained = Vec::new();
        while let Ok(pair) = receiver.try_recv() {
            drained.push(pair);
        }
        self.metrics.queue_depth.set(queued(&self.sender) as f64);
        drained
    }

    /// Stops the refill worker and waits for it to exit.
    ///
    /// Idempotent. After it returns the queue contents no longer change
    /// except through consumers.
    pub async fn shutdown(&self) {
        let Some(handle) = self.worker_handle.lock().await.take() else {
            debug!("Buffered pipeline already shut down");
            return;
        };

        info!("Initiating buffered pipeline shutdown");
        // Ignore send error - the worker may have already stopped
        let _ = self.shutdown_tx.send(());

        if let Err(e) = handle.await {
            error!(error = %e, "Refill worker panicked during shutdown");
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!(queued = self.len(), "Buffered pipeline shutdown complete");
    }

    /// Number of pairs currently buffered.
    pub fn len(&self) -> usize {
        queued(&self.sender)
    }

    /// Returns true if no pair is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered pairs.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Identifier of the last pair the worker moved past, if any.
    pub fn last_cursor(&self) -> Option<PairId> {
        self.stats.cursor()
    }

    /// Returns whether the refill worker is still running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot(self.config.capacity, self.len())
    }

    /// Metrics of this pipeline.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

impl Drop for BufferedPipeline {
    fn drop(&mut self) {
        // Stops a worker that was never shut down explicitly.
        let _ = self.shutdown_tx.send(());
    }
}

/// The single task that moves pairs from the store into the queue.
struct RefillWorker {
    store: Arc<dyn PairStore>,
    renderer: Arc<dyn Renderer>,
    sender: mpsc::Sender<TrajectoryPair>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    cursor: Option<PairId>,
    stats: Arc<SharedPipelineStats>,
    metrics: PipelineMetrics,
}

impl RefillWorker {
    /// Main worker loop.
    ///
    /// Runs one refill cycle, then sleeps `poll_interval`, until a shutdown
    /// signal is received.
    async fn run(mut self) {
        info!("Refill worker started");

        loop {
            // Check for shutdown signal (non-blocking)
            match self.shutdown_rx.try_recv() {
                Ok(())
                | Err(broadcast::error::TryRecvError::Closed)
                | Err(broadcast::error::TryRecvError::Lagged(_)) => break,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            let outcome = self.enqueue_next().await;
            self.metrics.record_cycle(outcome.label());

            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(cursor = ?self.cursor, "Refill worker stopped");
    }

    fn advance(&mut self, id: PairId) {
        self.cursor = Some(id);
        self.stats.set_cursor(id);
        self.metrics.cursor.set(id.get() as f64);
    }

    /// Runs one refill cycle.
    async fn enqueue_next(&mut self) -> CycleOutcome {
        if self.sender.capacity() == 0 {
            debug!("Queue full, skipping refill");
            return CycleOutcome::QueueFull;
        }

        let mut pair = match self.store.get_next_unprocessed(self.cursor).await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!(cursor = ?self.cursor, "No unprocessed entries");
                self.stats.empty_polls.fetch_add(1, Ordering::SeqCst);
                return CycleOutcome::NoEntry;
            }
            Err(e) => {
                warn!(
                    cursor = ?self.cursor,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Couldn't fetch entry"
                );
                self.stats.store_errors.fetch_add(1, Ordering::SeqCst);
                self.metrics.record_store_error(e.kind());
                return CycleOutcome::Failed;
            }
        };

        let id = pair.id;
        let timer = self.metrics.render_duration.start_timer();
        let rendered = render_pair(self.renderer.as_ref(), &mut pair).await;
        timer.observe_duration();

        if let Err(e) = rendered {
            warn!(pair_id = %id, error = %e, "Rendering failed, dropping pair");
            self.stats.render_failures.fetch_add(1, Ordering::SeqCst);
            self.metrics.render_failures.inc();
            self.advance(id);
            return CycleOutcome::Failed;
        }

        match self.sender.try_send(pair) {
            Ok(()) => {
                self.advance(id);
                self.stats.enqueued.fetch_add(1, Ordering::SeqCst);
                let depth = queued(&self.sender);
                self.metrics.queue_depth.set(depth as f64);
                info!(pair_id = %id, queued = depth, "Enqueued pair");
                CycleOutcome::Enqueued(id)
            }
            Err(e) => {
                let mut pair = match e {
                    mpsc::error::TrySendError::Full(pair)
                    | mpsc::error::TrySendError::Closed(pair) => pair,
                };
                warn!(pair_id = %id, "Queue rejected pair, will retry");
                pair.delete_videos().await;
                CycleOutcome::QueueFull
            }
        }
    }
}
