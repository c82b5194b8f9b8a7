//! Asynchronous soft-delete pipeline.
//!
//! Callers push [`DeletionRequest`]s onto a bounded queue and return
//! immediately. One worker task owns the pending buffer and, on every tick of
//! the flush interval, hands the whole buffer to
//! [`UrlStore::mark_deleted`]. Deletion is therefore eventually consistent:
//! a request becomes visible within one flush interval of a successful
//! store call.
//!
//! ## States
//!
//! ```text
//! Idle --enqueue--> Accumulating --tick/flush--> Flushing --> Accumulating
//! ```
//!
//! ## Failure handling
//!
//! A failed store call keeps the batch and retries it on a later tick after
//! an exponential backoff. Once a batch has failed `max_attempts` times it
//! is dropped and counted in [`BatcherStats::dropped`].
//!
//! ## Backpressure
//!
//! The worker buffers at most `queue_capacity` requests and stops reading
//! the queue while the buffer is full, so a store that keeps failing makes
//! producers wait (or get `QueueFull`) instead of growing memory. Flush and
//! shutdown travel on a separate control channel and are always served.
//!
//! ## Shutdown
//!
//! [`DeletionBatcher::shutdown`] closes the queue, drains what is left, runs
//! a final flush, and joins the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use urlc_store::UrlStore;
use urlc_types::DeletionRequest;

use crate::config::BatcherConfig;
use crate::error::BatchError;

/// Pending flush/shutdown calls the control channel holds.
const CONTROL_CAPACITY: usize = 16;

/// What a single flush did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Requests handed to the store successfully.
    pub applied: usize,
    /// Requests discarded after exhausting their attempts.
    pub dropped: usize,
    /// Requests still buffered, awaiting a retry.
    pub pending: usize,
}

/// Lifetime counters of a batcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatcherStats {
    pub flushed: u64,
    pub dropped: u64,
    pub failed_attempts: u64,
}

#[derive(Default)]
struct Counters {
    flushed: AtomicU64,
    dropped: AtomicU64,
    failed_attempts: AtomicU64,
}

enum Control {
    Flush(oneshot::Sender<FlushReport>),
    Shutdown(oneshot::Sender<FlushReport>),
}

/// Handle to the deletion worker.
pub struct DeletionBatcher {
    requests: mpsc::Sender<DeletionRequest>,
    control: mpsc::Sender<Control>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeletionBatcher {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn UrlStore>, config: BatcherConfig) -> Self {
        let (requests, request_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (control, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            store,
            requests: request_rx,
            control: control_rx,
            buffer: Vec::new(),
            retry: None,
            counters: Arc::clone(&counters),
            config,
        };
        info!(
            queue_capacity = worker.config.queue_capacity,
            flush_interval_ms = worker.config.flush_interval_ms,
            "deletion batcher started"
        );
        let handle = tokio::spawn(worker.run());

        Self {
            requests,
            control,
            counters,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a request, waiting for room if the queue is full.
    pub async fn enqueue(&self, request: DeletionRequest) -> Result<(), BatchError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BatchError::Closed)
    }

    /// Queue a request without waiting; fails with `QueueFull` under
    /// backpressure.
    pub fn try_enqueue(&self, request: DeletionRequest) -> Result<(), BatchError> {
        self.requests
            .try_send(request)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => BatchError::Closed,
            })
    }

    /// Flush everything queued before this call, ignoring any retry backoff.
    pub async fn flush(&self) -> Result<FlushReport, BatchError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(Control::Flush(reply))
            .await
            .map_err(|_| BatchError::Closed)?;
        response.await.map_err(|_| BatchError::Closed)
    }

    /// Drain the queue, flush one last time, and stop the worker.
    ///
    /// Calling it again after a completed shutdown returns an empty report.
    pub async fn shutdown(&self) -> Result<FlushReport, BatchError> {
        let handle = self.worker.lock().expect("lock poisoned").take();
        let Some(handle) = handle else {
            return Ok(FlushReport::default());
        };

        let (reply, response) = oneshot::channel();
        let report = match self.control.send(Control::Shutdown(reply)).await {
            Ok(()) => response.await.unwrap_or_default(),
            Err(_) => FlushReport::default(),
        };
        if let Err(e) = handle.await {
            error!(error = %e, "deletion worker panicked");
        }
        info!(
            applied = report.applied,
            dropped = report.dropped,
            "deletion batcher stopped"
        );
        Ok(report)
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            flushed: self.counters.flushed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DeletionBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionBatcher")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Retry bookkeeping for the batch at the front of the buffer.
#[derive(Clone, Copy, Debug)]
struct Retry {
    /// Failed attempts so far.
    attempts: u32,
    /// Length of the buffer prefix that failed.
    batch_len: usize,
    not_before: Instant,
}

/// The single owner of the pending buffer.
struct Worker {
    store: Arc<dyn UrlStore>,
    requests: mpsc::Receiver<DeletionRequest>,
    control: mpsc::Receiver<Control>,
    buffer: Vec<DeletionRequest>,
    retry: Option<Retry>,
    counters: Arc<Counters>,
    config: BatcherConfig,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = time::interval(self.config.flush_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            let has_room = self.buffer.len() < self.config.queue_capacity.max(1);
            tokio::select! {
                request = self.requests.recv(), if has_room => match request {
                    Some(request) => self.buffer.push(request),
                    None => {
                        self.drain_and_flush().await;
                        break;
                    }
                },
                control = self.control.recv() => match control {
                    Some(Control::Flush(reply)) => {
                        self.absorb_queued();
                        let report = self.flush(true).await;
                        let _ = reply.send(report);
                    }
                    Some(Control::Shutdown(reply)) => {
                        let report = self.drain_and_flush().await;
                        let _ = reply.send(report);
                        break;
                    }
                    None => {
                        self.drain_and_flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush(false).await;
                }
            }
        }
        debug!("deletion worker exited");
    }

    /// Move every request already sitting in the queue into the buffer.
    fn absorb_queued(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            self.buffer.push(request);
        }
    }

    /// Stop accepting requests, absorb everything still queued, and flush.
    async fn drain_and_flush(&mut self) -> FlushReport {
        self.requests.close();
        self.control.close();
        let mut waiting = Vec::new();
        while let Ok(control) = self.control.try_recv() {
            match control {
                Control::Flush(reply) | Control::Shutdown(reply) => waiting.push(reply),
            }
        }
        self.absorb_queued();
        let report = self.flush(true).await;
        for reply in waiting {
            let _ = reply.send(report);
        }
        report
    }

    /// Hand the buffer to the store.
    ///
    /// Unforced flushes respect the retry backoff of a previously failed
    /// batch.
    async fn flush(&mut self, forced: bool) -> FlushReport {
        if self.buffer.is_empty() {
            return FlushReport::default();
        }
        if let Some(retry) = self.retry {
            if !forced && Instant::now() < retry.not_before {
                return FlushReport {
                    pending: self.buffer.len(),
                    ..FlushReport::default()
                };
            }
        }

        let count = self.buffer.len();
        match self.store.mark_deleted(&self.buffer).await {
            Ok(()) => {
                self.buffer.clear();
                self.retry = None;
                self.counters
                    .flushed
                    .fetch_add(count as u64, Ordering::Relaxed);
                info!(count, "deletion batch flushed");
                FlushReport {
                    applied: count,
                    ..FlushReport::default()
                }
            }
            Err(e) => {
                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                let (attempts, batch_len) = match self.retry {
                    Some(retry) => (retry.attempts + 1, retry.batch_len),
                    None => (1, count),
                };

                if attempts >= self.config.max_attempts {
                    self.buffer.drain(..batch_len);
                    self.retry = None;
                    self.counters
                        .dropped
                        .fetch_add(batch_len as u64, Ordering::Relaxed);
                    error!(
                        dropped = batch_len,
                        attempts,
                        error = %e,
                        "deletion batch dropped after repeated failures"
                    );
                    FlushReport {
                        dropped: batch_len,
                        pending: self.buffer.len(),
                        ..FlushReport::default()
                    }
                } else {
                    let delay = self.config.backoff(attempts);
                    self.retry = Some(Retry {
                        attempts,
                        batch_len,
                        not_before: Instant::now() + delay,
                    });
                    warn!(
                        count,
                        attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "deletion flush failed; batch kept for retry"
                    );
                    FlushReport {
                        pending: count,
                        ..FlushReport::default()
                    }
                }
            }
        }
    }
}
