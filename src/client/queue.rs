//! Bounded producer queue with a background flush worker.
//!
//! - `enqueue` never blocks: when the buffer is full the record is dropped
//!   and counted.
//! - One worker thread per process waits briefly for a first record, then
//!   drains without blocking up to `batch_size` records and hands the batch
//!   to the [`Transport`].
//! - The worker is keyed by process id. Every public call compares the
//!   current pid with the one that started the worker; after a fork the
//!   child builds a fresh channel and worker instead of reusing the parent's.
//! - Delivery is best-effort: a failed send discards the batch. That
//!   decision is made in exactly one place, [`deliver`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::client::layer::suppress_current_thread;
use crate::client::transport::Transport;
use crate::model::{LogBatch, LogRecord};

// =============================================================================
// Constants
// =============================================================================

/// How long the worker waits for a first record before re-checking `stop`.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on how long `stop` waits for the worker to exit.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const WORKER_THREAD_NAME: &str = "loghound-queue";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to spawn queue worker: {0}")]
    Spawn(#[from] std::io::Error),
}

// =============================================================================
// State
// =============================================================================

struct Worker {
    tx: SyncSender<LogRecord>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

struct WorkerState {
    /// Process that owns `worker`.
    pid: u32,
    worker: Option<Worker>,
}

impl WorkerState {
    /// Forget a worker inherited from another process.
    fn adopt_current_process(&mut self) {
        let pid = std::process::id();
        if self.pid != pid {
            tracing::debug!(old_pid = self.pid, pid, "Process changed, resetting queue worker");
            self.pid = pid;
            // The parent's thread does not exist here; dropping the handle detaches it.
            self.worker = None;
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Producer-side buffer between log events and the transport.
pub struct ProducerQueue {
    transport: Arc<dyn Transport>,
    application_id: String,
    capacity: usize,
    batch_size: usize,
    state: Mutex<WorkerState>,
    dropped: AtomicU64,
}

impl std::fmt::Debug for ProducerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerQueue")
            .field("application_id", &self.application_id)
            .field("capacity", &self.capacity)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl ProducerQueue {
    /// Create a queue; the worker starts lazily on the first `start` or
    /// `enqueue`.
    pub fn new(
        transport: impl Transport,
        application_id: impl Into<String>,
        capacity: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            application_id: application_id.into(),
            capacity: capacity.max(1),
            batch_size: batch_size.max(1),
            state: Mutex::new(WorkerState {
                pid: std::process::id(),
                worker: None,
            }),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the worker for the current process. No-op when one is running.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut state = self.lock();
        self.ensure_worker(&mut state)
    }

    fn ensure_worker(&self, state: &mut WorkerState) -> Result<(), QueueError> {
        state.adopt_current_process();
        if state.worker.as_ref().is_some_and(Worker::is_alive) {
            return Ok(());
        }

        let (tx, rx) = mpsc::sync_channel(self.capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = FlushContext {
            transport: Arc::clone(&self.transport),
            application_id: self.application_id.clone(),
            batch_size: self.batch_size,
        };
        let worker_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(rx, worker_stop, ctx))?;

        state.worker = Some(Worker { tx, stop, handle });
        tracing::debug!(pid = state.pid, "Queue worker started");
        Ok(())
    }

    /// Buffer a record for delivery without blocking.
    ///
    /// Drops the record when the buffer is full or no worker can be started.
    pub fn enqueue(&self, record: LogRecord) {
        let mut state = self.lock();
        if let Err(e) = self.ensure_worker(&mut state) {
            tracing::debug!(error = %e, "Queue worker unavailable, dropping record");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(worker) = state.worker.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match worker.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Signal the worker to exit and wait for it, at most one second.
    ///
    /// Returns `true` when the worker was joined. Records still buffered are
    /// not flushed.
    pub fn stop(&self) -> bool {
        let worker = {
            let mut state = self.lock();
            state.adopt_current_process();
            state.worker.take()
        };
        let Some(Worker { tx, stop, handle }) = worker else {
            return true;
        };

        stop.store(true, Ordering::Release);
        drop(tx);

        let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::debug!("Queue worker did not stop in time, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let _ = handle.join();
        true
    }

    /// Whether a live worker exists for the current process.
    pub fn is_running(&self) -> bool {
        let state = self.lock();
        state.pid == std::process::id() && state.worker.as_ref().is_some_and(Worker::is_alive)
    }

    /// Records dropped because the buffer was full or no worker could run.
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Count a record lost before it reached the buffer.
    pub(crate) fn note_lost_record(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    #[cfg(test)]
    fn pretend_forked(&self) {
        self.lock().pid = 0;
    }
}

impl Drop for ProducerQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct FlushContext {
    transport: Arc<dyn Transport>,
    application_id: String,
    batch_size: usize,
}

fn run_worker(rx: Receiver<LogRecord>, stop: Arc<AtomicBool>, ctx: FlushContext) {
    suppress_current_thread();

    while !stop.load(Ordering::Acquire) {
        let first = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut records = Vec::with_capacity(ctx.batch_size);
        records.push(first);
        while records.len() < ctx.batch_size {
            match rx.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }

        deliver(&ctx, records);
    }
}

/// Send one batch. Best-effort delivery: a failed batch is discarded here
/// and nowhere else, and the failure is only visible at debug level.
fn deliver(ctx: &FlushContext, records: Vec<LogRecord>) {
    let count = records.len();
    let batch = LogBatch::new(ctx.application_id.clone(), records);
    if let Err(e) = ctx.transport.send(&batch) {
        tracing::debug!(error = %e, count, "Discarding log batch after transport failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::TransportError;
    use crate::model::LogLevel;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<LogBatch>>,
    }

    impl RecordingTransport {
        fn messages(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|b| b.logs.iter().map(|l| l.message.clone()))
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    /// Fails every send and counts attempts.
    #[derive(Default)]
    struct FailingTransport {
        attempts: AtomicUsize,
    }

    impl Transport for FailingTransport {
        fn send(&self, _batch: &LogBatch) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Status {
                status: 503,
                url: "http://test".to_string(),
            })
        }
    }

    /// Blocks inside the first send until released.
    struct GatedTransport {
        inner: RecordingTransport,
        first: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Transport for GatedTransport {
        fn send(&self, batch: &LogBatch) -> Result<(), TransportError> {
            if !self.first.swap(true, Ordering::SeqCst) {
                let _ = self.entered.lock().unwrap().send(());
                let _ = self.release.lock().unwrap().recv();
            }
            self.inner.send(batch)
        }
    }

    fn record(i: usize) -> LogRecord {
        LogRecord::new(i as f64, LogLevel::Info, format!("m{i}"), "app", "test")
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_records_flushed_in_order_and_batched() {
        let transport = Arc::new(RecordingTransport::default());
        let queue = ProducerQueue::new(Arc::clone(&transport), "app", 1000, 50);

        for i in 0..120 {
            queue.enqueue(record(i));
        }
        wait_until(|| transport.messages().len() == 120);

        let expected: Vec<String> = (0..120).map(|i| format!("m{i}")).collect();
        assert_eq!(transport.messages(), expected);
        for batch in transport.batches.lock().unwrap().iter() {
            assert!(batch.len() <= 50);
            assert_eq!(batch.application_id, "app");
        }
        assert_eq!(queue.dropped_records(), 0);
        assert!(queue.stop());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = Arc::new(GatedTransport {
            inner: RecordingTransport::default(),
            first: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let queue = ProducerQueue::new(Arc::clone(&transport), "app", 5, 50);

        queue.enqueue(record(0));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Worker is stuck in send; the buffer holds exactly 5.
        for i in 1..=8 {
            queue.enqueue(record(i));
        }
        assert_eq!(queue.dropped_records(), 3);

        release_tx.send(()).unwrap();
        wait_until(|| transport.inner.messages().len() == 6);
        assert_eq!(
            transport.inner.messages(),
            ["m0", "m1", "m2", "m3", "m4", "m5"]
        );
        assert!(queue.stop());
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let transport = Arc::new(FailingTransport::default());
        let queue = ProducerQueue::new(Arc::clone(&transport), "app", 10, 1);

        queue.enqueue(record(0));
        queue.enqueue(record(1));
        wait_until(|| transport.attempts.load(Ordering::SeqCst) == 2);

        assert!(queue.is_running());
        assert!(queue.stop());
    }

    #[test]
    fn test_start_is_idempotent_and_stop_is_bounded() {
        let queue = ProducerQueue::new(RecordingTransport::default(), "app", 10, 5);
        assert!(!queue.is_running());

        queue.start().unwrap();
        queue.start().unwrap();
        assert!(queue.is_running());

        let started = Instant::now();
        assert!(queue.stop());
        assert!(started.elapsed() <= STOP_JOIN_TIMEOUT + Duration::from_millis(500));
        assert!(!queue.is_running());

        // Stopping twice is harmless; enqueue restarts lazily.
        assert!(queue.stop());
        queue.enqueue(record(0));
        assert!(queue.is_running());
        queue.stop();
    }

    #[test]
    fn test_process_change_starts_fresh_worker() {
        let transport = Arc::new(RecordingTransport::default());
        let queue = ProducerQueue::new(Arc::clone(&transport), "app", 10, 5);

        queue.enqueue(record(0));
        wait_until(|| transport.messages().len() == 1);

        queue.pretend_forked();
        assert!(!queue.is_running());

        queue.enqueue(record(1));
        assert!(queue.is_running());
        wait_until(|| transport.messages().len() == 2);
        assert_eq!(transport.messages(), ["m0", "m1"]);
        queue.stop();
    }
}
