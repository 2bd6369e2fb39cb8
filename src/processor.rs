//! Processor: drains the trigger queue on a dedicated thread, aligns each
//! buffer on its trigger and stacks rows into the persistence window.
//!
//! Two gates drive the worker. The outer gate (`running`) keeps the thread
//! alive; the inner gate (`active`) lets it copy. Copying also halts on its
//! own once the window is full, so no buffer is popped while a full window
//! waits for a writer or a resume. All lifecycle calls (`start`, `stop`,
//! `pause`, `resume`, `reconfigure`) are serialized by one lock; the worker
//! only reads the gates.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::buffer::{Sample, SampleBuffer};
use crate::config::ProcessorConfig;
use crate::error::{LifecycleError, ProcessorError, SinkError};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::pool::{BufferHandle, BufferPool};
use crate::queue::QueueConsumer;
use crate::sink::WindowSink;
use crate::state_machine::{ProcessorState, StateMachine};
use crate::trigger::{locate_trigger, locate_trigger_from, TriggerSearch};
use crate::window::{BufferCursor, WindowAccumulator};

/// Run-state flags read by the worker on every iteration.
struct RunGates {
    running: AtomicBool,
    active: AtomicBool,
    window_full: AtomicBool,
}

impl RunGates {
    #[inline]
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[inline]
    fn copying(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.window_full.load(Ordering::SeqCst)
    }
}

/// Rendezvous between a control thread and the worker.
///
/// The control thread closes the copy gate, takes a ticket and waits. The
/// worker acknowledges tickets at the top of its loop, after reading the gate,
/// so an acknowledged worker is never inside a copy.
struct Quiesce {
    requested: AtomicU64,
    state: Mutex<QuiesceState>,
    cond: Condvar,
}

struct QuiesceState {
    acked: u64,
    worker_exited: bool,
}

impl Quiesce {
    fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
            state: Mutex::new(QuiesceState {
                acked: 0,
                worker_exited: true,
            }),
            cond: Condvar::new(),
        }
    }

    /// Called before spawning a worker.
    fn arm(&self) -> u64 {
        let current = self.requested.load(Ordering::SeqCst);
        let mut state = self.state.lock();
        state.acked = current;
        state.worker_exited = false;
        current
    }

    #[inline]
    fn pending(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    fn acknowledge(&self, ticket: u64) {
        let mut state = self.state.lock();
        state.acked = state.acked.max(ticket);
        self.cond.notify_all();
    }

    fn worker_exited(&self) {
        self.state.lock().worker_exited = true;
        self.cond.notify_all();
    }

    /// Block until the worker has left its loop.
    fn wait_for_exit(&self, poll: Duration) {
        let mut state = self.state.lock();
        while !state.worker_exited {
            self.cond.wait_for(&mut state, poll);
        }
    }

    /// Block until the worker has acknowledged a fresh ticket or exited.
    fn wait_for_worker(&self, poll: Duration) {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        while state.acked < ticket && !state.worker_exited {
            self.cond.wait_for(&mut state, poll);
        }
    }
}

#[derive(Default)]
struct Stats {
    processed: AtomicU64,
    untriggered: AtomicU64,
    windows_written: AtomicU64,
    sink_failures: AtomicU64,
    unwritten: AtomicBool,
    filled_at: Mutex<Option<Instant>>,
    written_at: Mutex<Option<Instant>>,
}

/// Point-in-time statistics, serializable for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub state: ProcessorState,
    pub processed_buffers: u64,
    pub processed_bytes: u64,
    pub untriggered_buffers: u64,
    pub windows_written: u64,
    pub sink_failures: u64,
    pub window_full: bool,
    pub window_unwritten: bool,
    pub rows_filled: usize,
    pub window_size: usize,
    pub persistence_size: usize,
    pub fill_to_write_us: Option<u64>,
    pub pool_available: usize,
    pub pool_capacity: usize,
}

/// State shared between the control surface and the worker thread.
struct Shared {
    consumer: QueueConsumer,
    pool: Arc<BufferPool>,
    gates: RunGates,
    accumulator: Mutex<WindowAccumulator>,
    sink: Mutex<Box<dyn WindowSink>>,
    stats: Stats,
    quiesce: Quiesce,
    metrics: Arc<MetricsRegistry>,
    backoff: Duration,
}

impl Shared {
    fn process_buffer(&self, handle: BufferHandle) {
        let span = self.metrics.span(metric_names::BUFFER_PROCESSED);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        self.pool.with_buffer(&handle, |buffer| {
            let mut acc = self.accumulator.lock();
            if self.copy_from(&mut acc, buffer) {
                self.complete_window(&acc);
            }
        });

        // Every popped buffer goes back, whatever happened above.
        self.pool.reclaim(handle);
        span.finish();
    }

    /// Copy the triggered portion of `buffer` into the window.
    /// Returns true when this buffer completed the window.
    fn copy_from(&self, acc: &mut WindowAccumulator, buffer: &SampleBuffer) -> bool {
        let words = buffer.trigger_words();
        let samples = buffer.samples();
        let mut cursor = BufferCursor::default();

        // A row split across buffers continues at sample 0 without a new search.
        if acc.col() == 0 {
            match locate_trigger(words, samples.len(), &mut cursor.trigger_word) {
                TriggerSearch::Found(offset) => cursor.col = offset,
                TriggerSearch::NotFound => {
                    self.stats.untriggered.fetch_add(1, Ordering::Relaxed);
                    debug!(row = acc.row(), "no trigger in buffer, row starts at offset 0");
                }
            }
        }

        loop {
            let outcome = acc.accumulate(samples, &mut cursor);
            if outcome.window_completed {
                return true;
            }
            if !outcome.row_completed || cursor.col >= samples.len() {
                return false;
            }
            // Leftover samples only start a new row at a later trigger.
            match locate_trigger_from(words, samples.len(), &mut cursor.trigger_word, cursor.col) {
                TriggerSearch::Found(offset) => cursor.col = offset,
                TriggerSearch::NotFound => return false,
            }
        }
    }

    /// Mark the window full and hand it to the sink. Runs with the accumulator locked,
    /// so a resume cannot clear the window under the writer.
    fn complete_window(&self, acc: &WindowAccumulator) {
        *self.stats.filled_at.lock() = Some(Instant::now());
        self.gates.window_full.store(true, Ordering::SeqCst);
        self.stats.unwritten.store(true, Ordering::SeqCst);
        info!(
            rows = acc.persistence_size(),
            row_width = acc.window_size(),
            processed = self.stats.processed.load(Ordering::Relaxed),
            "window_full"
        );

        if let Err(e) = self.write_window(acc) {
            error!(error = %e, "window write failed, window kept for retry");
        }
    }

    fn write_window(&self, acc: &WindowAccumulator) -> Result<(), SinkError> {
        let started = Instant::now();
        let result =
            self.sink
                .lock()
                .write(acc.window(), acc.persistence_size(), acc.window_size());

        if let Err(e) = result {
            self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let now = Instant::now();
        *self.stats.written_at.lock() = Some(now);
        self.stats.unwritten.store(false, Ordering::SeqCst);
        self.stats.windows_written.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_duration(metric_names::SINK_WRITE, started.elapsed());
        if let Some(filled) = *self.stats.filled_at.lock() {
            self.metrics
                .record_duration(metric_names::WINDOW_FILL_TO_WRITE, now - filled);
        }
        info!(
            write_us = started.elapsed().as_micros() as u64,
            "window_written"
        );
        Ok(())
    }
}

/// Core loop: runs on the dedicated processor thread until the outer gate closes.
fn run_core_loop(shared: Arc<Shared>, mut acked: u64) {
    info!("core loop started");

    while shared.gates.running() {
        // Ticket before gate: an acknowledged request has already seen the closed gate.
        let ticket = shared.quiesce.pending();
        let copying = shared.gates.copying();
        if ticket != acked {
            shared.quiesce.acknowledge(ticket);
            acked = ticket;
        }

        if !copying {
            std::thread::sleep(shared.backoff);
            continue;
        }

        match shared.consumer.pop() {
            Some(handle) => shared.process_buffer(handle),
            None => std::thread::sleep(shared.backoff),
        }
    }

    shared.quiesce.worker_exited();
    info!(
        processed = shared.stats.processed.load(Ordering::Relaxed),
        "core loop exiting"
    );
}

/// Consumer stage of the acquisition pipeline.
pub struct Processor {
    shared: Arc<Shared>,
    // Lifecycle lock: holds the worker handle while the thread is live.
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_live: AtomicBool,
    state: StateMachine,
}

impl Processor {
    /// Build a processor over `consumer`. The copy gate starts closed.
    pub fn new(
        consumer: QueueConsumer,
        pool: Arc<BufferPool>,
        sink: Box<dyn WindowSink>,
        config: &ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let accumulator = WindowAccumulator::new(config.window_size, config.persistence_size)?;

        let shared = Arc::new(Shared {
            consumer,
            pool,
            gates: RunGates {
                running: AtomicBool::new(false),
                active: AtomicBool::new(false),
                window_full: AtomicBool::new(false),
            },
            accumulator: Mutex::new(accumulator),
            sink: Mutex::new(sink),
            stats: Stats::default(),
            quiesce: Quiesce::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            backoff: config.backoff(),
        });

        Ok(Self {
            shared,
            worker: Mutex::new(None),
            thread_live: AtomicBool::new(false),
            state: StateMachine::new(),
        })
    }

    /// Spawn the core loop thread.
    pub fn start(&self) -> Result<(), ProcessorError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            warn!("start requested while processor thread is live");
            return Err(LifecycleError::AlreadyRunning.into());
        }

        self.shared.gates.running.store(true, Ordering::SeqCst);
        let acked = self.shared.quiesce.arm();
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("scope-core".into())
            .spawn(move || run_core_loop(shared, acked))
            .map_err(|e| {
                self.shared.gates.running.store(false, Ordering::SeqCst);
                self.shared.quiesce.worker_exited();
                ProcessorError::Spawn(e)
            })?;

        *worker = Some(handle);
        self.thread_live.store(true, Ordering::SeqCst);
        let _ = self.state.transition(self.live_state());
        info!("created processor thread");
        Ok(())
    }

    /// Pause copying, close the outer gate and join the worker.
    pub fn stop(&self) -> Result<(), ProcessorError> {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            warn!("stop requested without a live processor thread");
            return Err(LifecycleError::NotRunning.into());
        };

        self.close_copy_gate();
        self.shared.gates.running.store(false, Ordering::SeqCst);
        let joined = handle.join();
        self.thread_live.store(false, Ordering::SeqCst);
        let _ = self.state.transition(ProcessorState::Stopped);

        if joined.is_err() {
            error!("processor thread panicked");
            return Err(ProcessorError::WorkerPanicked);
        }
        info!("destroyed processor thread");
        Ok(())
    }

    /// Close only the outer gate and wait for the worker to leave its loop.
    /// The state becomes `Stopped`; the thread stays joinable until `stop`.
    pub fn halt(&self) {
        let worker = self.worker.lock();
        self.shared.gates.running.store(false, Ordering::SeqCst);
        if worker.is_some() {
            self.shared.quiesce.wait_for_exit(self.shared.backoff * 10);
            let _ = self.state.transition(ProcessorState::Stopped);
        }
        info!("core loop halted");
    }

    /// Stop copying without tearing the thread down.
    pub fn pause(&self) {
        let _worker = self.worker.lock();
        self.close_copy_gate();
        if self.state().is_live() {
            let _ = self.state.transition(ProcessorState::Paused);
        }
    }

    /// Open the copy gate. A full window is cleared first so acquisition starts over.
    pub fn resume(&self) {
        let _worker = self.worker.lock();
        if self.shared.gates.window_full.load(Ordering::SeqCst) {
            let mut acc = self.shared.accumulator.lock();
            if self.shared.stats.unwritten.swap(false, Ordering::SeqCst) {
                warn!("discarding full window that was never written");
            }
            acc.clear();
            self.shared.gates.window_full.store(false, Ordering::SeqCst);
        }
        self.shared.gates.active.store(true, Ordering::SeqCst);
        if self.state().is_live() {
            let _ = self.state.transition(ProcessorState::Active);
        }
        info!("resumed processing");
    }

    /// Swap in a zeroed window of the new shape. Copying is paused and the worker
    /// is brought to a safe point first; the gate stays closed afterwards.
    pub fn reconfigure(
        &self,
        window_size: usize,
        persistence_size: usize,
    ) -> Result<(), ProcessorError> {
        let worker = self.worker.lock();
        self.close_copy_gate();
        if self.state().is_live() {
            let _ = self.state.transition(ProcessorState::Paused);
        }
        if worker.is_some() {
            let span = self.shared.metrics.span(metric_names::QUIESCE_WAIT);
            self.shared.quiesce.wait_for_worker(self.shared.backoff * 10);
            span.finish();
        }

        let mut acc = self.shared.accumulator.lock();
        acc.reset(window_size, persistence_size)?;
        self.shared.gates.window_full.store(false, Ordering::SeqCst);
        self.shared.stats.unwritten.store(false, Ordering::SeqCst);
        info!(window_size, persistence_size, "window reconfigured");
        Ok(())
    }

    /// Write the full window to the sink again (retry after a failed write).
    pub fn flush_window(&self) -> Result<(), ProcessorError> {
        let acc = self.shared.accumulator.lock();
        if !self.shared.gates.window_full.load(Ordering::SeqCst) {
            return Err(ProcessorError::WindowNotFull);
        }
        self.shared.write_window(&acc)?;
        Ok(())
    }

    fn close_copy_gate(&self) {
        self.shared.gates.active.store(false, Ordering::SeqCst);
        debug!("copy gate closed");
    }

    fn live_state(&self) -> ProcessorState {
        if self.shared.gates.active.load(Ordering::SeqCst) {
            ProcessorState::Active
        } else {
            ProcessorState::Paused
        }
    }

    // --- statistics and accessors ---

    pub fn processed_count(&self) -> u64 {
        self.shared.stats.processed.load(Ordering::Relaxed)
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_count() * self.shared.pool.buffer_len() as u64
    }

    pub fn clear_count(&self) {
        self.shared.stats.processed.store(0, Ordering::Relaxed);
    }

    /// Buffers that carried no trigger where a row had to start.
    pub fn untriggered_count(&self) -> u64 {
        self.shared.stats.untriggered.load(Ordering::Relaxed)
    }

    pub fn is_window_full(&self) -> bool {
        self.shared.gates.window_full.load(Ordering::SeqCst)
    }

    pub fn window_filled_time(&self) -> Option<Instant> {
        *self.shared.stats.filled_at.lock()
    }

    pub fn window_written_time(&self) -> Option<Instant> {
        *self.shared.stats.written_at.lock()
    }

    pub fn is_thread_live(&self) -> bool {
        self.thread_live.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ProcessorState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    /// Copy of the current window contents, row-major.
    pub fn window_snapshot(&self) -> Vec<Sample> {
        self.shared.accumulator.lock().window().to_vec()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.shared.metrics
    }

    pub fn stats(&self) -> StatsSnapshot {
        let (rows_filled, window_size, persistence_size) = {
            let acc = self.shared.accumulator.lock();
            (acc.row(), acc.window_size(), acc.persistence_size())
        };
        let stats = &self.shared.stats;
        let fill_to_write_us = match (*stats.filled_at.lock(), *stats.written_at.lock()) {
            (Some(filled), Some(written)) if written >= filled => {
                Some((written - filled).as_micros() as u64)
            }
            _ => None,
        };
        StatsSnapshot {
            state: self.state(),
            processed_buffers: self.processed_count(),
            processed_bytes: self.processed_bytes(),
            untriggered_buffers: self.untriggered_count(),
            windows_written: stats.windows_written.load(Ordering::Relaxed),
            sink_failures: stats.sink_failures.load(Ordering::Relaxed),
            window_full: self.is_window_full(),
            window_unwritten: stats.unwritten.load(Ordering::SeqCst),
            rows_filled,
            window_size,
            persistence_size,
            fill_to_write_us,
            pool_available: self.shared.pool.available(),
            pool_capacity: self.shared.pool.capacity(),
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        if self.is_thread_live() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "processor stop during drop failed");
            }
        }
        let _ = self.state.transition(ProcessorState::Destroyed);
    }
}
