//! Worker threads draining the ingress queue into batches.
//!
//! Every worker owns a private [`BatchBuffer`] and waits on three event
//! sources with `select!`: a new record, its flush ticker, and the shared
//! cancellation signal. Worker 0 is the master: it is the only worker that
//! probes a failing endpoint and moves the writer back to
//! [`WriterState::Ready`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::batch::{BatchBuffer, Markers};
use crate::deferred::{DeferredBatch, DeferredQueue, ReplayMode};
use crate::error::WriterError;
use crate::lifecycle::{Lifecycle, WriterState};
use crate::loss_counter::LossCounter;
use crate::transmitter::Transmit;

/// Broadcast cancellation shared by all workers.
///
/// Cancelling drops the only sender, which wakes every receiver blocked in
/// `select!` at once.
pub(crate) struct CancelSignal {
    trigger: Mutex<Option<Sender<()>>>,
    observer: Receiver<()>,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            observer: rx,
        }
    }

    pub(crate) fn cancel(&self) {
        self.trigger.lock().take();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.trigger.lock().is_none()
    }

    fn observer(&self) -> &Receiver<()> {
        &self.observer
    }
}

/// State shared between all workers of one writer.
pub(crate) struct WorkerContext {
    pub(crate) ingress: Receiver<Vec<u8>>,
    pub(crate) cancel: CancelSignal,
    pub(crate) transmitter: Arc<dyn Transmit>,
    pub(crate) deferred: DeferredQueue,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) losses: Arc<LossCounter>,
    pub(crate) markers: Arc<Markers>,
    pub(crate) batch_capacity: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) replay_cap: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
}

pub(crate) struct Worker {
    index: usize,
    master: bool,
    buffer: BatchBuffer,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub(crate) fn new(index: usize, ctx: Arc<WorkerContext>) -> Self {
        let buffer = BatchBuffer::new(ctx.batch_capacity, Arc::clone(&ctx.markers));
        Self {
            index,
            master: index == 0,
            buffer,
            ctx,
        }
    }

    pub(crate) fn run(mut self) {
        let ctx = Arc::clone(&self.ctx);
        let ticker = tick(ctx.flush_interval);
        loop {
            select! {
                recv(ctx.ingress) -> msg => match msg {
                    Ok(record) => self.accept(&record),
                    Err(_) => {
                        self.finish();
                        break;
                    }
                },
                recv(ticker) -> _ => self.on_tick(),
                recv(ctx.cancel.observer()) -> _ => {
                    self.finish();
                    break;
                }
            }
        }
        debug!("FemtoBatchWriter worker {} exited", self.index);
    }

    fn accept(&mut self, record: &[u8]) {
        if self.buffer.push(record) {
            self.flush(Phase::Running);
        }
    }

    fn on_tick(&mut self) {
        if !self.buffer.is_empty() {
            self.flush(Phase::Running);
        } else if self.master && !self.ctx.deferred.is_empty() {
            self.replay(ReplayMode::Capped(self.ctx.replay_cap));
        }
    }

    /// Move whatever is still queued into batches and flush them.
    pub(crate) fn finish(&mut self) {
        while let Ok(record) = self.ctx.ingress.try_recv() {
            if self.buffer.push(&record) {
                self.flush(Phase::Draining);
            }
        }
        self.flush(Phase::Draining);
    }

    fn flush(&mut self, phase: Phase) {
        let Some(records) = self.buffer.seal() else {
            return;
        };
        let disabled = self.ctx.lifecycle.load() == WriterState::TemporarilyDisabled;
        if !self.master && phase == Phase::Running && disabled {
            self.defer_current(records);
        } else {
            match self.ctx.transmitter.transmit(self.buffer.as_bytes(), &[]) {
                Ok(()) => {
                    if self.master {
                        self.on_master_success(phase);
                    }
                }
                Err(err) => {
                    warn!(
                        "FemtoBatchWriter worker {} failed to send {records} records: {err}",
                        self.index
                    );
                    self.ctx
                        .lifecycle
                        .transition(WriterState::Ready, WriterState::TemporarilyDisabled);
                    self.defer_current(records);
                }
            }
        }
        self.buffer.reset();
    }

    fn defer_current(&self, records: usize) {
        let batch = DeferredBatch::copy_of(self.buffer.as_bytes(), records);
        self.ctx.deferred.push(batch, &self.ctx.losses);
    }

    fn on_master_success(&self, phase: Phase) {
        self.ctx
            .lifecycle
            .transition(WriterState::TemporarilyDisabled, WriterState::Ready);
        let mode = match phase {
            Phase::Running => ReplayMode::Capped(self.ctx.replay_cap),
            Phase::Draining => ReplayMode::Unbounded,
        };
        if !self.ctx.deferred.is_empty() {
            self.replay(mode);
        }
    }

    /// Resend deferred batches. Only ever called on the master.
    pub(crate) fn replay(&self, mode: ReplayMode) {
        let outcome = self
            .ctx
            .deferred
            .replay(mode, self.ctx.transmitter.as_ref(), &self.ctx.losses);
        if outcome.sent > 0 {
            debug!("FemtoBatchWriter replayed {} deferred batches", outcome.sent);
            self.ctx
                .lifecycle
                .transition(WriterState::TemporarilyDisabled, WriterState::Ready);
        }
        if let Some(err) = outcome.failure {
            warn!("FemtoBatchWriter deferred replay failed: {err}");
            self.ctx
                .lifecycle
                .transition(WriterState::Ready, WriterState::TemporarilyDisabled);
        }
    }
}

/// Running worker threads plus the producer side of the ingress queue.
pub(crate) struct WorkerPool {
    ingress: Sender<Vec<u8>>,
    ctx: Arc<WorkerContext>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: Mutex<bool>,
}

impl WorkerPool {
    /// Spawn `count` workers consuming the queue fed by `ingress`.
    pub(crate) fn spawn(
        count: usize,
        ingress: Sender<Vec<u8>>,
        ctx: WorkerContext,
    ) -> Result<Self, WriterError> {
        let pool = Self {
            ingress,
            ctx: Arc::new(ctx),
            handles: Mutex::new(Vec::with_capacity(count)),
            stopped: Mutex::new(false),
        };
        for index in 0..count {
            let worker = Worker::new(index, Arc::clone(&pool.ctx));
            let spawned = thread::Builder::new()
                .name(format!("femtobatch-worker-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => pool.handles.lock().push(handle),
                Err(err) => {
                    pool.cancel();
                    pool.join();
                    return Err(WriterError::InvalidConfig(format!(
                        "failed to spawn worker {index}: {err}"
                    )));
                }
            }
        }
        Ok(pool)
    }

    pub(crate) fn sender(&self) -> &Sender<Vec<u8>> {
        &self.ingress
    }

    pub(crate) fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    pub(crate) fn cancel(&self) {
        if !self.ctx.cancel.is_cancelled() {
            debug!("FemtoBatchWriter cancelling {} workers", self.handles.lock().len());
        }
        self.ctx.cancel.cancel();
    }

    /// Set once the shutdown coordinator has drained the pool.
    pub(crate) fn stopped(&self) -> &Mutex<bool> {
        &self.stopped
    }

    /// Wait for every worker to exit. Returns how many were joined.
    pub(crate) fn join(&self) -> usize {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("FemtoBatchWriter: worker thread panicked");
            }
        }
        joined
    }
}
