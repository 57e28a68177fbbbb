//! Producer-facing batch writer.
//!
//! [`FemtoBatchWriter::write`] never blocks: it performs a single
//! non-blocking enqueue onto the bounded ingress queue and returns. The
//! first call (or an explicit [`ping`](FemtoBatchWriter::ping)) initializes
//! the writer on the calling thread: it validates configuration, optionally
//! probes the endpoint, spawns the worker pool and registers a shutdown
//! hook. Configuration setters only take effect before that point.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{TrySendError, bounded};
use log::{debug, error, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::batch::{Markers, empty_body};
use crate::builder::BatchWriterBuilder;
use crate::config::WriterConfig;
use crate::deferred::DeferredQueue;
use crate::error::WriterError;
use crate::lifecycle::{Lifecycle, WriterState};
use crate::loss_counter::LossCounter;
use crate::provider::Endpoint;
use crate::shutdown::{self, HookId, ShutdownRegistry};
use crate::transmitter::{HttpTransmitter, RequestCallback, RequestInitializer, Transmit};
use crate::worker::{CancelSignal, WorkerContext, WorkerPool};

#[derive(Clone, Copy)]
enum Probe<'a> {
    /// Triggered by the first write; probing depends on `probe_on_init`.
    Implicit,
    /// Triggered by `ping`; always probes with the given callbacks.
    Explicit(&'a [RequestCallback]),
}

/// Point-in-time view of a writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterStats {
    pub state: WriterState,
    /// Records discarded since the writer was created.
    pub lost_records: u64,
    /// Records waiting in the ingress queue.
    pub queued_records: usize,
    /// Failed batches waiting for replay.
    pub deferred_batches: usize,
}

struct Shared {
    lifecycle: Arc<Lifecycle>,
    config: Mutex<WriterConfig>,
    losses: Arc<LossCounter>,
    pool: OnceCell<WorkerPool>,
    transmitter: OnceCell<Arc<dyn Transmit>>,
    hook: OnceCell<(Arc<dyn ShutdownRegistry>, HookId)>,
}

impl Shared {
    fn shutdown(&self) {
        let prev = self.lifecycle.finally_disable();
        match self.pool.get() {
            Some(pool) => shutdown::coordinate(pool),
            None if prev != WriterState::FinallyDisabled => {
                debug!("FemtoBatchWriter disabled before initialization");
            }
            None => {}
        }
        if let Some((registry, id)) = self.hook.get() {
            registry.deregister(*id);
        }
    }
}

/// Non-blocking batching uploader for pre-encoded records.
pub struct FemtoBatchWriter {
    shared: Arc<Shared>,
}

impl Default for FemtoBatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FemtoBatchWriter {
    /// Create a writer with default configuration. A request initializer
    /// must be installed before the first write.
    pub fn new() -> Self {
        Self::with_config(WriterConfig::default())
    }

    /// Create a writer from a configuration object.
    pub fn with_config(config: WriterConfig) -> Self {
        let losses = Arc::new(LossCounter::new(config.warn_interval));
        Self {
            shared: Arc::new(Shared {
                lifecycle: Arc::new(Lifecycle::new()),
                config: Mutex::new(config),
                losses,
                pool: OnceCell::new(),
                transmitter: OnceCell::new(),
                hook: OnceCell::new(),
            }),
        }
    }

    pub fn builder() -> BatchWriterBuilder {
        BatchWriterBuilder::new()
    }

    /// Queue one encoded record for upload.
    ///
    /// Returns the record length on success.
    ///
    /// # Errors
    ///
    /// * [`WriterError::Disabled`] - the writer is permanently disabled; no
    ///   queue attempt was made.
    /// * [`WriterError::BufferFull`] - the ingress queue is full; the record
    ///   was dropped and counted as lost.
    /// * [`WriterError::InvalidConfig`] / [`WriterError::Unreachable`] - the
    ///   implicit initialization failed and the writer is now disabled.
    pub fn write(&self, record: &[u8]) -> Result<usize, WriterError> {
        match self.shared.lifecycle.load() {
            WriterState::Ready | WriterState::TemporarilyDisabled => {}
            WriterState::FinallyDisabled => return Err(WriterError::Disabled),
            WriterState::NotInitialized | WriterState::Initializing => {
                self.initialize(Probe::Implicit)?;
            }
        }
        let Some(pool) = self.shared.pool.get() else {
            return Err(WriterError::Disabled);
        };
        self.enqueue(pool, record)
    }

    fn enqueue(&self, pool: &WorkerPool, record: &[u8]) -> Result<usize, WriterError> {
        match pool.sender().try_send(record.to_vec()) {
            Ok(()) if self.shared.lifecycle.load() == WriterState::FinallyDisabled => {
                // Shutdown may already have swept the queue. Anything still
                // there will never be sent, so take one record back and count
                // it; if the queue is empty a worker got there first.
                if pool.context().ingress.try_recv().is_err() {
                    return Ok(record.len());
                }
                self.shared.losses.record(1);
                Err(WriterError::Disabled)
            }
            Ok(()) => Ok(record.len()),
            Err(TrySendError::Full(_)) => {
                self.shared.losses.record(1);
                self.shared.losses.warn_if_due(|count| {
                    warn!("FemtoBatchWriter ingress queue full; dropped {count} records");
                });
                Err(WriterError::BufferFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(WriterError::Disabled),
        }
    }

    /// Probe the endpoint with an empty batch.
    ///
    /// Before the first write this also initializes the writer. If the
    /// probe fails the writer stays uninitialized so it can be reconfigured;
    /// configuration errors remain fatal.
    pub fn ping(&self, extra: &[RequestCallback]) -> Result<(), WriterError> {
        self.initialize(Probe::Explicit(extra))
    }

    /// Disable the writer and drain pending work. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn state(&self) -> WriterState {
        self.shared.lifecycle.load()
    }

    /// Records discarded since the writer was created.
    pub fn lost_records(&self) -> u64 {
        self.shared.losses.total()
    }

    pub fn stats(&self) -> WriterStats {
        let (queued_records, deferred_batches) = self
            .shared
            .pool
            .get()
            .map(|pool| {
                let ctx = pool.context();
                (ctx.ingress.len(), ctx.deferred.len())
            })
            .unwrap_or((0, 0));
        WriterStats {
            state: self.state(),
            lost_records: self.lost_records(),
            queued_records,
            deferred_batches,
        }
    }

    fn initialize(&self, probe: Probe<'_>) -> Result<(), WriterError> {
        let lifecycle = &self.shared.lifecycle;
        match lifecycle.load() {
            state if state.is_running() => return self.probe_running(probe),
            WriterState::FinallyDisabled => return Err(WriterError::Disabled),
            _ => {}
        }

        let gate = lifecycle.gate();
        if !lifecycle.transition(WriterState::NotInitialized, WriterState::Initializing) {
            drop(gate);
            return match lifecycle.load() {
                state if state.is_running() => self.probe_running(probe),
                _ => Err(WriterError::Disabled),
            };
        }

        let config = self.shared.config.lock().clone();
        match self.start(&config, probe) {
            Ok(()) => {
                lifecycle.store_locked(&gate, WriterState::Ready);
                Ok(())
            }
            Err(err @ WriterError::Unreachable(_)) if matches!(probe, Probe::Explicit(_)) => {
                warn!("FemtoBatchWriter ping failed: {err}");
                lifecycle.store_locked(&gate, WriterState::NotInitialized);
                Err(err)
            }
            Err(err) => {
                error!("FemtoBatchWriter initialization failed: {err}");
                lifecycle.store_locked(&gate, WriterState::FinallyDisabled);
                Err(err)
            }
        }
    }

    /// Validate, probe, spawn workers and register the shutdown hook.
    fn start(&self, config: &WriterConfig, probe: Probe<'_>) -> Result<(), WriterError> {
        config.validate()?;
        let transmitter = build_transmitter(config)?;

        let probe_with = match probe {
            Probe::Explicit(extra) => Some(extra),
            Probe::Implicit if config.probe_on_init => Some(&[][..]),
            Probe::Implicit => None,
        };
        if let Some(extra) = probe_with {
            transmitter.transmit(&empty_body(&config.markers), extra)?;
        }

        let (tx, rx) = bounded(config.ingress_capacity);
        let ctx = WorkerContext {
            ingress: rx,
            cancel: CancelSignal::new(),
            transmitter: Arc::clone(&transmitter),
            deferred: DeferredQueue::new(config.deferred_capacity),
            lifecycle: Arc::clone(&self.shared.lifecycle),
            losses: Arc::clone(&self.shared.losses),
            markers: Arc::new(config.markers.clone()),
            batch_capacity: config.batch_capacity,
            flush_interval: config.flush_interval,
            replay_cap: config.replay_cap,
        };
        let pool = WorkerPool::spawn(config.worker_count, tx, ctx)?;
        // Only the gate holder that won the NotInitialized -> Initializing
        // transition reaches this point, so both cells are still empty.
        let _ = self.shared.pool.set(pool);
        let _ = self.shared.transmitter.set(transmitter);

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let id = config.shutdown_registry.register(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.shutdown();
            }
        }));
        let _ = self
            .shared
            .hook
            .set((Arc::clone(&config.shutdown_registry), id));
        debug!(
            "FemtoBatchWriter started {} workers (batch capacity {}, flush interval {:?})",
            config.worker_count, config.batch_capacity, config.flush_interval
        );
        Ok(())
    }

    fn probe_running(&self, probe: Probe<'_>) -> Result<(), WriterError> {
        let Probe::Explicit(extra) = probe else {
            return Ok(());
        };
        let Some(transmitter) = self.shared.transmitter.get() else {
            return Err(WriterError::Disabled);
        };
        let body = empty_body(&self.shared.config.lock().markers);
        transmitter.transmit(&body, extra)?;
        Ok(())
    }

    /// Apply `update` if the writer has not started yet.
    fn configure(&self, field: &str, update: impl FnOnce(&mut WriterConfig)) -> bool {
        let _gate = self.shared.lifecycle.gate();
        if self.shared.lifecycle.load() != WriterState::NotInitialized {
            debug!("FemtoBatchWriter ignoring {field} update after initialization");
            return false;
        }
        let mut config = self.shared.config.lock();
        update(&mut config);
        true
    }

    /// Set the bounded ingress queue capacity.
    pub fn set_ingress_capacity(&self, capacity: usize) -> bool {
        self.configure("ingress_capacity", |c| c.ingress_capacity = capacity)
    }

    /// Set the number of worker threads.
    pub fn set_worker_count(&self, count: usize) -> bool {
        self.configure("worker_count", |c| c.worker_count = count)
    }

    /// Set the number of records per batch.
    pub fn set_batch_capacity(&self, capacity: usize) -> bool {
        self.configure("batch_capacity", |c| c.batch_capacity = capacity)
    }

    /// Set the number of failed batches held for replay.
    pub fn set_deferred_capacity(&self, capacity: usize) -> bool {
        self.configure("deferred_capacity", |c| c.deferred_capacity = capacity)
    }

    pub fn set_flush_interval(&self, interval: Duration) -> bool {
        self.configure("flush_interval", |c| c.flush_interval = interval)
    }

    pub fn set_markers(&self, markers: Markers) -> bool {
        self.configure("markers", |c| c.markers = markers)
    }

    pub fn set_replay_cap(&self, cap: usize) -> bool {
        self.configure("replay_cap", |c| c.replay_cap = cap)
    }

    /// Install the provider callback creating each request.
    pub fn set_request_initializer(&self, initializer: RequestInitializer) -> bool {
        self.configure("request_initializer", |c| {
            c.request_initializer = Some(initializer)
        })
    }

    /// Shorthand for installing an [`Endpoint`] as the request initializer.
    pub fn set_endpoint(&self, endpoint: Endpoint) -> bool {
        self.set_request_initializer(endpoint.into_initializer())
    }

    /// Replace the HTTP transmitter.
    pub fn set_transmitter(&self, transmitter: Arc<dyn Transmit>) -> bool {
        self.configure("transmitter", |c| c.transmitter = Some(transmitter))
    }

    pub fn set_shutdown_registry(&self, registry: Arc<dyn ShutdownRegistry>) -> bool {
        self.configure("shutdown_registry", |c| c.shutdown_registry = registry)
    }

    pub fn set_probe_on_init(&self, probe: bool) -> bool {
        self.configure("probe_on_init", |c| c.probe_on_init = probe)
    }
}

fn build_transmitter(config: &WriterConfig) -> Result<Arc<dyn Transmit>, WriterError> {
    if let Some(transmitter) = &config.transmitter {
        return Ok(Arc::clone(transmitter));
    }
    let Some(initializer) = &config.request_initializer else {
        return Err(WriterError::InvalidConfig(
            "no request initializer configured".into(),
        ));
    };
    Ok(Arc::new(HttpTransmitter::new(config, Arc::clone(initializer))?))
}

impl Drop for FemtoBatchWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FemtoBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemtoBatchWriter")
            .field("state", &self.state())
            .field("lost_records", &self.lost_records())
            .finish()
    }
}
