//! Configuration consumed by [`FemtoBatchWriter`](crate::writer::FemtoBatchWriter).
//!
//! A [`WriterConfig`] is assembled up front (directly, through
//! [`BatchWriterBuilder`](crate::builder::BatchWriterBuilder), or from
//! [`WriterSettings`](crate::settings::WriterSettings)) and may be adjusted
//! through the writer's setters until the writer initializes. From then on
//! the configuration is frozen.

use std::sync::Arc;
use std::time::Duration;

use crate::batch::Markers;
use crate::error::WriterError;
use crate::loss_counter::DEFAULT_WARN_INTERVAL;
use crate::shutdown::{ProcessShutdown, ShutdownRegistry};
use crate::transmitter::{
    DEFAULT_ACCEPTED_STATUSES, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS,
    DEFAULT_REQUEST_TIMEOUT, RequestInitializer, Transmit,
};

/// Default bounded ingress queue capacity.
pub const DEFAULT_INGRESS_CAPACITY: usize = 1024;
/// Default number of records per batch.
pub const DEFAULT_BATCH_CAPACITY: usize = 100;
/// Default number of failed batches held for replay.
pub const DEFAULT_DEFERRED_CAPACITY: usize = 64;
/// Default size of the worker pool.
pub const DEFAULT_WORKER_COUNT: usize = 2;
/// Default interval after which a partial batch is flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of deferred batches the master replays per iteration.
pub const DEFAULT_REPLAY_CAP: usize = 8;

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(WriterError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok(())
        }
    }};
}

/// Complete description of a batch writer.
#[derive(Clone)]
pub struct WriterConfig {
    /// Bounded capacity of the queue producers write into.
    pub ingress_capacity: usize,
    /// Number of worker threads. Worker 0 is the master.
    pub worker_count: usize,
    /// Records per batch before a worker flushes.
    pub batch_capacity: usize,
    /// Failed batches held for replay before further failures are dropped.
    pub deferred_capacity: usize,
    /// Interval after which a partial batch is flushed.
    pub flush_interval: Duration,
    /// Byte markers framing each batch body.
    pub markers: Markers,
    /// Provider callback creating each outbound request.
    pub request_initializer: Option<RequestInitializer>,
    /// Deferred batches the master replays per iteration.
    pub replay_cap: usize,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Timeout for a complete request.
    pub request_timeout: Duration,
    /// Redirects followed before a response is classified.
    pub max_redirects: u32,
    /// Response statuses counted as success.
    pub accepted_statuses: Vec<u16>,
    /// Probe the endpoint during implicit initialization.
    pub probe_on_init: bool,
    /// Minimum interval between loss warnings.
    pub warn_interval: Duration,
    /// Registry notified once the writer has started.
    pub shutdown_registry: Arc<dyn ShutdownRegistry>,
    /// Replaces the HTTP transmitter, mainly for tests and custom transports.
    pub transmitter: Option<Arc<dyn Transmit>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            deferred_capacity: DEFAULT_DEFERRED_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            markers: Markers::default(),
            request_initializer: None,
            replay_cap: DEFAULT_REPLAY_CAP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            accepted_statuses: DEFAULT_ACCEPTED_STATUSES.to_vec(),
            probe_on_init: true,
            warn_interval: DEFAULT_WARN_INTERVAL,
            shutdown_registry: ProcessShutdown::global(),
            transmitter: None,
        }
    }
}

impl WriterConfig {
    /// Reject values the worker pool cannot run with.
    ///
    /// A missing request initializer is only an error when no custom
    /// transmitter is installed.
    pub fn validate(&self) -> Result<(), WriterError> {
        ensure_positive!(self.ingress_capacity, "ingress_capacity")?;
        ensure_positive!(self.worker_count, "worker_count")?;
        ensure_positive!(self.batch_capacity, "batch_capacity")?;
        ensure_positive!(self.deferred_capacity, "deferred_capacity")?;
        ensure_positive!(self.replay_cap, "replay_cap")?;
        if self.flush_interval.is_zero() {
            return Err(WriterError::InvalidConfig(
                "flush_interval must be greater than zero".into(),
            ));
        }
        if self.accepted_statuses.is_empty() {
            return Err(WriterError::InvalidConfig(
                "accepted_statuses must not be empty".into(),
            ));
        }
        if self.request_initializer.is_none() && self.transmitter.is_none() {
            return Err(WriterError::InvalidConfig(
                "no request initializer configured".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterConfig")
            .field("ingress_capacity", &self.ingress_capacity)
            .field("worker_count", &self.worker_count)
            .field("batch_capacity", &self.batch_capacity)
            .field("deferred_capacity", &self.deferred_capacity)
            .field("flush_interval", &self.flush_interval)
            .field("markers", &self.markers)
            .field("has_request_initializer", &self.request_initializer.is_some())
            .field("replay_cap", &self.replay_cap)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_redirects", &self.max_redirects)
            .field("accepted_statuses", &self.accepted_statuses)
            .field("probe_on_init", &self.probe_on_init)
            .field("custom_transmitter", &self.transmitter.is_some())
            .finish()
    }
}
