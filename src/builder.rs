//! Builder for [`FemtoBatchWriter`](crate::writer::FemtoBatchWriter).
//!
//! Unset options fall back to the defaults in [`crate::config`]. Validation
//! happens in [`BatchWriterBuilder::build`] so misconfiguration surfaces
//! before any thread is spawned.

use std::sync::Arc;
use std::time::Duration;

use crate::batch::Markers;
use crate::config::WriterConfig;
use crate::error::WriterError;
use crate::provider::Endpoint;
use crate::shutdown::ShutdownRegistry;
use crate::transmitter::{RequestInitializer, Transmit};
use crate::writer::FemtoBatchWriter;

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`FemtoBatchWriter`] instances.
#[derive(Clone, Default)]
pub struct BatchWriterBuilder {
    ingress_capacity: Option<usize>,
    worker_count: Option<usize>,
    batch_capacity: Option<usize>,
    deferred_capacity: Option<usize>,
    flush_interval: Option<Duration>,
    markers: Option<Markers>,
    request_initializer: Option<RequestInitializer>,
    replay_cap: Option<usize>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_redirects: Option<u32>,
    accepted_statuses: Option<Vec<u16>>,
    probe_on_init: Option<bool>,
    warn_interval: Option<Duration>,
    shutdown_registry: Option<Arc<dyn ShutdownRegistry>>,
    transmitter: Option<Arc<dyn Transmit>>,
}

impl BatchWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        #[doc = "Set the bounded ingress queue capacity."]
        with_ingress_capacity,
        ingress_capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the number of worker threads."]
        with_worker_count,
        worker_count,
        usize
    );
    option_setter!(
        #[doc = "Set the number of records per batch."]
        with_batch_capacity,
        batch_capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the number of failed batches held for replay."]
        with_deferred_capacity,
        deferred_capacity,
        usize
    );
    option_setter!(with_flush_interval, flush_interval, Duration);
    option_setter!(with_markers, markers, Markers);
    option_setter!(
        #[doc = "Set the deferred batches replayed per master iteration."]
        with_replay_cap,
        replay_cap,
        usize
    );
    option_setter!(with_connect_timeout, connect_timeout, Duration);
    option_setter!(with_request_timeout, request_timeout, Duration);
    option_setter!(with_max_redirects, max_redirects, u32);
    option_setter!(
        #[doc = "Replace the set of statuses counted as success."]
        with_accepted_statuses,
        accepted_statuses,
        Vec<u16>
    );
    option_setter!(
        #[doc = "Probe the endpoint when the first write initializes the writer."]
        with_probe_on_init,
        probe_on_init,
        bool
    );
    option_setter!(with_warn_interval, warn_interval, Duration);
    option_setter!(
        #[doc = "Install the provider callback creating each request."]
        with_request_initializer,
        request_initializer,
        RequestInitializer
    );
    option_setter!(with_shutdown_registry, shutdown_registry, Arc<dyn ShutdownRegistry>);
    option_setter!(
        #[doc = "Replace the HTTP transmitter."]
        with_transmitter,
        transmitter,
        Arc<dyn Transmit>
    );

    /// Target a fixed endpoint.
    pub fn with_endpoint(self, endpoint: Endpoint) -> Self {
        self.with_request_initializer(endpoint.into_initializer())
    }

    /// Resolve defaults and validate.
    pub fn build_config(&self) -> Result<WriterConfig, WriterError> {
        let defaults = WriterConfig::default();
        let config = WriterConfig {
            ingress_capacity: self.ingress_capacity.unwrap_or(defaults.ingress_capacity),
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            batch_capacity: self.batch_capacity.unwrap_or(defaults.batch_capacity),
            deferred_capacity: self.deferred_capacity.unwrap_or(defaults.deferred_capacity),
            flush_interval: self.flush_interval.unwrap_or(defaults.flush_interval),
            markers: self.markers.clone().unwrap_or(defaults.markers),
            request_initializer: self.request_initializer.clone(),
            replay_cap: self.replay_cap.unwrap_or(defaults.replay_cap),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_redirects: self.max_redirects.unwrap_or(defaults.max_redirects),
            accepted_statuses: self
                .accepted_statuses
                .clone()
                .unwrap_or(defaults.accepted_statuses),
            probe_on_init: self.probe_on_init.unwrap_or(defaults.probe_on_init),
            warn_interval: self.warn_interval.unwrap_or(defaults.warn_interval),
            shutdown_registry: self
                .shutdown_registry
                .clone()
                .unwrap_or(defaults.shutdown_registry),
            transmitter: self.transmitter.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the writer. No threads are spawned until the first write or
    /// ping.
    pub fn build(&self) -> Result<FemtoBatchWriter, WriterError> {
        Ok(FemtoBatchWriter::with_config(self.build_config()?))
    }
}

impl std::fmt::Debug for BatchWriterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriterBuilder")
            .field("ingress_capacity", &self.ingress_capacity)
            .field("worker_count", &self.worker_count)
            .field("batch_capacity", &self.batch_capacity)
            .field("deferred_capacity", &self.deferred_capacity)
            .field("flush_interval", &self.flush_interval)
            .field("markers", &self.markers)
            .field("has_request_initializer", &self.request_initializer.is_some())
            .finish_non_exhaustive()
    }
}
