//! Non-blocking batching uploader for pre-encoded log records.
//!
//! Producers call [`FemtoBatchWriter::write`] with already encoded bytes. A
//! fixed pool of worker threads drains the bounded ingress queue into
//! marker-delimited batches and POSTs each batch to an ingestion endpoint.
//! Batches that fail to send are held in a bounded deferred queue and
//! replayed by the master worker once the endpoint recovers.
//!
//! ```no_run
//! use femtobatch::{Endpoint, FemtoBatchWriter, Markers};
//!
//! let writer = FemtoBatchWriter::builder()
//!     .with_endpoint(Endpoint::new("https://logs.example.com/ingest").with_bearer_token("t"))
//!     .with_markers(Markers::json_array())
//!     .build()?;
//! writer.write(br#"{"msg":"hello"}"#)?;
//! femtobatch::run_shutdown_hooks();
//! # Ok::<(), femtobatch::WriterError>(())
//! ```

pub mod batch;
pub mod builder;
pub mod config;
pub mod deferred;
pub mod error;
pub mod lifecycle;
pub mod loss_counter;
pub mod provider;
pub mod settings;
pub mod shutdown;
pub mod transmitter;
mod worker;
pub mod writer;

pub use batch::Markers;
pub use builder::BatchWriterBuilder;
pub use config::WriterConfig;
pub use error::{TransmitError, WriterError};
pub use lifecycle::WriterState;
pub use provider::{AuthConfig, Endpoint};
pub use settings::{SettingsError, WriterSettings};
pub use shutdown::{
    HookId, ProcessShutdown, ShutdownHook, ShutdownRegistry, run_shutdown_hooks,
};
pub use transmitter::{HttpTransmitter, RequestCallback, RequestInitializer, Transmit};
pub use writer::{FemtoBatchWriter, WriterStats};
