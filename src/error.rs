//! Error types surfaced by the batch writer.
//!
//! Producers only ever see [`WriterError`]. Remote failures are described by
//! [`TransmitError`] and stay inside the worker pool, where they are logged
//! and fed into the retry state machine.

use thiserror::Error;

/// Errors returned to callers of
/// [`FemtoBatchWriter`](crate::writer::FemtoBatchWriter).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriterError {
    /// The writer has been permanently disabled.
    #[error("batch writer is disabled")]
    Disabled,
    /// The ingress queue is at capacity; the record was dropped.
    #[error("batch writer buffer is full")]
    BufferFull,
    /// Invalid user supplied configuration.
    #[error("invalid batch writer configuration: {0}")]
    InvalidConfig(String),
    /// The connectivity probe failed.
    #[error("ingestion endpoint unreachable: {0}")]
    Unreachable(#[from] TransmitError),
}

/// Classified failure of a single outbound batch request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// The endpoint answered with a status outside the accepted set.
    #[error("endpoint returned status {0}")]
    Status(u16),
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl TransmitError {
    /// Status code carried by the error, if the endpoint responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Transport(_) => None,
        }
    }
}
