//! Bounded holding area for batches that failed to send.
//!
//! Pushes never block: when the queue is full the batch is dropped and its
//! records are added to the [`LossCounter`]. Replay is driven by the master
//! worker, and by the shutdown coordinator for the final drain, with an
//! explicit [`ReplayMode`].

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::warn;

use crate::error::TransmitError;
use crate::loss_counter::LossCounter;
use crate::transmitter::Transmit;

/// Immutable copy of a batch body that could not be delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredBatch {
    body: Box<[u8]>,
    records: usize,
}

impl DeferredBatch {
    /// Copy `body` so the originating buffer can be reused immediately.
    pub fn copy_of(body: &[u8], records: usize) -> Self {
        Self {
            body: body.into(),
            records,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Records contained in the batch.
    pub fn records(&self) -> usize {
        self.records
    }
}

/// How many deferred batches a single replay may attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayMode {
    /// Regular worker iteration.
    Capped(usize),
    /// Final drain during shutdown.
    Unbounded,
}

impl ReplayMode {
    fn allows(self, attempted: usize) -> bool {
        match self {
            Self::Capped(cap) => attempted < cap,
            Self::Unbounded => true,
        }
    }
}

/// Result of one replay pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Batches delivered during the pass.
    pub sent: usize,
    /// Failure that stopped the pass, if any.
    pub failure: Option<TransmitError>,
}

/// Fixed-capacity queue of [`DeferredBatch`] values shared by all workers.
#[derive(Clone, Debug)]
pub struct DeferredQueue {
    tx: Sender<DeferredBatch>,
    rx: Receiver<DeferredBatch>,
}

impl DeferredQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Queue `batch` for replay. Returns `false` if it was dropped.
    pub fn push(&self, batch: DeferredBatch, losses: &LossCounter) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) | Err(TrySendError::Disconnected(batch)) => {
                losses.record(batch.records() as u64);
                losses.warn_if_due(|count| {
                    warn!("FemtoBatchWriter deferred queue full; dropped {count} records");
                });
                false
            }
        }
    }

    pub fn pop(&self) -> Option<DeferredBatch> {
        self.rx.try_recv().ok()
    }

    /// Batches currently waiting for replay.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Resend deferred batches in FIFO order.
    ///
    /// Stops at the first failure; the failed batch is pushed back (or
    /// dropped and counted if the queue has filled up meanwhile).
    pub fn replay(
        &self,
        mode: ReplayMode,
        transmitter: &dyn Transmit,
        losses: &LossCounter,
    ) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::default();
        let mut attempted = 0;
        while mode.allows(attempted) {
            let Some(batch) = self.pop() else {
                break;
            };
            attempted += 1;
            match transmitter.transmit(batch.body(), &[]) {
                Ok(()) => outcome.sent += 1,
                Err(err) => {
                    self.push(batch, losses);
                    outcome.failure = Some(err);
                    break;
                }
            }
        }
        outcome
    }

    /// Drop everything still queued, counting the records as lost.
    pub fn discard_all(&self, losses: &LossCounter) -> u64 {
        let mut discarded = 0;
        while let Some(batch) = self.pop() {
            discarded += batch.records() as u64;
        }
        losses.record(discarded);
        discarded
    }
}
