//! Writer lifecycle state machine.
//!
//! The state lives in an `AtomicU8` so the producer fast path is a single
//! load. Slow paths (initialization, final disabling, configuration updates)
//! additionally serialise on [`Lifecycle::gate`] so a shutdown can never
//! interleave with an initialization in flight.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use log::debug;
use parking_lot::{Mutex, MutexGuard};

/// Observable lifecycle of a batch writer.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriterState {
    /// Nothing has been spawned yet; configuration may still change.
    NotInitialized = 0,
    /// One thread is validating configuration and spawning workers.
    Initializing = 1,
    /// Workers are running and the endpoint is believed reachable.
    Ready = 2,
    /// A send failed; only the master worker probes the endpoint.
    TemporarilyDisabled = 3,
    /// Terminal. Every operation fails without I/O.
    FinallyDisabled = 4,
}

impl WriterState {
    /// Whether workers are running and accepting records.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Ready | Self::TemporarilyDisabled)
    }
}

impl From<u8> for WriterState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NotInitialized,
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::TemporarilyDisabled,
            _ => Self::FinallyDisabled,
        }
    }
}

impl From<WriterState> for u8 {
    fn from(state: WriterState) -> Self {
        state as u8
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInitialized => "not-initialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::TemporarilyDisabled => "temporarily-disabled",
            Self::FinallyDisabled => "finally-disabled",
        };
        f.write_str(name)
    }
}

/// State holder owned by a single writer instance.
pub struct Lifecycle {
    state: AtomicU8,
    gate: Mutex<()>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WriterState::NotInitialized.into()),
            gate: Mutex::new(()),
        }
    }

    /// Current state. Never blocks.
    pub fn load(&self) -> WriterState {
        WriterState::from(self.state.load(Ordering::Acquire))
    }

    /// Atomically move from `from` to `to`. Returns `false` if the state was
    /// not `from`.
    pub fn transition(&self, from: WriterState, to: WriterState) -> bool {
        let moved = self
            .state
            .compare_exchange(from.into(), to.into(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!("FemtoBatchWriter state {from} -> {to}");
        }
        moved
    }

    /// Acquire the serialising lock guarding initialization and disabling.
    pub fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock()
    }

    /// Overwrite the state. Callers must hold [`Lifecycle::gate`].
    pub(crate) fn store_locked(&self, _gate: &MutexGuard<'_, ()>, state: WriterState) {
        let prev = WriterState::from(self.state.swap(state.into(), Ordering::AcqRel));
        if prev != state {
            debug!("FemtoBatchWriter state {prev} -> {state}");
        }
    }

    /// Enter the terminal state, waiting for any initialization in flight.
    ///
    /// Returns the state that was replaced.
    pub fn finally_disable(&self) -> WriterState {
        let gate = self.gate();
        let prev = self.load();
        self.store_locked(&gate, WriterState::FinallyDisabled);
        prev
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.load())
            .finish()
    }
}
