//! Scriptable in-memory transmitter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use femtobatch::{RequestCallback, TransmitError, Transmit};
use parking_lot::Mutex;

/// What the next transmit attempt does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Fail,
    /// Block until [`RecordingTransmitter::release`], then succeed.
    Hold,
}

pub struct RecordingTransmitter {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delivered: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    entered_tx: Sender<usize>,
    entered_rx: Receiver<usize>,
    hold_tx: Mutex<Option<Sender<()>>>,
    hold_rx: Receiver<()>,
}

impl RecordingTransmitter {
    pub fn healthy() -> Self {
        Self::scripted(Vec::new(), Step::Succeed)
    }

    pub fn failing() -> Self {
        Self::scripted(Vec::new(), Step::Fail)
    }

    /// Follow `steps` in order, then behave like `fallback`.
    pub fn scripted(steps: Vec<Step>, fallback: Step) -> Self {
        let (entered_tx, entered_rx) = unbounded();
        let (hold_tx, hold_rx) = bounded(0);
        Self {
            script: Mutex::new(steps.into()),
            fallback,
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            entered_tx,
            entered_rx,
            hold_tx: Mutex::new(Some(hold_tx)),
            hold_rx,
        }
    }

    /// Unblock every held attempt, present and future.
    pub fn release(&self) {
        self.hold_tx.lock().take();
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until attempt number `n` (1-based) has started.
    pub fn wait_for_attempt(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.attempts() >= n {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.entered_rx.recv_timeout(remaining).is_err() {
                return self.attempts() >= n;
            }
        }
    }

    /// Bodies of successful, non-empty batches.
    pub fn bodies(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }

    /// Records from every delivered JSON-array batch, sorted.
    pub fn sorted_records(&self) -> Vec<String> {
        let mut records: Vec<String> = self
            .bodies()
            .iter()
            .flat_map(|body| super::json_records(body))
            .collect();
        records.sort();
        records
    }
}

impl Transmit for RecordingTransmitter {
    fn transmit(&self, body: &[u8], _extra: &[RequestCallback]) -> Result<(), TransmitError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.entered_tx.send(attempt);
        let step = self.script.lock().pop_front().unwrap_or(self.fallback);
        match step {
            Step::Fail => return Err(TransmitError::Transport("scripted failure".into())),
            Step::Hold => {
                // Disconnects once the sender is dropped by `release`.
                let _ = self.hold_rx.recv();
            }
            Step::Succeed => {}
        }
        let body = String::from_utf8_lossy(body).into_owned();
        if !super::json_records(&body).is_empty() {
            self.delivered.lock().push(body);
        }
        Ok(())
    }
}
