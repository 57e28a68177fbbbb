//! Process shutdown integration.
//!
//! Applications own a [`ShutdownRegistry`] that runs registered hooks once,
//! before the process exits. A writer registers exactly one hook when it
//! initializes; the hook runs [`coordinate`], which stops the worker pool and
//! drains everything still pending.
//!
//! [`ProcessShutdown::global`] is a ready-made process-wide registry. Call
//! [`run_shutdown_hooks`] from `main` (or a signal handler) before exiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::deferred::ReplayMode;
use crate::worker::{Worker, WorkerPool};

/// Callback invoked once at process shutdown.
pub type ShutdownHook = Box<dyn FnOnce() + Send>;

/// Identifies a registered hook so it can be withdrawn.
pub type HookId = u64;

/// Collaborator that runs hooks before the process terminates.
///
/// Hooks must run to completion before the registry proceeds.
pub trait ShutdownRegistry: Send + Sync {
    fn register(&self, hook: ShutdownHook) -> HookId;

    /// Drop a hook that has not run yet. Unknown ids are ignored.
    fn deregister(&self, id: HookId);
}

/// Hooks run in registration order, each at most once.
#[derive(Default)]
pub struct ProcessShutdown {
    hooks: Mutex<Vec<(HookId, ShutdownHook)>>,
    next_id: AtomicU64,
}

static GLOBAL: Lazy<Arc<ProcessShutdown>> = Lazy::new(|| Arc::new(ProcessShutdown::new()));

impl ProcessShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry writers use unless configured otherwise.
    pub fn global() -> Arc<ProcessShutdown> {
        Arc::clone(&GLOBAL)
    }

    /// Run and forget every registered hook. Returns how many ran.
    pub fn run_hooks(&self) -> usize {
        // Hooks may register further hooks; don't hold the lock while running.
        let hooks: Vec<_> = self.hooks.lock().drain(..).collect();
        let count = hooks.len();
        for (_, hook) in hooks {
            hook();
        }
        count
    }

    /// Hooks waiting to run.
    pub fn pending(&self) -> usize {
        self.hooks.lock().len()
    }
}

impl ShutdownRegistry for ProcessShutdown {
    fn register(&self, hook: ShutdownHook) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().push((id, hook));
        id
    }

    fn deregister(&self, id: HookId) {
        self.hooks.lock().retain(|(hook_id, _)| *hook_id != id);
    }
}

/// Run every hook registered with [`ProcessShutdown::global`].
pub fn run_shutdown_hooks() -> usize {
    GLOBAL.run_hooks()
}

/// Stop `pool` and drain pending work.
///
/// The caller must already have moved the writer to `FinallyDisabled`.
/// Workers flush their partial batches and exit; afterwards any record that
/// raced into the ingress queue is swept up, the deferred queue gets one
/// uncapped replay, and whatever remains deferred is counted as lost.
/// Subsequent calls return immediately.
pub(crate) fn coordinate(pool: &WorkerPool) {
    let mut stopped = pool.stopped().lock();
    if *stopped {
        return;
    }
    pool.cancel();
    let joined = pool.join();
    debug!("FemtoBatchWriter joined {joined} workers");

    let ctx = pool.context();
    let mut sweeper = Worker::new(0, Arc::clone(ctx));
    sweeper.finish();
    sweeper.replay(ReplayMode::Unbounded);

    let stranded = ctx.deferred.discard_all(&ctx.losses);
    if stranded > 0 {
        warn!("FemtoBatchWriter discarded {stranded} undeliverable records at shutdown");
    }
    ctx.losses.flush(|count| {
        warn!("FemtoBatchWriter dropped {count} records since the last report");
    });
    let total = ctx.losses.total();
    if total > 0 {
        warn!("FemtoBatchWriter lost {total} records in total");
    }
    *stopped = true;
}
