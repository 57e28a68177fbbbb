use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default minimum interval between loss warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Counts records the writer had to discard.
///
/// [`total`](Self::total) is monotonic and never resets. Separately, the
/// counter tracks drops since the last warning so callers can emit
/// rate-limited diagnostics via [`warn_if_due`](Self::warn_if_due); the first
/// warning is emitted immediately. [`flush`](Self::flush) reports pending
/// drops regardless of the interval.
pub struct LossCounter {
    total: AtomicU64,
    pending: AtomicU64,
    last_warn: AtomicU64,
    interval_millis: u64,
}

impl Default for LossCounter {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl LossCounter {
    pub fn new(interval: Duration) -> Self {
        let interval_millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self {
            total: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            last_warn: AtomicU64::new(now_millis().saturating_sub(interval_millis)),
            interval_millis,
        }
    }

    /// Record `records` discarded records.
    pub fn record(&self, records: u64) {
        if records == 0 {
            return;
        }
        self.total.fetch_add(records, Ordering::Relaxed);
        self.pending.fetch_add(records, Ordering::Relaxed);
    }

    /// Records discarded since the writer was created.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = now_millis();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if now.saturating_sub(prev) >= self.interval_millis
            && self
                .last_warn
                .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            let count = self.pending.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
            }
        }
    }

    /// Immediately warn about any drops not yet reported.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now_millis(), Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for LossCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LossCounter")
            .field("total", &self.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_first_warning_immediately() {
        let losses = LossCounter::default();
        let mut warnings = Vec::new();
        losses.record(1);
        losses.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
    }

    #[test]
    fn rate_limits_subsequent_warnings() {
        let losses = LossCounter::default();
        let mut warnings = Vec::new();
        losses.record(1);
        losses.warn_if_due(|c| warnings.push(c));
        losses.record(3);
        losses.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
        assert_eq!(losses.total(), 4);
    }

    #[test]
    fn sub_second_interval_still_rate_limits() {
        let losses = LossCounter::new(Duration::from_millis(500));
        let mut warnings = Vec::new();
        for _ in 0..5 {
            losses.record(1);
            losses.warn_if_due(|c| warnings.push(c));
        }
        assert_eq!(warnings, vec![1]);

        std::thread::sleep(Duration::from_millis(600));
        losses.record(1);
        losses.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1, 5]);
    }

    #[test]
    fn fractional_interval_is_not_truncated() {
        let losses = LossCounter::new(Duration::from_millis(1900));
        let mut warnings = Vec::new();
        losses.record(1);
        losses.warn_if_due(|c| warnings.push(c));
        std::thread::sleep(Duration::from_millis(1100));
        losses.record(1);
        losses.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
    }

    #[test]
    fn flush_emits_pending_warning() {
        let losses = LossCounter::default();
        let mut warnings = Vec::new();
        losses.record(2);
        losses.warn_if_due(|_| {});
        losses.record(5);
        losses.flush(|c| warnings.push(c));
        assert_eq!(warnings, vec![5]);
    }

    #[test]
    fn total_never_resets() {
        let losses = LossCounter::default();
        losses.record(2);
        losses.flush(|_| {});
        losses.record(0);
        assert_eq!(losses.total(), 2);
    }
}
