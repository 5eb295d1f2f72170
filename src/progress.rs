//! Scan progress reporting
//!
//! [`ProgressTracker`] sits between the scan loop and the caller's reporter. It counts
//! finished candidates, throttles reports to the configured step and guarantees the
//! caller sees an increasing sequence ending at exactly `1.0`.

use std::sync::Mutex;

use crate::ProgressStep;

/// Receives the completed fraction of a scan, in `[0.0, 1.0]`.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressReporter for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Reporter that ignores every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _fraction: f64) {}
}

#[derive(Debug, Default)]
struct TrackerState {
    processed: usize,
    last_reported: f64,
    finished: bool,
}

/// Per-scan progress accumulator, safe to share across scan workers
///
/// Counting happens under a short lock; the reporter is called after it is released, so
/// only the worker that crossed a step waits on a slow reporter. A second lock orders
/// deliveries and drops any fraction that is not above the last one delivered.
pub struct ProgressTracker<'a> {
    reporter: Option<&'a dyn ProgressReporter>,
    total: usize,
    step: f64,
    state: Mutex<TrackerState>,
    delivered: Mutex<f64>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: Option<&'a dyn ProgressReporter>, total: usize, step: ProgressStep) -> Self {
        Self {
            reporter,
            total,
            step: step.get(),
            state: Mutex::new(TrackerState::default()),
            delivered: Mutex::new(0.0),
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        lock(&self.state).processed
    }

    /// Record one finished candidate.
    pub fn record(&self) {
        let due = {
            let mut state = lock(&self.state);
            if state.finished || self.total == 0 {
                return;
            }
            state.processed += 1;
            if state.processed >= self.total {
                state.finished = true;
                Some(Self::mark(&mut state, 1.0))
            } else {
                let fraction = state.processed as f64 / self.total as f64;
                (fraction - state.last_reported >= self.step)
                    .then(|| Self::mark(&mut state, fraction))
            }
        };
        if let Some(fraction) = due {
            self.deliver(fraction);
        }
    }

    /// Close out a non-empty scan with a final `1.0` if it has not been sent.
    pub fn finish(&self) {
        {
            let mut state = lock(&self.state);
            if state.finished || self.total == 0 {
                return;
            }
            state.finished = true;
            Self::mark(&mut state, 1.0);
        }
        self.deliver(1.0);
    }

    fn mark(state: &mut TrackerState, fraction: f64) -> f64 {
        state.last_reported = fraction;
        fraction
    }

    fn deliver(&self, fraction: f64) {
        let Some(reporter) = self.reporter else {
            return;
        };
        let mut delivered = lock(&self.delivered);
        // Workers can reach this out of order; a stale fraction is dropped.
        if fraction > *delivered {
            *delivered = fraction;
            reporter.report(fraction);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
