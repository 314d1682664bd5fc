//! Timing Circuit Breaker
//!
//! Every lifecycle hook runs inside a timed scope. Overruns are recorded as
//! strikes in the document's circular ledger; repeated or severe overruns
//! trip the breaker and disable recording for the rest of the run. The work
//! itself is never cancelled; a trip only affects future hooks.

use crate::config::SEVERE_MULTIPLIER;
use crate::store::RunStore;
use std::time::{Duration, Instant};
use tracing::warn;

/// Elapsed-time accounting for one hook invocation at a time.
///
/// `start` opens a fresh scope and discards any previous accumulation;
/// `stop` folds the running segment into the scope total.
#[derive(Debug, Default)]
pub struct HookTimer {
    started: Option<Instant>,
    accumulated: Duration,
}

impl HookTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh hook scope.
    pub fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    /// Close the running segment and return the scope total.
    pub fn stop(&mut self) -> Duration {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
        self.accumulated
    }

    /// Scope total so far, including a still-running segment.
    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.accumulated + started.elapsed(),
            None => self.accumulated,
        }
    }
}

/// Apply the budget rules for one finished hook scope.
///
/// An overrun records a strike in the current run's slot. Reaching the
/// strike threshold within the window, or a single overrun past
/// `SEVERE_MULTIPLIER` times the budget, trips the breaker.
pub fn evaluate(store: &mut RunStore, elapsed: Duration, budget: Duration) {
    if elapsed > budget {
        store.add_strike();
    }
    if store.too_many_strikes() || elapsed > budget * SEVERE_MULTIPLIER {
        if !store.skip_logging() {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "hook budget breached; recording disabled for this run"
            );
        }
        store.set_skip_logging();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_store(run_number: u64) -> (TempDir, RunStore) {
        let temp_dir = TempDir::new().unwrap();
        let mut store = RunStore::load(&temp_dir.path().join("testRunInfo.json")).unwrap();
        for _ in 0..run_number {
            store.increment_run_number();
        }
        (temp_dir, store)
    }

    #[test]
    fn test_under_budget_is_clean() {
        let (_temp, mut store) = fresh_store(1);
        evaluate(&mut store, Duration::from_millis(100), Duration::from_millis(500));
        assert!(!store.too_many_strikes());
        assert!(!store.skip_logging());
    }

    #[test]
    fn test_single_overrun_strikes_without_tripping() {
        let (_temp, mut store) = fresh_store(1);
        evaluate(&mut store, Duration::from_millis(600), Duration::from_millis(500));
        assert!(!store.skip_logging());
        assert!(store.info().strikes["1"]);
    }

    #[test]
    fn test_two_strikes_in_window_trip() {
        let (_temp, mut store) = fresh_store(1);
        evaluate(&mut store, Duration::from_millis(600), Duration::from_millis(500));

        store.increment_run_number();
        store.clear_current_strike();
        evaluate(&mut store, Duration::from_millis(700), Duration::from_millis(500));

        assert!(store.skip_logging());
    }

    #[test]
    fn test_severe_overrun_trips_immediately() {
        let (_temp, mut store) = fresh_store(1);
        evaluate(&mut store, Duration::from_millis(2600), Duration::from_millis(500));
        assert!(store.skip_logging());
    }

    #[test]
    fn test_cleared_slot_is_not_judged_twice() {
        let (_temp, mut store) = fresh_store(1);
        evaluate(&mut store, Duration::from_millis(600), Duration::from_millis(500));

        // Three runs later the slot wraps around; the old strike must not
        // combine with a fresh one from the same slot.
        store.increment_run_number();
        store.increment_run_number();
        store.increment_run_number();
        store.clear_current_strike();
        evaluate(&mut store, Duration::from_millis(600), Duration::from_millis(500));

        assert!(!store.skip_logging());
    }

    #[test]
    fn test_timer_scope_resets_on_start() {
        let mut timer = HookTimer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(30));
        let first = timer.stop();
        assert!(first >= Duration::from_millis(30));

        // A new scope stands alone; the previous total never carries over.
        timer.start();
        let second = timer.stop();
        assert!(second < first);
        assert_eq!(timer.elapsed(), second);
    }
}
