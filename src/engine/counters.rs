//! Engine counters
//!
//! An explicit counter struct owned by the registry (not ambient global
//! state), cheap to bump from any thread, exported as a plain snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic operation counters for one registry instance.
#[derive(Debug, Default)]
pub struct EngineCounters {
    experiments_created: AtomicU64,
    experiments_completed: AtomicU64,
    measurements_recorded: AtomicU64,
    measurements_rejected: AtomicU64,
    analysis_passes: AtomicU64,
    early_stops: AtomicU64,
    guardrail_stops: AtomicU64,
}

impl EngineCounters {
    pub(crate) fn experiment_created(&self) {
        self.experiments_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn experiment_completed(&self) {
        self.experiments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn measurement_recorded(&self) {
        self.measurements_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn measurement_rejected(&self) {
        self.measurements_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn analysis_pass(&self) {
        self.analysis_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn early_stop(&self) {
        self.early_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn guardrail_stop(&self) {
        self.guardrail_stops.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time view of all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            experiments_created: self.experiments_created.load(Ordering::Relaxed),
            experiments_completed: self.experiments_completed.load(Ordering::Relaxed),
            measurements_recorded: self.measurements_recorded.load(Ordering::Relaxed),
            measurements_rejected: self.measurements_rejected.load(Ordering::Relaxed),
            analysis_passes: self.analysis_passes.load(Ordering::Relaxed),
            early_stops: self.early_stops.load(Ordering::Relaxed),
            guardrail_stops: self.guardrail_stops.load(Ordering::Relaxed),
        }
    }
}

/// Exported counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Experiments admitted by `create`.
    pub experiments_created: u64,
    /// Experiments finalized for any reason.
    pub experiments_completed: u64,
    /// Accepted measurement calls.
    pub measurements_recorded: u64,
    /// Measurement calls rejected for non-finite values.
    pub measurements_rejected: u64,
    /// Analysis passes run (scheduled, threshold-triggered, and on-demand).
    pub analysis_passes: u64,
    /// Completions with reason early-stopping.
    pub early_stops: u64,
    /// Completions with reason guard-rails.
    pub guardrail_stops: u64,
}
