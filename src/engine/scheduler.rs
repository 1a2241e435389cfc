//! Per-experiment timers
//!
//! Each running experiment gets one timer pair: a periodic re-analysis task
//! and a one-shot expiry task. Handles live in a concurrent map keyed by
//! experiment id; finalize aborts both, so no analysis pass can run after
//! completion. Tasks hold only a `Weak` registry reference - they exit
//! cleanly when the registry drops or the experiment disappears.

use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::experiment::CompletionReason;
use super::registry::ExperimentRegistry;
use crate::error::Error;

#[derive(Debug)]
struct TimerPair {
    periodic: JoinHandle<()>,
    expiry: JoinHandle<()>,
}

impl TimerPair {
    fn cancel(&self) {
        self.periodic.abort();
        self.expiry.abort();
    }
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    timers: DashMap<String, TimerPair>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawn the timer pair for one experiment.
    ///
    /// Outside a tokio runtime the engine degrades to on-demand analysis
    /// only; synchronous embeddings still get correct recording-triggered
    /// passes, just no wall-clock scheduling.
    pub(crate) fn schedule(
        &self,
        registry: Weak<ExperimentRegistry>,
        experiment_id: &str,
        analysis_interval: Duration,
        expires_in: Duration,
    ) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(
                experiment_id,
                "no async runtime: periodic analysis and expiry timers disabled"
            );
            return;
        }

        let periodic = spawn_periodic(
            registry.clone(),
            experiment_id.to_string(),
            analysis_interval,
        );
        let expiry = spawn_expiry(registry, experiment_id.to_string(), expires_in);
        self.timers
            .insert(experiment_id.to_string(), TimerPair { periodic, expiry });
    }

    /// Abort the timer pair for one experiment. Idempotent.
    pub(crate) fn cancel(&self, experiment_id: &str) {
        if let Some((_, pair)) = self.timers.remove(experiment_id) {
            pair.cancel();
            debug!(experiment_id, "timers cancelled");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().cancel();
        }
    }
}

fn spawn_periodic(
    registry: Weak<ExperimentRegistry>,
    experiment_id: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; creation is not an analysis
        // trigger, so swallow it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            match registry.analyze(&experiment_id) {
                Ok(_) => {}
                Err(Error::UnknownTest(_)) => break,
                // A failed pass is retried at the next tick, never fatal.
                Err(e) => {
                    warn!(experiment_id = %experiment_id, error = %e, "scheduled analysis pass failed");
                }
            }
        }
    })
}

fn spawn_expiry(
    registry: Weak<ExperimentRegistry>,
    experiment_id: String,
    expires_in: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(expires_in).await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        match registry.finalize(&experiment_id, CompletionReason::Completed) {
            Ok(_) | Err(Error::UnknownTest(_)) => {}
            Err(e) => warn!(experiment_id = %experiment_id, error = %e, "expiry finalization failed"),
        }
    })
}
