//! Experiment Registry - ownership, admission, lifecycle
//!
//! The registry owns every active and completed experiment, enforces
//! traffic allocation and concurrency limits, routes measurements to the
//! owning variant's aggregators, and applies decision-engine outcomes
//! (continue, or stop-and-finalize). All state is in-process; nothing here
//! blocks on network or disk.
//!
//! ## Concurrency
//!
//! - Per-experiment mutation is serialized by the concurrent map's entry
//!   guards: no lost updates under concurrent `record_measurement` calls.
//! - Analysis clones a consistent aggregator snapshot under the guard and
//!   computes off-lock, so it never observes a half-updated mean/variance.
//! - Traffic admission (share sum + concurrency limit) is one mutex
//!   acquisition: two racing `create` calls cannot jointly exceed either
//!   ceiling.
//! - A finalize mutex resolves concurrent finalizations (expiry timer vs.
//!   auto-stop vs. caller) to one winner; the rest read the archived report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::config::{EngineConfig, ExperimentConfig};
use super::counters::{CounterSnapshot, EngineCounters};
use super::decision::{self, AnalysisResult, Decision, Recommendation, StopReason};
use super::events::{EngineEvent, EventBus};
use super::experiment::{Arm, CompletionReason, Experiment};
use super::scheduler::Scheduler;
use crate::error::{Error, Result};
use crate::stats::analyzer::{self, MetricRole};
use crate::stats::{power, OnlineStats};

/// The archived outcome of a completed experiment.
///
/// Emitted with the `test_finalized` notification; a storage collaborator
/// is expected to subscribe and persist it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    /// Final experiment snapshot (status, alerts, aggregators).
    pub experiment: Experiment,
    /// The last analysis pass, run at finalization time.
    pub analysis: AnalysisResult,
    /// The closing verdict.
    pub recommendation: Recommendation,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// Reserved traffic shares of active experiments.
///
/// Invariant: the sum of shares never exceeds the configured ceiling.
#[derive(Debug, Default)]
struct TrafficLedger {
    shares: FxHashMap<String, f64>,
}

impl TrafficLedger {
    fn reserved(&self) -> f64 {
        self.shares.values().sum()
    }

    /// Check-and-reserve under one lock: concurrency limit, then ceiling.
    fn try_admit(&mut self, id: &str, share: f64, max_active: usize, ceiling: f64) -> Result<()> {
        if self.shares.len() >= max_active {
            return Err(Error::Validation(format!(
                "concurrent experiment limit reached ({max_active})"
            )));
        }
        let reserved = self.reserved();
        // Tolerance absorbs float dust from repeated share sums.
        if reserved + share > ceiling + 1e-12 {
            return Err(Error::TrafficConflict {
                requested: share,
                reserved,
                ceiling,
            });
        }
        self.shares.insert(id.to_string(), share);
        Ok(())
    }

    fn release(&mut self, id: &str) {
        self.shares.remove(id);
    }
}

/// Owner of all experiment state and the engine's public surface.
#[derive(Debug)]
pub struct ExperimentRegistry {
    config: EngineConfig,
    active: DashMap<String, Experiment>,
    completed: DashMap<String, FinalReport>,
    traffic: Mutex<TrafficLedger>,
    finalize_lock: Mutex<()>,
    scheduler: Scheduler,
    events: EventBus,
    counters: EngineCounters,
    seq: AtomicU64,
    // Handed to timer tasks so they never keep the registry alive.
    self_ref: Weak<Self>,
}

impl ExperimentRegistry {
    /// Create a registry with the given engine configuration.
    ///
    /// Returns an `Arc` because the scheduler's timer tasks hold weak
    /// references back to the registry.
    #[must_use]
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| {
            let events = EventBus::new(config.event_buffer);
            Self {
                config,
                active: DashMap::new(),
                completed: DashMap::new(),
                traffic: Mutex::new(TrafficLedger::default()),
                finalize_lock: Mutex::new(()),
                scheduler: Scheduler::new(),
                events,
                counters: EngineCounters::default(),
                seq: AtomicU64::new(0),
                self_ref: self_ref.clone(),
            }
        })
    }

    /// The engine configuration this registry runs with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to lifecycle notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Validate, admit, and start a new experiment.
    ///
    /// Computes the required sample size, atomically reserves traffic,
    /// schedules the periodic re-analysis and expiry timers, and returns
    /// the running experiment snapshot.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for missing/invalid fields or when the
    ///   concurrent-experiment limit is reached
    /// - `Error::TrafficConflict` when the requested share would push total
    ///   allocation over the ceiling (the allocation table is untouched)
    pub fn create(&self, config: ExperimentConfig) -> Result<Experiment> {
        config.validate(&self.config)?;
        let required =
            power::required_sample_size(config.alpha, config.power, config.minimum_detectable_effect)?;
        let id = self.next_id();

        self.lock_traffic().try_admit(
            &id,
            config.traffic_share,
            self.config.max_concurrent_experiments,
            self.config.max_total_traffic,
        )?;

        let mut experiment = Experiment::new(id.clone(), &config, required);
        experiment.activate();
        self.active.insert(id.clone(), experiment.clone());
        self.scheduler.schedule(
            self.self_ref.clone(),
            &id,
            self.config.analysis_interval,
            config.duration,
        );

        self.counters.experiment_created();
        info!(
            experiment_id = %id,
            name = %experiment.name(),
            traffic_share = experiment.traffic_share(),
            required_samples = required,
            "experiment created"
        );
        self.events.publish(EngineEvent::ExperimentCreated {
            experiment_id: id,
            name: experiment.name().to_string(),
            at: experiment.created_at(),
        });
        Ok(experiment)
    }

    /// Route one data point into a variant's aggregators.
    ///
    /// The whole batch is screened before any aggregator mutates: one
    /// non-finite value rejects the call and every count stays unchanged.
    /// Once total samples cross the required sample size, an out-of-band
    /// analysis pass runs here every `analysis_every_samples` samples,
    /// independent of the scheduled timer.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownTest` for a non-existent or archived id
    /// - `Error::InvalidMeasurement` for a non-finite metric value
    pub fn record_measurement(
        &self,
        id: &str,
        arm: Arm,
        values: &HashMap<String, f64>,
    ) -> Result<()> {
        let (samples_collected, required) = {
            let Some(mut entry) = self.active.get_mut(id) else {
                return Err(Error::UnknownTest(id.to_string()));
            };
            for (metric, &value) in values {
                if !value.is_finite() {
                    self.counters.measurement_rejected();
                    return Err(Error::InvalidMeasurement {
                        metric: metric.clone(),
                        value,
                    });
                }
            }
            entry.variant_mut(arm).record(values);
            (entry.samples_collected(), entry.required_sample_size())
        };

        self.counters.measurement_recorded();
        self.events.publish(EngineEvent::MeasurementRecorded {
            experiment_id: id.to_string(),
            arm,
            samples_collected,
        });

        let every = self.config.analysis_every_samples.max(1);
        if samples_collected >= required && (samples_collected - required) % every == 0 {
            debug!(
                experiment_id = id,
                samples_collected, "sample threshold crossed, analyzing"
            );
            if let Err(e) = self.analyze(id) {
                warn!(experiment_id = id, error = %e, "threshold-triggered analysis failed");
            }
        }
        Ok(())
    }

    /// Run a full analysis pass and apply its outcome.
    ///
    /// Reads a consistent aggregator snapshot, computes per-metric tests
    /// and the Bonferroni-corrected overall significance, caches the result
    /// and any new alerts on the experiment, and - when a stop condition
    /// fires - finalizes with the signalled reason.
    ///
    /// # Errors
    ///
    /// `Error::UnknownTest` for a non-existent or archived id.
    pub fn analyze(&self, id: &str) -> Result<AnalysisResult> {
        let Some(snapshot) = self.active.get(id).map(|entry| entry.value().clone()) else {
            return Err(Error::UnknownTest(id.to_string()));
        };

        let (result, stop) = self.analyze_snapshot(&snapshot);

        self.events.publish(EngineEvent::ExperimentAnalyzed {
            experiment_id: id.to_string(),
            analysis: Arc::new(result.clone()),
        });

        if let Some(reason) = stop {
            info!(experiment_id = id, ?reason, "stop condition met");
            // A concurrent finalization winning this race is fine.
            if let Err(e) = self.finalize(id, reason) {
                debug!(experiment_id = id, error = %e, "stop superseded by concurrent finalize");
            }
        }
        Ok(result)
    }

    /// Complete an experiment: final analysis, traffic release, timer
    /// cancellation, archival. Idempotent - finalizing an already-completed
    /// experiment returns the archived report and performs no side effects.
    ///
    /// # Errors
    ///
    /// `Error::UnknownTest` when the id was never created.
    pub fn finalize(&self, id: &str, reason: CompletionReason) -> Result<FinalReport> {
        let _guard = self
            .finalize_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(report) = self.completed.get(id) {
            return Ok(report.value().clone());
        }
        let Some((_, mut experiment)) = self.active.remove(id) else {
            return Err(Error::UnknownTest(id.to_string()));
        };

        // One last pass over the owned state; its stop signal is moot.
        let (metrics, overall_p, decision) = self.evaluate_experiment(&experiment);
        self.counters.analysis_pass();
        for alert in decision.new_alerts {
            experiment.push_alert(alert);
        }
        let result = assemble_result(&experiment, metrics, overall_p, decision.recommendation);
        experiment.set_last_analysis(result.clone());
        experiment.complete(reason);

        self.lock_traffic().release(id);
        self.scheduler.cancel(id);
        self.counters.experiment_completed();
        match reason {
            CompletionReason::EarlyStopping => self.counters.early_stop(),
            CompletionReason::GuardRails => self.counters.guardrail_stop(),
            CompletionReason::Completed | CompletionReason::Shutdown => {}
        }

        let report = FinalReport {
            recommendation: result.recommendation,
            analysis: result,
            experiment,
            generated_at: Utc::now(),
        };
        self.completed.insert(id.to_string(), report.clone());
        info!(experiment_id = id, ?reason, "experiment finalized");
        self.events.publish(EngineEvent::ExperimentFinalized {
            experiment_id: id.to_string(),
            report: Arc::new(report.clone()),
        });
        Ok(report)
    }

    /// Terminate an experiment early for one of the two sanctioned reasons.
    ///
    /// # Errors
    ///
    /// `Error::UnknownTest` when the id was never created.
    pub fn stop(&self, id: &str, reason: StopReason) -> Result<FinalReport> {
        self.finalize(id, reason.into())
    }

    /// Finalize every active experiment with reason `Shutdown`.
    pub fn shutdown(&self) -> Vec<FinalReport> {
        let ids: Vec<String> = self.active.iter().map(|entry| entry.key().clone()).collect();
        ids.iter()
            .filter_map(|id| self.finalize(id, CompletionReason::Shutdown).ok())
            .collect()
    }

    /// Snapshot of an active experiment.
    #[must_use]
    pub fn experiment(&self, id: &str) -> Option<Experiment> {
        self.active.get(id).map(|entry| entry.value().clone())
    }

    /// Archived report of a completed experiment.
    #[must_use]
    pub fn final_report(&self, id: &str) -> Option<FinalReport> {
        self.completed.get(id).map(|entry| entry.value().clone())
    }

    /// Ids of all active experiments.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of active experiments.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sum of reserved traffic shares.
    #[must_use]
    pub fn reserved_traffic(&self) -> f64 {
        self.lock_traffic().reserved()
    }

    /// Point-in-time operation counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    fn next_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("exp-{}-{seq}", Utc::now().timestamp_millis())
    }

    fn lock_traffic(&self) -> MutexGuard<'_, TrafficLedger> {
        self.traffic.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Analyze a snapshot and write the outcome back to the live entry
    /// (unless a concurrent finalize already removed it). Returns the
    /// result and an optional stop signal for the caller to apply.
    fn analyze_snapshot(
        &self,
        snapshot: &Experiment,
    ) -> (AnalysisResult, Option<CompletionReason>) {
        let (metrics, overall_p, decision) = self.evaluate_experiment(snapshot);
        self.counters.analysis_pass();

        let result = assemble_result(snapshot, metrics, overall_p, decision.recommendation);
        if let Some(mut entry) = self.active.get_mut(snapshot.id()) {
            for alert in &decision.new_alerts {
                warn!(
                    experiment_id = snapshot.id(),
                    metric = %alert.metric,
                    relative_impact = alert.relative_impact,
                    severity = ?alert.severity,
                    "guard-rail alert"
                );
                entry.push_alert(alert.clone());
            }
            entry.set_last_analysis(result.clone());
        }
        (result, decision.stop)
    }

    /// Per-metric tests plus the decision, computed from a snapshot.
    fn evaluate_experiment(
        &self,
        experiment: &Experiment,
    ) -> (Vec<analyzer::MetricAnalysis>, Option<f64>, Decision) {
        let alpha = experiment.alpha();
        let empty = OnlineStats::new();
        let mut metrics = Vec::new();
        let roles = [
            (MetricRole::Primary, experiment.primary_metrics()),
            (MetricRole::Secondary, experiment.secondary_metrics()),
            (MetricRole::GuardRail, experiment.guardrail_metrics()),
        ];
        for (role, names) in roles {
            for name in names {
                let control = experiment.control().metric(name).unwrap_or(&empty);
                let test = experiment.test().metric(name).unwrap_or(&empty);
                metrics.push(analyzer::analyze_metric(name, role, control, test, alpha));
            }
        }

        let primary_p_values: Vec<f64> = metrics
            .iter()
            .filter(|m| m.role == MetricRole::Primary && m.valid)
            .map(|m| m.p_value)
            .collect();
        let overall_p = analyzer::bonferroni(&primary_p_values);
        let decision = decision::evaluate(&self.config, experiment, &metrics, overall_p);
        (metrics, overall_p, decision)
    }
}

fn assemble_result(
    experiment: &Experiment,
    metrics: Vec<analyzer::MetricAnalysis>,
    overall_p: Option<f64>,
    recommendation: Recommendation,
) -> AnalysisResult {
    AnalysisResult {
        experiment_id: experiment.id().to_string(),
        computed_at: Utc::now(),
        control_samples: experiment.control().samples(),
        test_samples: experiment.test().samples(),
        required_sample_size: experiment.required_sample_size(),
        metrics,
        overall_p_value: overall_p,
        significant: overall_p.is_some_and(|p| p < experiment.alpha()),
        recommendation,
    }
}
