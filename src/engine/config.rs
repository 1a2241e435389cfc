//! Engine and experiment configuration
//!
//! Two layers: [`EngineConfig`] is registry-wide (admission limits, analysis
//! cadence, safety thresholds), [`ExperimentConfig`] is the per-experiment
//! creation input. Both deserialize with per-field defaults so embedding
//! products can supply sparse config payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SIX_HOURS: Duration = Duration::from_secs(6 * 60 * 60);
const SEVEN_DAYS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Registry-wide engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of simultaneously running experiments.
    pub max_concurrent_experiments: usize,
    /// Ceiling on the sum of all reserved traffic shares.
    pub max_total_traffic: f64,
    /// Ceiling on a single experiment's traffic share.
    pub max_traffic_share: f64,
    /// Cadence of scheduled re-analysis passes.
    pub analysis_interval: Duration,
    /// After the required sample size is reached, re-analyze every this many
    /// additional samples (recording-triggered, independent of the timer).
    pub analysis_every_samples: u64,
    /// Early-stop multiplier on alpha: stopping for success requires
    /// `overall_p < alpha * early_stop_strictness`.
    pub early_stop_strictness: f64,
    /// Relative change at or below which a significant primary metric
    /// triggers early stopping for negative impact.
    pub negative_impact_threshold: f64,
    /// Relative change at or below which a significant guard-rail metric
    /// forces termination (blocking alert).
    pub guardrail_block_threshold: f64,
    /// Relative change at or below which a guard-rail metric raises a
    /// non-blocking warning alert.
    pub guardrail_warn_threshold: f64,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_experiments: 3,
            max_total_traffic: 0.5,
            max_traffic_share: 0.5,
            analysis_interval: SIX_HOURS,
            analysis_every_samples: 100,
            early_stop_strictness: 0.1,
            negative_impact_threshold: -0.10,
            guardrail_block_threshold: -0.10,
            guardrail_warn_threshold: -0.05,
            event_buffer: 256,
        }
    }
}

/// Creation input for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Human-readable experiment name. Required.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// The hypothesis under test. Required.
    pub hypothesis: String,
    /// What the test variant changes relative to control. Required.
    pub test_variant: String,
    /// Planned duration; the experiment auto-completes when it elapses.
    pub duration: Duration,
    /// Fraction of eligible units routed into the experiment.
    pub traffic_share: f64,
    /// Significance level for all hypothesis tests.
    pub alpha: f64,
    /// Target statistical power for the sample-size plan.
    pub power: f64,
    /// Minimum detectable effect (standardized) for the sample-size plan.
    pub minimum_detectable_effect: f64,
    /// Metrics that drive the overall decision. At least one required.
    pub primary_metrics: Vec<String>,
    /// Informational metrics, analyzed but never decisive.
    pub secondary_metrics: Vec<String>,
    /// Critical metrics watched for regressions (guard rails).
    pub guardrail_metrics: Vec<String>,
    /// Free-form payload passed through to reports.
    pub metadata: Option<serde_json::Value>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            hypothesis: String::new(),
            test_variant: String::new(),
            duration: SEVEN_DAYS,
            traffic_share: 0.10,
            alpha: 0.05,
            power: 0.8,
            minimum_detectable_effect: 0.05,
            primary_metrics: Vec::new(),
            secondary_metrics: Vec::new(),
            guardrail_metrics: Vec::new(),
            metadata: None,
        }
    }
}

impl ExperimentConfig {
    /// Validate the configuration against engine limits.
    ///
    /// Rejection happens before any registry state mutates.
    ///
    /// # Errors
    ///
    /// `Error::Validation` naming the first offending field.
    pub fn validate(&self, engine: &EngineConfig) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("experiment name is required".into()));
        }
        if self.hypothesis.trim().is_empty() {
            return Err(Error::Validation("hypothesis is required".into()));
        }
        if self.test_variant.trim().is_empty() {
            return Err(Error::Validation(
                "test variant description is required".into(),
            ));
        }
        if self.primary_metrics.is_empty() {
            return Err(Error::Validation(
                "at least one primary metric is required".into(),
            ));
        }
        if !(self.traffic_share > 0.0 && self.traffic_share <= engine.max_traffic_share) {
            return Err(Error::Validation(format!(
                "traffic share must be in (0, {}], got {}",
                engine.max_traffic_share, self.traffic_share
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::Validation(format!(
                "significance level must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.power > 0.0 && self.power < 1.0) {
            return Err(Error::Validation(format!(
                "power must be in (0, 1), got {}",
                self.power
            )));
        }
        if !(self.minimum_detectable_effect > 0.0 && self.minimum_detectable_effect.is_finite()) {
            return Err(Error::Validation(format!(
                "minimum detectable effect must be positive, got {}",
                self.minimum_detectable_effect
            )));
        }
        if self.duration.is_zero() {
            return Err(Error::Validation("duration must be non-zero".into()));
        }
        Ok(())
    }
}
