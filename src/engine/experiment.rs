//! Experiment state - variants, status, alerts
//!
//! An [`Experiment`] owns exactly two [`Variant`]s (control and test), each
//! holding a sample counter and a metric-name keyed map of online
//! aggregators. It is created only through the registry, mutated only by
//! data recording and re-analysis, and frozen once completed.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::config::ExperimentConfig;
use super::decision::AnalysisResult;
use crate::stats::OnlineStats;

/// Which variant a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    /// The baseline variant.
    Control,
    /// The variant under test.
    Test,
}

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Created but not yet accepting traffic.
    Initializing,
    /// Accepting measurements; re-analyzed repeatedly without transition.
    Running,
    /// Finalized; all further mutation frozen.
    Completed,
}

/// Why an experiment reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Natural duration expiry.
    Completed,
    /// Decisive evidence before expiry (positive or negative).
    EarlyStopping,
    /// A critical metric regressed past the blocking threshold.
    GuardRails,
    /// Engine shutdown finalized the experiment.
    Shutdown,
}

/// Severity of a guard-rail alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Recorded and reported, does not stop the experiment.
    Warning,
    /// Forces termination with reason `GuardRails`.
    Blocking,
}

/// A recorded guard-rail violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// The degraded metric.
    pub metric: String,
    /// Observed relative impact (negative = regression).
    pub relative_impact: f64,
    /// Warning or blocking.
    pub severity: AlertSeverity,
    /// When the violation was observed.
    pub at: DateTime<Utc>,
}

/// One variant's accumulated state: a sample counter plus an online
/// aggregator per metric. No raw samples are retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Variant {
    samples: u64,
    metrics: FxHashMap<String, OnlineStats>,
}

impl Variant {
    /// Fold one data point (one or more metric values) into this variant.
    ///
    /// Values must already be screened finite by the registry boundary.
    pub(crate) fn record(&mut self, values: &HashMap<String, f64>) {
        self.samples += 1;
        for (metric, &value) in values {
            self.metrics
                .entry(metric.clone())
                .or_insert_with(OnlineStats::new)
                .push(value);
        }
    }

    /// Number of data points recorded against this variant.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Aggregator for one metric, if any value has been recorded for it.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&OnlineStats> {
        self.metrics.get(name)
    }

    /// Names of all metrics observed on this variant.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}

/// A single A/B experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    id: String,
    name: String,
    description: String,
    hypothesis: String,
    test_variant: String,
    created_at: DateTime<Utc>,
    duration: Duration,
    ends_at: DateTime<Utc>,
    traffic_share: f64,
    status: ExperimentStatus,
    completion_reason: Option<CompletionReason>,
    completed_at: Option<DateTime<Utc>>,
    alpha: f64,
    primary_metrics: Vec<String>,
    secondary_metrics: Vec<String>,
    guardrail_metrics: Vec<String>,
    required_sample_size: u64,
    control: Variant,
    test: Variant,
    alerts: Vec<Alert>,
    last_analysis: Option<AnalysisResult>,
    metadata: Option<serde_json::Value>,
}

impl Experiment {
    /// Build a new experiment in `Initializing` state. Registry-internal:
    /// the public creation path is `ExperimentRegistry::create`.
    pub(crate) fn new(id: String, config: &ExperimentConfig, required_sample_size: u64) -> Self {
        let created_at = Utc::now();
        let ends_at = created_at
            + chrono::Duration::from_std(config.duration)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        Self {
            id,
            name: config.name.clone(),
            description: config.description.clone(),
            hypothesis: config.hypothesis.clone(),
            test_variant: config.test_variant.clone(),
            created_at,
            duration: config.duration,
            ends_at,
            traffic_share: config.traffic_share,
            status: ExperimentStatus::Initializing,
            completion_reason: None,
            completed_at: None,
            alpha: config.alpha,
            primary_metrics: config.primary_metrics.clone(),
            secondary_metrics: config.secondary_metrics.clone(),
            guardrail_metrics: config.guardrail_metrics.clone(),
            required_sample_size,
            control: Variant::default(),
            test: Variant::default(),
            alerts: Vec::new(),
            last_analysis: None,
            metadata: config.metadata.clone(),
        }
    }

    /// Transition `Initializing -> Running` once traffic is reserved.
    pub(crate) fn activate(&mut self) {
        if self.status == ExperimentStatus::Initializing {
            self.status = ExperimentStatus::Running;
        }
    }

    /// Freeze the experiment: set completion status, reason, timestamp.
    pub(crate) fn complete(&mut self, reason: CompletionReason) {
        self.status = ExperimentStatus::Completed;
        self.completion_reason = Some(reason);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn variant_mut(&mut self, arm: Arm) -> &mut Variant {
        match arm {
            Arm::Control => &mut self.control,
            Arm::Test => &mut self.test,
        }
    }

    /// Record an alert unless an equal (metric, severity) alert is already
    /// present - repeated analysis passes must not duplicate alerts while a
    /// violation persists.
    pub(crate) fn push_alert(&mut self, alert: Alert) {
        let duplicate = self
            .alerts
            .iter()
            .any(|a| a.metric == alert.metric && a.severity == alert.severity);
        if !duplicate {
            self.alerts.push(alert);
        }
    }

    pub(crate) fn set_last_analysis(&mut self, analysis: AnalysisResult) {
        self.last_analysis = Some(analysis);
    }

    /// Unique experiment id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The hypothesis under test.
    #[must_use]
    pub fn hypothesis(&self) -> &str {
        &self.hypothesis
    }

    /// What the test variant changes relative to control.
    #[must_use]
    pub fn test_variant_description(&self) -> &str {
        &self.test_variant
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Planned duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Computed natural end time.
    #[must_use]
    pub const fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// Reserved traffic share.
    #[must_use]
    pub const fn traffic_share(&self) -> f64 {
        self.traffic_share
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Why the experiment completed, once it has.
    #[must_use]
    pub const fn completion_reason(&self) -> Option<CompletionReason> {
        self.completion_reason
    }

    /// Completion timestamp, once completed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Significance level for all hypothesis tests.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Metrics driving the overall decision.
    #[must_use]
    pub fn primary_metrics(&self) -> &[String] {
        &self.primary_metrics
    }

    /// Informational metrics.
    #[must_use]
    pub fn secondary_metrics(&self) -> &[String] {
        &self.secondary_metrics
    }

    /// Critical metrics watched for regressions.
    #[must_use]
    pub fn guardrail_metrics(&self) -> &[String] {
        &self.guardrail_metrics
    }

    /// Sample-size plan computed at creation.
    #[must_use]
    pub const fn required_sample_size(&self) -> u64 {
        self.required_sample_size
    }

    /// The control variant.
    #[must_use]
    pub const fn control(&self) -> &Variant {
        &self.control
    }

    /// The test variant.
    #[must_use]
    pub const fn test(&self) -> &Variant {
        &self.test
    }

    /// Variant by arm.
    #[must_use]
    pub const fn variant(&self, arm: Arm) -> &Variant {
        match arm {
            Arm::Control => &self.control,
            Arm::Test => &self.test,
        }
    }

    /// Total data points across both variants.
    #[must_use]
    pub const fn samples_collected(&self) -> u64 {
        self.control.samples() + self.test.samples()
    }

    /// Accumulated guard-rail alerts.
    #[must_use]
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Most recent analysis result, if any pass has run.
    #[must_use]
    pub const fn last_analysis(&self) -> Option<&AnalysisResult> {
        self.last_analysis.as_ref()
    }

    /// Free-form metadata payload.
    #[must_use]
    pub const fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            name: "exp".into(),
            hypothesis: "h".into(),
            test_variant: "v".into(),
            primary_metrics: vec!["m".into()],
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_new_experiment_initializing() {
        let exp = Experiment::new("exp-1".into(), &config(), 100);
        assert_eq!(exp.status(), ExperimentStatus::Initializing);
        assert_eq!(exp.samples_collected(), 0);
        assert_eq!(exp.required_sample_size(), 100);
        assert!(exp.ends_at() > exp.created_at());
    }

    #[test]
    fn test_record_routes_to_one_variant() {
        let mut exp = Experiment::new("exp-1".into(), &config(), 100);
        exp.activate();
        let mut point = HashMap::new();
        point.insert("m".to_string(), 2.0);
        exp.variant_mut(Arm::Test).record(&point);
        assert_eq!(exp.test().samples(), 1);
        assert_eq!(exp.control().samples(), 0);
        assert_eq!(exp.test().metric("m").unwrap().count(), 1);
        assert!(exp.control().metric("m").is_none());
    }

    #[test]
    fn test_alert_deduplication() {
        let mut exp = Experiment::new("exp-1".into(), &config(), 100);
        let alert = Alert {
            metric: "errors".into(),
            relative_impact: -0.2,
            severity: AlertSeverity::Warning,
            at: Utc::now(),
        };
        exp.push_alert(alert.clone());
        exp.push_alert(alert.clone());
        assert_eq!(exp.alerts().len(), 1);
        exp.push_alert(Alert {
            severity: AlertSeverity::Blocking,
            ..alert
        });
        assert_eq!(exp.alerts().len(), 2);
    }

    #[test]
    fn test_complete_freezes_reason() {
        let mut exp = Experiment::new("exp-1".into(), &config(), 100);
        exp.activate();
        exp.complete(CompletionReason::GuardRails);
        assert_eq!(exp.status(), ExperimentStatus::Completed);
        assert_eq!(exp.completion_reason(), Some(CompletionReason::GuardRails));
        assert!(exp.completed_at().is_some());
    }
}
