//! Decision Engine - recommendation, early stopping, guard rails
//!
//! Combines current significance, guard-rail status, and collected sample
//! size into one of continue / deploy / reject, and decides whether the
//! experiment should terminate ahead of its planned duration. Safety wins
//! ties: guard rails are evaluated before anything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::experiment::{Alert, AlertSeverity, CompletionReason, Experiment};
use crate::stats::analyzer::{MetricAnalysis, MetricRole};

/// Why an experiment should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinueReason {
    /// Fewer samples collected than the power analysis requires.
    InsufficientSampleSize,
    /// Enough data, but the overall corrected p-value is above alpha.
    NotStatisticallySignificant,
}

/// The engine's verdict for an experiment at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Recommendation {
    /// Significant and every primary metric is non-negative: ship it.
    Deploy,
    /// Significant but some primary metric regressed: do not ship.
    Reject,
    /// Keep collecting.
    Continue {
        /// Why the experiment is not yet decidable.
        reason: ContinueReason,
    },
}

/// External early-termination reasons accepted by `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Decisive evidence, positive or negative.
    EarlyStopping,
    /// Guard-rail violation.
    GuardRails,
}

impl From<StopReason> for CompletionReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EarlyStopping => Self::EarlyStopping,
            StopReason::GuardRails => Self::GuardRails,
        }
    }
}

/// One full analysis pass over an experiment.
///
/// Derived data: recomputed on demand from aggregator snapshots, cached on
/// the experiment only for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The analyzed experiment.
    pub experiment_id: String,
    /// When this pass ran.
    pub computed_at: DateTime<Utc>,
    /// Control-variant data points at snapshot time.
    pub control_samples: u64,
    /// Test-variant data points at snapshot time.
    pub test_samples: u64,
    /// Sample-size plan computed at creation.
    pub required_sample_size: u64,
    /// Per-metric hypothesis tests (primary, secondary, and guard-rail).
    pub metrics: Vec<MetricAnalysis>,
    /// Bonferroni-corrected overall p-value over valid primary metrics;
    /// `None` when no primary metric has data in both variants.
    pub overall_p_value: Option<f64>,
    /// `overall_p_value < alpha`.
    pub significant: bool,
    /// The verdict for this pass.
    pub recommendation: Recommendation,
}

impl AnalysisResult {
    /// Per-metric analysis by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricAnalysis> {
        self.metrics.iter().find(|m| m.metric == name)
    }
}

/// Outcome of one decision pass: the recommendation, an optional stop
/// signal for the registry to apply, and alerts to append.
#[derive(Debug, Clone)]
pub(crate) struct Decision {
    pub recommendation: Recommendation,
    pub stop: Option<CompletionReason>,
    pub new_alerts: Vec<Alert>,
}

/// Evaluate guard rails, early stopping, and the recommendation ladder.
pub(crate) fn evaluate(
    config: &EngineConfig,
    experiment: &Experiment,
    metrics: &[MetricAnalysis],
    overall_p: Option<f64>,
) -> Decision {
    let mut new_alerts = Vec::new();
    let alpha = experiment.alpha();
    let now = Utc::now();

    // Guard rails first: a blocking violation overrides everything else.
    let mut guardrail_tripped = false;
    for m in metrics.iter().filter(|m| m.role == MetricRole::GuardRail && m.valid) {
        let Some(rel) = m.relative_change else {
            continue;
        };
        if rel <= config.guardrail_block_threshold && m.significant {
            guardrail_tripped = true;
            push_candidate(
                experiment,
                &mut new_alerts,
                Alert {
                    metric: m.metric.clone(),
                    relative_impact: rel,
                    severity: AlertSeverity::Blocking,
                    at: now,
                },
            );
        } else if rel <= config.guardrail_warn_threshold {
            push_candidate(
                experiment,
                &mut new_alerts,
                Alert {
                    metric: m.metric.clone(),
                    relative_impact: rel,
                    severity: AlertSeverity::Warning,
                    at: now,
                },
            );
        }
    }
    if guardrail_tripped {
        return Decision {
            recommendation: Recommendation::Reject,
            stop: Some(CompletionReason::GuardRails),
            new_alerts,
        };
    }

    let primaries: Vec<&MetricAnalysis> = metrics
        .iter()
        .filter(|m| m.role == MetricRole::Primary && m.valid)
        .collect();
    let all_primaries_non_negative =
        !primaries.is_empty() && primaries.iter().all(|m| m.difference >= 0.0);

    // Early stopping on significant negative impact of any primary metric.
    let negative_primary = primaries.iter().any(|m| {
        m.significant
            && m.relative_change
                .is_some_and(|rel| rel <= config.negative_impact_threshold)
    });
    if negative_primary {
        return Decision {
            recommendation: Recommendation::Reject,
            stop: Some(CompletionReason::EarlyStopping),
            new_alerts,
        };
    }

    // Early stopping on evidence an order of magnitude stronger than alpha,
    // with every primary metric pointing the right way.
    if let Some(p) = overall_p {
        if p < alpha * config.early_stop_strictness && all_primaries_non_negative {
            return Decision {
                recommendation: Recommendation::Deploy,
                stop: Some(CompletionReason::EarlyStopping),
                new_alerts,
            };
        }
    }

    // Plain recommendation ladder.
    let recommendation = if experiment.samples_collected() < experiment.required_sample_size() {
        Recommendation::Continue {
            reason: ContinueReason::InsufficientSampleSize,
        }
    } else {
        match overall_p {
            Some(p) if p < alpha && all_primaries_non_negative => Recommendation::Deploy,
            Some(p) if p < alpha => Recommendation::Reject,
            _ => Recommendation::Continue {
                reason: ContinueReason::NotStatisticallySignificant,
            },
        }
    };

    Decision {
        recommendation,
        stop: None,
        new_alerts,
    }
}

/// Append an alert candidate unless the experiment already carries an equal
/// (metric, severity) alert, mirroring `Experiment::push_alert`.
fn push_candidate(experiment: &Experiment, out: &mut Vec<Alert>, alert: Alert) {
    let exists = experiment
        .alerts()
        .iter()
        .chain(out.iter())
        .any(|a| a.metric == alert.metric && a.severity == alert.severity);
    if !exists {
        out.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ExperimentConfig;
    use crate::stats::analyzer::{InvalidReason, MetricKind};

    fn experiment(required: u64) -> Experiment {
        let cfg = ExperimentConfig {
            name: "e".into(),
            hypothesis: "h".into(),
            test_variant: "v".into(),
            primary_metrics: vec!["m".into()],
            guardrail_metrics: vec!["errors".into()],
            ..ExperimentConfig::default()
        };
        let mut exp = Experiment::new("exp-1".into(), &cfg, required);
        exp.activate();
        exp
    }

    fn metric(role: MetricRole, p: f64, diff: f64, rel: Option<f64>, alpha: f64) -> MetricAnalysis {
        MetricAnalysis {
            metric: if role == MetricRole::GuardRail {
                "errors".into()
            } else {
                "m".into()
            },
            role,
            kind: MetricKind::Continuous,
            control_count: 500,
            test_count: 500,
            control_mean: 1.0,
            test_mean: 1.0 + diff,
            difference: diff,
            relative_change: rel,
            standard_error: 0.1,
            statistic: diff / 0.1,
            degrees_of_freedom: Some(998.0),
            p_value: p,
            confidence_interval: (diff - 0.2, diff + 0.2),
            effect_size: diff,
            significant: p < alpha,
            valid: true,
            invalid_reason: None,
        }
    }

    #[test]
    fn test_insufficient_samples_continues() {
        let exp = experiment(10_000);
        let m = metric(MetricRole::Primary, 0.04, 0.1, Some(0.1), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.04));
        assert_eq!(
            d.recommendation,
            Recommendation::Continue {
                reason: ContinueReason::InsufficientSampleSize
            }
        );
        assert!(d.stop.is_none());
    }

    #[test]
    fn test_significant_positive_deploys() {
        // Zero required samples: the ladder reaches the significance branch.
        let exp = experiment(0);
        let m = metric(MetricRole::Primary, 0.02, 0.1, Some(0.1), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.02));
        assert_eq!(d.recommendation, Recommendation::Deploy);
        assert!(d.stop.is_none());
    }

    #[test]
    fn test_significant_negative_rejects() {
        let exp = experiment(0);
        let m = metric(MetricRole::Primary, 0.02, -0.05, Some(-0.05), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.02));
        assert_eq!(d.recommendation, Recommendation::Reject);
        assert!(d.stop.is_none());
    }

    #[test]
    fn test_not_significant_continues() {
        let exp = experiment(0);
        let m = metric(MetricRole::Primary, 0.4, 0.02, Some(0.02), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.4));
        assert_eq!(
            d.recommendation,
            Recommendation::Continue {
                reason: ContinueReason::NotStatisticallySignificant
            }
        );
    }

    #[test]
    fn test_early_stop_on_strong_signal() {
        let exp = experiment(10_000);
        // p far below alpha * 0.1, positive difference, samples still short.
        let m = metric(MetricRole::Primary, 0.0001, 0.1, Some(0.1), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.0001));
        assert_eq!(d.recommendation, Recommendation::Deploy);
        assert_eq!(d.stop, Some(CompletionReason::EarlyStopping));
    }

    #[test]
    fn test_early_stop_on_negative_impact() {
        let exp = experiment(10_000);
        let m = metric(MetricRole::Primary, 0.001, -0.15, Some(-0.15), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[m], Some(0.001));
        assert_eq!(d.recommendation, Recommendation::Reject);
        assert_eq!(d.stop, Some(CompletionReason::EarlyStopping));
    }

    #[test]
    fn test_guardrail_blocking_stops() {
        let exp = experiment(10_000);
        let primary = metric(MetricRole::Primary, 0.0001, 0.1, Some(0.1), exp.alpha());
        let guard = metric(MetricRole::GuardRail, 0.001, -0.13, Some(-0.137), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[primary, guard], Some(0.0001));
        // Safety wins over the strong positive primary signal.
        assert_eq!(d.stop, Some(CompletionReason::GuardRails));
        assert_eq!(d.recommendation, Recommendation::Reject);
        assert_eq!(d.new_alerts.len(), 1);
        assert_eq!(d.new_alerts[0].severity, AlertSeverity::Blocking);
    }

    #[test]
    fn test_guardrail_warning_does_not_stop() {
        let exp = experiment(0);
        let primary = metric(MetricRole::Primary, 0.02, 0.1, Some(0.1), exp.alpha());
        let guard = metric(MetricRole::GuardRail, 0.2, -0.07, Some(-0.07), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[primary, guard], Some(0.02));
        assert!(d.stop.is_none());
        assert_eq!(d.recommendation, Recommendation::Deploy);
        assert_eq!(d.new_alerts.len(), 1);
        assert_eq!(d.new_alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_insignificant_guardrail_regression_only_warns() {
        // Past the blocking threshold but not significant: warning only.
        let exp = experiment(0);
        let guard = metric(MetricRole::GuardRail, 0.3, -0.2, Some(-0.2), exp.alpha());
        let d = evaluate(&EngineConfig::default(), &exp, &[guard], None);
        assert!(d.stop.is_none());
        assert_eq!(d.new_alerts.len(), 1);
        assert_eq!(d.new_alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_invalid_metrics_are_ignored() {
        let exp = experiment(0);
        let mut m = metric(MetricRole::Primary, 0.001, -0.5, Some(-0.5), exp.alpha());
        m.valid = false;
        m.invalid_reason = Some(InvalidReason::InsufficientData);
        m.significant = false;
        let d = evaluate(&EngineConfig::default(), &exp, &[m], None);
        assert!(d.stop.is_none());
        assert_eq!(
            d.recommendation,
            Recommendation::Continue {
                reason: ContinueReason::NotStatisticallySignificant
            }
        );
    }
}
