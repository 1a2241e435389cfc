//! Statistical Analyzer - per-metric hypothesis tests
//!
//! Compares two [`OnlineStats`] snapshots (control vs. test) for one metric:
//!
//! - continuous metrics: Welch's t-test (unequal variances), exact t CDF
//! - proportion metrics (all observed values exactly 0 or 1, detected
//!   automatically): two-proportion z-test, pooled standard error
//!
//! Both paths produce a difference, a relative change, a confidence interval,
//! an effect size, and a two-sided p-value. A metric with zero samples in
//! either variant is reported with `valid = false` rather than failing the
//! whole analysis.

use serde::{Deserialize, Serialize};

use super::dist;
use super::online::OnlineStats;

/// Which hypothesis test was applied to a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Arbitrary real values; Welch's t-test.
    Continuous,
    /// Values restricted to {0, 1}; two-proportion z-test.
    Proportion,
}

/// How a metric participates in the experiment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricRole {
    /// Drives the overall Bonferroni-corrected decision.
    Primary,
    /// Analyzed and reported, informational only.
    Secondary,
    /// Critical metric watched for regressions; can force termination.
    GuardRail,
}

/// Why a metric analysis is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Zero samples in at least one variant.
    InsufficientData,
}

/// Outcome of one per-metric hypothesis test.
///
/// Derived data - recomputed on demand from aggregator snapshots, never a
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnalysis {
    /// Metric name.
    pub metric: String,
    /// Role of the metric in the experiment decision.
    pub role: MetricRole,
    /// Which test was applied.
    pub kind: MetricKind,
    /// Control-variant sample count for this metric.
    pub control_count: u64,
    /// Test-variant sample count for this metric.
    pub test_count: u64,
    /// Control-variant running mean.
    pub control_mean: f64,
    /// Test-variant running mean.
    pub test_mean: f64,
    /// `test_mean - control_mean`.
    pub difference: f64,
    /// `difference / control_mean`; `None` when the control mean is zero.
    pub relative_change: Option<f64>,
    /// Standard error of the difference (pooled for proportions).
    pub standard_error: f64,
    /// t statistic (continuous) or z statistic (proportion).
    pub statistic: f64,
    /// Welch-Satterthwaite degrees of freedom; `None` for proportions.
    pub degrees_of_freedom: Option<f64>,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Confidence interval for the difference at the experiment's level.
    pub confidence_interval: (f64, f64),
    /// Cohen's d (continuous) or standardized proportion difference.
    pub effect_size: f64,
    /// `p_value < alpha`.
    pub significant: bool,
    /// Whether the analysis is usable.
    pub valid: bool,
    /// Reason the analysis is unusable, when `valid` is false.
    pub invalid_reason: Option<InvalidReason>,
}

impl MetricAnalysis {
    fn insufficient(metric: &str, role: MetricRole, control: &OnlineStats, test: &OnlineStats) -> Self {
        Self {
            metric: metric.to_string(),
            role,
            kind: MetricKind::Continuous,
            control_count: control.count(),
            test_count: test.count(),
            control_mean: control.mean(),
            test_mean: test.mean(),
            difference: 0.0,
            relative_change: None,
            standard_error: 0.0,
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
            confidence_interval: (0.0, 0.0),
            effect_size: 0.0,
            significant: false,
            valid: false,
            invalid_reason: Some(InvalidReason::InsufficientData),
        }
    }
}

/// Run the appropriate hypothesis test for one metric.
///
/// Selects the two-proportion z-test when every observed value in both
/// variants is exactly 0 or 1, Welch's t-test otherwise. Reports
/// `valid = false` with [`InvalidReason::InsufficientData`] when either
/// variant has zero samples.
#[must_use]
pub fn analyze_metric(
    metric: &str,
    role: MetricRole,
    control: &OnlineStats,
    test: &OnlineStats,
    alpha: f64,
) -> MetricAnalysis {
    if control.is_empty() || test.is_empty() {
        return MetricAnalysis::insufficient(metric, role, control, test);
    }
    if control.is_binary() && test.is_binary() {
        two_proportion_z_test(metric, role, control, test, alpha)
    } else {
        welch_t_test(metric, role, control, test, alpha)
    }
}

/// Welch's two-sample t-test (unequal-variance assumption).
fn welch_t_test(
    metric: &str,
    role: MetricRole,
    control: &OnlineStats,
    test: &OnlineStats,
    alpha: f64,
) -> MetricAnalysis {
    #[allow(clippy::cast_precision_loss)]
    let (nc, nt) = (control.count() as f64, test.count() as f64);
    let (vc, vt) = (control.variance(), test.variance());
    let difference = test.mean() - control.mean();
    let relative_change = if control.mean() == 0.0 {
        None
    } else {
        Some(difference / control.mean())
    };

    let se = (vc / nc + vt / nt).sqrt();
    if se == 0.0 {
        return degenerate(
            metric,
            role,
            MetricKind::Continuous,
            control,
            test,
            difference,
            relative_change,
            alpha,
        );
    }

    let t = difference / se;
    let df = welch_satterthwaite(nc, vc, nt, vt);
    let p_value = dist::student_t_two_sided_p(t, df);
    let t_crit = dist::t_critical(df, alpha);
    let confidence_interval = (difference - t_crit * se, difference + t_crit * se);

    // Cohen's d with pooled standard deviation.
    let pooled_var = ((nc - 1.0) * vc + (nt - 1.0) * vt) / (nc + nt - 2.0);
    let effect_size = if pooled_var > 0.0 {
        difference / pooled_var.sqrt()
    } else {
        0.0
    };

    MetricAnalysis {
        metric: metric.to_string(),
        role,
        kind: MetricKind::Continuous,
        control_count: control.count(),
        test_count: test.count(),
        control_mean: control.mean(),
        test_mean: test.mean(),
        difference,
        relative_change,
        standard_error: se,
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value,
        confidence_interval,
        effect_size,
        significant: p_value < alpha,
        valid: true,
        invalid_reason: None,
    }
}

/// Welch-Satterthwaite degrees of freedom, with a pooled-df fallback when a
/// variant has a single sample (zero variance contribution denominator).
fn welch_satterthwaite(nc: f64, vc: f64, nt: f64, vt: f64) -> f64 {
    let num = (vc / nc + vt / nt).powi(2);
    let den = if nc > 1.0 && nt > 1.0 {
        (vc / nc).powi(2) / (nc - 1.0) + (vt / nt).powi(2) / (nt - 1.0)
    } else {
        0.0
    };
    if den > 0.0 && num.is_finite() {
        num / den
    } else {
        (nc + nt - 2.0).max(1.0)
    }
}

/// Two-proportion z-test on binary metrics.
fn two_proportion_z_test(
    metric: &str,
    role: MetricRole,
    control: &OnlineStats,
    test: &OnlineStats,
    alpha: f64,
) -> MetricAnalysis {
    #[allow(clippy::cast_precision_loss)]
    let (nc, nt) = (control.count() as f64, test.count() as f64);
    let (pc, pt) = (control.mean(), test.mean());
    let difference = pt - pc;
    let relative_change = if pc == 0.0 { None } else { Some(difference / pc) };

    let successes_control = (pc * nc).round();
    let successes_test = (pt * nt).round();
    let pooled = (successes_control + successes_test) / (nc + nt);
    let se_pooled = (pooled * (1.0 - pooled) * (1.0 / nc + 1.0 / nt)).sqrt();
    if se_pooled == 0.0 {
        return degenerate(
            metric,
            role,
            MetricKind::Proportion,
            control,
            test,
            difference,
            relative_change,
            alpha,
        );
    }

    let z = difference / se_pooled;
    let p_value = (2.0 * (1.0 - dist::normal_cdf(z.abs()))).clamp(0.0, 1.0);

    // CI uses unpooled variances.
    let se_unpooled = (pc * (1.0 - pc) / nc + pt * (1.0 - pt) / nt).sqrt();
    let z_crit = dist::inverse_normal_cdf(1.0 - alpha / 2.0);
    let confidence_interval = (
        difference - z_crit * se_unpooled,
        difference + z_crit * se_unpooled,
    );

    let effect_size = difference / (pooled * (1.0 - pooled)).sqrt();

    MetricAnalysis {
        metric: metric.to_string(),
        role,
        kind: MetricKind::Proportion,
        control_count: control.count(),
        test_count: test.count(),
        control_mean: pc,
        test_mean: pt,
        difference,
        relative_change,
        standard_error: se_pooled,
        statistic: z,
        degrees_of_freedom: None,
        p_value,
        confidence_interval,
        effect_size,
        significant: p_value < alpha,
        valid: true,
        invalid_reason: None,
    }
}

/// Zero standard error: both variants constant. The test statistic is
/// undefined, so report certainty about whatever the observed difference is
/// without ever emitting NaN.
#[allow(clippy::too_many_arguments)]
fn degenerate(
    metric: &str,
    role: MetricRole,
    kind: MetricKind,
    control: &OnlineStats,
    test: &OnlineStats,
    difference: f64,
    relative_change: Option<f64>,
    alpha: f64,
) -> MetricAnalysis {
    let p_value = if difference == 0.0 { 1.0 } else { 0.0 };
    MetricAnalysis {
        metric: metric.to_string(),
        role,
        kind,
        control_count: control.count(),
        test_count: test.count(),
        control_mean: control.mean(),
        test_mean: test.mean(),
        difference,
        relative_change,
        standard_error: 0.0,
        statistic: 0.0,
        degrees_of_freedom: None,
        p_value,
        confidence_interval: (difference, difference),
        effect_size: 0.0,
        significant: p_value < alpha,
        valid: true,
        invalid_reason: None,
    }
}

/// Bonferroni-corrected overall p-value across a metric family.
///
/// `min(p) * count`, capped at 1.0. Conservative family-wise error control
/// when several primary metrics are evaluated simultaneously; the documented
/// trade-off is reduced power per additional metric. Returns `None` for an
/// empty family.
#[must_use]
pub fn bonferroni(p_values: &[f64]) -> Option<f64> {
    let min = p_values.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        #[allow(clippy::cast_precision_loss)]
        Some((min * p_values.len() as f64).min(1.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[f64]) -> OnlineStats {
        let mut s = OnlineStats::new();
        for &v in values {
            s.push(v);
        }
        s
    }

    /// Two-point construction: n/2 samples at mean - sd and n/2 at mean + sd
    /// gives the exact mean and a sample variance of n/(n-1) * sd^2.
    fn two_point(n: usize, mean: f64, sd: f64) -> OnlineStats {
        let mut s = OnlineStats::new();
        for i in 0..n {
            if i % 2 == 0 {
                s.push(mean - sd);
            } else {
                s.push(mean + sd);
            }
        }
        s
    }

    #[test]
    fn test_welch_known_small_sample() {
        // control [1..5], test [2..6]: se = 1.0, t = 1.0, df = 8, p ~ 0.3466
        let control = feed(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let test = feed(&[2.0, 3.0, 4.0, 5.0, 6.0]);
        let a = analyze_metric("latency", MetricRole::Primary, &control, &test, 0.05);
        assert_eq!(a.kind, MetricKind::Continuous);
        assert!((a.difference - 1.0).abs() < 1e-12);
        assert!((a.statistic - 1.0).abs() < 1e-12);
        assert!((a.degrees_of_freedom.unwrap() - 8.0).abs() < 1e-9);
        assert!((a.p_value - 0.3466).abs() < 5e-3);
        assert!(!a.significant);
    }

    #[test]
    fn test_welch_strong_signal() {
        // Approximates control mean=100 var=400 n=1000 vs test mean=110
        // var=420 n=1000: difference 10, relative +10%, p far below 0.001.
        let control = two_point(1000, 100.0, 400.0_f64.sqrt());
        let test = two_point(1000, 110.0, 420.0_f64.sqrt());
        let a = analyze_metric("answer_quality", MetricRole::Primary, &control, &test, 0.05);
        assert!((a.difference - 10.0).abs() < 1e-9);
        assert!((a.relative_change.unwrap() - 0.10).abs() < 1e-9);
        assert!(a.p_value < 0.001);
        assert!(a.significant);
        // CI excludes zero.
        assert!(a.confidence_interval.0 > 0.0);
    }

    #[test]
    fn test_proportion_path_detected() {
        let mut control = OnlineStats::new();
        let mut test = OnlineStats::new();
        for i in 0..100 {
            control.push(f64::from(u8::from(i % 5 < 2))); // 40%
            test.push(f64::from(u8::from(i % 5 < 3))); // 60%
        }
        let a = analyze_metric("clicked", MetricRole::Primary, &control, &test, 0.05);
        assert_eq!(a.kind, MetricKind::Proportion);
        assert!((a.difference - 0.2).abs() < 1e-12);
        // z = 0.2 / sqrt(0.25 * 0.02) ~ 2.828, p ~ 0.0047
        assert!((a.statistic - 2.828).abs() < 1e-2);
        assert!(a.p_value < 0.01);
        assert!((a.effect_size - 0.4).abs() < 1e-9);
        assert!(a.degrees_of_freedom.is_none());
    }

    #[test]
    fn test_zero_samples_is_insufficient_data() {
        let empty = OnlineStats::new();
        let test = feed(&[1.0, 2.0]);
        let a = analyze_metric("m", MetricRole::Secondary, &empty, &test, 0.05);
        assert!(!a.valid);
        assert_eq!(a.invalid_reason, Some(InvalidReason::InsufficientData));
        assert!(!a.significant);
        assert!((a.p_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_control_mean_guards_relative_change() {
        let control = feed(&[0.0, 0.0, 0.0, 0.0]);
        let test = feed(&[0.5, 1.5, 0.5, 1.5]);
        let a = analyze_metric("m", MetricRole::Primary, &control, &test, 0.05);
        assert!(a.relative_change.is_none());
        assert!(a.valid);
    }

    #[test]
    fn test_degenerate_constant_samples() {
        let control = feed(&[5.0, 5.0, 5.0]);
        let test = feed(&[5.0, 5.0, 5.0]);
        let a = analyze_metric("m", MetricRole::Primary, &control, &test, 0.05);
        assert!(a.valid);
        assert!((a.p_value - 1.0).abs() < f64::EPSILON);
        assert!(!a.significant);
        assert!(a.p_value.is_finite() && a.statistic.is_finite());
    }

    #[test]
    fn test_bonferroni_bounds() {
        let overall = bonferroni(&[0.01, 0.2, 0.6]).unwrap();
        assert!((overall - 0.03).abs() < 1e-12);
        assert!(overall >= 0.01);
        assert!(bonferroni(&[0.9, 0.8]).unwrap() <= 1.0);
        assert!(bonferroni(&[]).is_none());
    }
}
