//! Distribution functions for hypothesis testing
//!
//! Hand-rolled, dependency-free implementations of the few special functions
//! the analyzer needs. Accuracy notes, since these sit under deploy/reject
//! verdicts:
//!
//! - [`normal_cdf`] uses the Abramowitz–Stegun 7.1.26 erf approximation,
//!   absolute error < 1.5e-7
//! - [`inverse_normal_cdf`] is Acklam's rational approximation, relative
//!   error < 1.15e-9 across (0, 1)
//! - [`student_t_two_sided_p`] evaluates the exact t CDF through the
//!   regularized incomplete beta function (Lanczos log-gamma + Lentz
//!   continued fraction), not a normal-approximation shortcut; above
//!   df = 200 it hands off to the normal CDF, where the curves agree to
//!   about 1e-4
//! - [`t_critical`] uses the Cornish–Fisher expansion of the t quantile in
//!   powers of 1/df; error is below 1e-3 for df >= 8 and the value is
//!   slightly conservative (wider intervals) for smaller df

/// Error function, Abramowitz & Stegun approximation 7.1.26.
#[must_use]
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Inverse of the standard normal CDF (Acklam's algorithm).
///
/// Returns the z such that `normal_cdf(z) == p`. Clamps degenerate inputs:
/// p <= 0 maps to negative infinity, p >= 1 to positive infinity.
#[must_use]
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -((((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0))
    }
}

/// Natural log of the gamma function (Lanczos, g = 7, 9 coefficients).
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula.
        return std::f64::consts::PI.ln()
            - (std::f64::consts::PI * x).sin().ln()
            - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut acc = COEF[0];
    for (i, c) in COEF.iter().enumerate().skip(1) {
        #[allow(clippy::cast_precision_loss)]
        {
            acc += c / (x + i as f64);
        }
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn betacf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3e-14;
    const FPMIN: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        #[allow(clippy::cast_precision_loss)]
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
#[must_use]
pub fn reg_inc_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_bt = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let bt = ln_bt.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        bt * betacf(a, b, x) / a
    } else {
        1.0 - bt * betacf(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value for a t statistic with `df` degrees of freedom.
///
/// Exact t CDF (`P(|T| >= |t|) = I_{df/(df+t^2)}(df/2, 1/2)`) below
/// df = 200, normal approximation above.
#[must_use]
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    if df <= 0.0 {
        return 1.0;
    }
    if df > 200.0 {
        return 2.0 * (1.0 - normal_cdf(t.abs()));
    }
    reg_inc_beta(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0)
}

/// Two-sided critical value of the t distribution at significance `alpha`.
///
/// Cornish–Fisher expansion around the normal quantile in powers of 1/df.
#[must_use]
pub fn t_critical(df: f64, alpha: f64) -> f64 {
    let z = inverse_normal_cdf(1.0 - alpha / 2.0);
    if !z.is_finite() || df <= 0.0 {
        return z;
    }
    let z2 = z * z;
    let z3 = z2 * z;
    let z5 = z3 * z2;
    let z7 = z5 * z2;
    let z9 = z7 * z2;
    let g1 = (z3 + z) / 4.0;
    let g2 = (5.0 * z5 + 16.0 * z3 + 3.0 * z) / 96.0;
    let g3 = (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / 384.0;
    let g4 = (79.0 * z9 + 776.0 * z7 + 1482.0 * z5 - 1920.0 * z3 - 945.0 * z) / 92_160.0;
    z + g1 / df + g2 / (df * df) + g3 / df.powi(3) + g4 / df.powi(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_at_zero_is_half() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn normal_cdf_at_196_is_about_975() {
        assert!((normal_cdf(1.96) - 0.975_002).abs() < 1e-4);
    }

    #[test]
    fn normal_cdf_symmetry() {
        for x in [0.3, 1.0, 2.5, 4.0] {
            assert!((normal_cdf(x) + normal_cdf(-x) - 1.0).abs() < 1e-7);
        }
    }

    #[test]
    fn inverse_normal_known_quantiles() {
        assert!((inverse_normal_cdf(0.975) - 1.959_964).abs() < 1e-5);
        assert!((inverse_normal_cdf(0.95) - 1.644_854).abs() < 1e-5);
        assert!((inverse_normal_cdf(0.8) - 0.841_621).abs() < 1e-5);
        assert!((inverse_normal_cdf(0.5)).abs() < 1e-9);
    }

    #[test]
    fn inverse_normal_round_trip() {
        for p in [0.01, 0.025, 0.05, 0.1, 0.3, 0.5, 0.7, 0.9, 0.95, 0.975, 0.99] {
            let z = inverse_normal_cdf(p);
            assert!(
                (normal_cdf(z) - p).abs() < 1e-6,
                "round trip failed at p={p}: z={z}"
            );
        }
    }

    #[test]
    fn ln_gamma_known_values() {
        // Gamma(1) = 1, Gamma(0.5) = sqrt(pi), Gamma(5) = 24
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn t_p_value_matches_tables() {
        // Two-sided critical points: P(|T| >= t) = 0.05
        assert!((student_t_two_sided_p(2.228, 10.0) - 0.05).abs() < 5e-4);
        assert!((student_t_two_sided_p(2.042, 30.0) - 0.05).abs() < 5e-4);
        assert!((student_t_two_sided_p(12.706, 1.0) - 0.05).abs() < 2e-3);
    }

    #[test]
    fn t_p_value_limits() {
        assert!((student_t_two_sided_p(0.0, 10.0) - 1.0).abs() < 1e-9);
        assert!(student_t_two_sided_p(50.0, 10.0) < 1e-8);
        // Large df converges to the normal tail.
        let p_normal = 2.0 * (1.0 - normal_cdf(1.96));
        assert!((student_t_two_sided_p(1.96, 5000.0) - p_normal).abs() < 1e-9);
    }

    #[test]
    fn t_critical_matches_tables() {
        assert!((t_critical(10.0, 0.05) - 2.228).abs() < 1e-3);
        assert!((t_critical(30.0, 0.05) - 2.042).abs() < 1e-3);
        assert!((t_critical(1000.0, 0.05) - 1.962).abs() < 1e-3);
    }
}
