//! Statistical calibration tests
//!
//! Under the null hypothesis (identical distributions) the tests must
//! reject at roughly the nominal rate and produce roughly uniform p-values.
//! Seeded generators keep these deterministic.

use ensayo::stats::analyzer::{analyze_metric, MetricRole};
use ensayo::stats::OnlineStats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Standard normal via Box-Muller.
fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[test]
fn welch_null_rejection_rate_is_nominal() {
    let mut rng = StdRng::seed_from_u64(42);
    let trials = 2000;
    let n = 100;
    let mut rejections = 0;

    for _ in 0..trials {
        let mut control = OnlineStats::new();
        let mut test = OnlineStats::new();
        for _ in 0..n {
            control.push(10.0 + normal(&mut rng));
            test.push(10.0 + normal(&mut rng));
        }
        let a = analyze_metric("m", MetricRole::Primary, &control, &test, 0.05);
        if a.significant {
            rejections += 1;
        }
    }

    // Nominal rate 5% of 2000 = 100; allow a wide band around the
    // binomial standard deviation (~9.7).
    assert!(
        (55..=150).contains(&rejections),
        "null rejection rate off nominal: {rejections}/{trials}"
    );
}

#[test]
fn proportion_null_p_values_are_roughly_uniform() {
    let mut rng = StdRng::seed_from_u64(7);
    let trials = 1000;
    let n = 500;
    let mut p_values = Vec::with_capacity(trials);

    for _ in 0..trials {
        let mut control = OnlineStats::new();
        let mut test = OnlineStats::new();
        for _ in 0..n {
            control.push(f64::from(u8::from(rng.gen_bool(0.3))));
            test.push(f64::from(u8::from(rng.gen_bool(0.3))));
        }
        let a = analyze_metric("m", MetricRole::Primary, &control, &test, 0.05);
        p_values.push(a.p_value);
    }

    let below_half = p_values.iter().filter(|&&p| p < 0.5).count();
    let below_alpha = p_values.iter().filter(|&&p| p < 0.05).count();
    let mean_p = p_values.iter().sum::<f64>() / p_values.len() as f64;

    assert!(
        (400..=600).contains(&below_half),
        "P(p < 0.5) far from half: {below_half}/{trials}"
    );
    assert!(
        (20..=90).contains(&below_alpha),
        "P(p < 0.05) far from nominal: {below_alpha}/{trials}"
    );
    assert!((0.40..=0.60).contains(&mean_p), "mean p off-center: {mean_p}");
}

#[test]
fn welch_detects_a_real_shift() {
    // Power sanity: a half-sigma shift at n=200 per arm is detected
    // essentially always.
    let mut rng = StdRng::seed_from_u64(3);
    let mut detected = 0;
    let trials = 200;
    for _ in 0..trials {
        let mut control = OnlineStats::new();
        let mut test = OnlineStats::new();
        for _ in 0..200 {
            control.push(normal(&mut rng));
            test.push(0.5 + normal(&mut rng));
        }
        let a = analyze_metric("m", MetricRole::Primary, &control, &test, 0.05);
        if a.significant && a.difference > 0.0 {
            detected += 1;
        }
    }
    assert!(detected >= 195, "power too low: {detected}/{trials}");
}
