//! Normal, Gamma and Beta samplers driven by a [`RandomSource`].
//!
//! Gamma uses Marsaglia & Tsang (2000), "A simple method for generating gamma
//! variables", with the `U^(1/shape)` boost for `shape < 1`. Beta is the ratio
//! of two independent Gamma draws.

use crate::random::RandomSource;
use menu_bandit_core::{BanditError, BanditResult};
use std::f64::consts::PI;

/// Smallest uniform draw fed to `ln` or `powf`.
const MIN_UNIFORM: f64 = f64::MIN_POSITIVE;

/// Standard normal draw via Box–Muller.
pub fn sample_normal<R: RandomSource + ?Sized>(rng: &R) -> f64 {
    let u1 = rng.uniform().max(MIN_UNIFORM);
    let u2 = rng.uniform();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Draw from Gamma(shape, 1).
pub fn sample_gamma<R: RandomSource + ?Sized>(rng: &R, shape: f64) -> BanditResult<f64> {
    if !shape.is_finite() || shape <= 0.0 {
        return Err(BanditError::InvalidArgument(format!(
            "gamma shape must be finite and > 0, got {shape}"
        )));
    }
    Ok(gamma_unchecked(rng, shape))
}

fn gamma_unchecked<R: RandomSource + ?Sized>(rng: &R, shape: f64) -> f64 {
    if shape < 1.0 {
        let u = rng.uniform().max(MIN_UNIFORM);
        return gamma_unchecked(rng, shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    loop {
        let x = sample_normal(rng);
        let t = 1.0 + c * x;
        if t <= 0.0 {
            continue;
        }
        let v = t * t * t;
        let u = rng.uniform();
        let x2 = x * x;

        // Squeeze
        if u < 1.0 - 0.0331 * x2 * x2 {
            return d * v;
        }
        if u.max(MIN_UNIFORM).ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Draw from Beta(alpha, beta). The result lies in `(0, 1)`.
pub fn sample_beta<R: RandomSource + ?Sized>(rng: &R, alpha: f64, beta: f64) -> BanditResult<f64> {
    let ga = sample_gamma(rng, alpha)?;
    let gb = sample_gamma(rng, beta)?;
    let total = ga + gb;
    if total <= 0.0 {
        // Both draws underflowed; only reachable with tiny shapes.
        return Ok(alpha / (alpha + beta));
    }
    Ok(ga / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{ScriptedRandom, SeededRandom};

    fn mean(xs: &[f64]) -> f64 {
        xs.iter().sum::<f64>() / xs.len() as f64
    }

    #[test]
    fn test_normal_moments() {
        let rng = SeededRandom::new(11);
        let draws: Vec<f64> = (0..20_000).map(|_| sample_normal(&rng)).collect();
        let m = mean(&draws);
        let var = draws.iter().map(|x| (x - m).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(m.abs() < 0.05, "mean {m}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn test_normal_guards_zero_uniform() {
        let rng = ScriptedRandom::new(vec![0.0, 0.0]);
        assert!(sample_normal(&rng).is_finite());
    }

    #[test]
    fn test_gamma_mean_matches_shape() {
        let rng = SeededRandom::new(3);
        for shape in [1.0, 3.0, 12.5] {
            let draws: Vec<f64> = (0..20_000)
                .map(|_| sample_gamma(&rng, shape).unwrap())
                .collect();
            assert!(draws.iter().all(|x| *x > 0.0));
            let m = mean(&draws);
            assert!((m - shape).abs() < 0.1 * shape.max(1.0), "shape {shape} mean {m}");
        }
    }

    #[test]
    fn test_gamma_small_shape_boost() {
        let rng = SeededRandom::new(5);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| sample_gamma(&rng, 0.5).unwrap())
            .collect();
        assert!(draws.iter().all(|x| *x >= 0.0 && x.is_finite()));
        let m = mean(&draws);
        assert!((m - 0.5).abs() < 0.05, "mean {m}");
    }

    #[test]
    fn test_gamma_rejects_bad_shape() {
        let rng = SeededRandom::new(1);
        assert!(matches!(
            sample_gamma(&rng, 0.0),
            Err(BanditError::InvalidArgument(_))
        ));
        assert!(sample_gamma(&rng, -1.0).is_err());
        assert!(sample_gamma(&rng, f64::NAN).is_err());
        assert!(sample_beta(&rng, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_beta_uniform_histogram() {
        let rng = SeededRandom::new(2024);
        let n = 20_000;
        let mut bins = [0usize; 10];
        let mut draws = Vec::with_capacity(n);
        for _ in 0..n {
            let x = sample_beta(&rng, 1.0, 1.0).unwrap();
            assert!(x > 0.0 && x < 1.0);
            bins[((x * 10.0) as usize).min(9)] += 1;
            draws.push(x);
        }
        for (i, count) in bins.iter().enumerate() {
            let freq = *count as f64 / n as f64;
            assert!((freq - 0.1).abs() < 0.015, "bin {i} frequency {freq}");
        }

        // Kolmogorov–Smirnov distance against U(0,1).
        draws.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ks = draws
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let lo = (x - i as f64 / n as f64).abs();
                let hi = ((i + 1) as f64 / n as f64 - x).abs();
                lo.max(hi)
            })
            .fold(0.0f64, f64::max);
        assert!(ks < 0.02, "KS distance {ks}");
    }

    #[test]
    fn test_beta_mean() {
        let rng = SeededRandom::new(9);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| sample_beta(&rng, 2.0, 5.0).unwrap())
            .collect();
        let m = mean(&draws);
        assert!((m - 2.0 / 7.0).abs() < 0.02, "mean {m}");
    }
}
