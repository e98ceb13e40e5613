use crate::rng::Rng;
use sdl_core::DistributionKind;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("distribution {kind:?} requires {expected} argument(s), got {actual}")]
    ArityMismatch { kind: DistributionKind, expected: &'static str, actual: usize },
}

fn standard_normal(rng: &mut Rng) -> f64 {
    let u1 = rng.next_f64().max(f64::MIN_POSITIVE);
    let u2 = rng.next_f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// `normal(σ)` where `σ` is a *relative* percentage of `base_mean`: the
/// returned sample is `μ + N(0, μ·p/100)`.
pub fn normal_relative(rng: &mut Rng, base_mean: f64, percent: f64) -> f64 {
    let sigma = base_mean * percent / 100.0;
    base_mean + sigma * standard_normal(rng)
}

/// `normal(μ, σ)`, absolute parameterisation.
pub fn normal_absolute(rng: &mut Rng, mu: f64, sigma: f64) -> f64 {
    mu + sigma * standard_normal(rng)
}

/// `lognormal(μ, σ)`: `exp(N(μ, σ))`.
pub fn lognormal(rng: &mut Rng, mu: f64, sigma: f64) -> f64 {
    normal_absolute(rng, mu, sigma).exp()
}

/// Marsaglia-Tsang gamma sampler, used to build the beta sampler below.
fn gamma_sample(rng: &mut Rng, shape: f64) -> f64 {
    if shape < 1.0 {
        let u = rng.next_f64().max(f64::MIN_POSITIVE);
        return gamma_sample(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x = standard_normal(rng);
            let v = 1.0 + c * x;
            if v > 0.0 {
                break (x, v);
            }
        };
        let v3 = v * v * v;
        let u = rng.next_f64();
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v3;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v3 + v3.ln()) {
            return d * v3;
        }
    }
}

/// `beta(α, β)`: two gamma draws via Marsaglia-Tsang, combined as a ratio.
pub fn beta(rng: &mut Rng, alpha: f64, beta_param: f64) -> f64 {
    let x = gamma_sample(rng, alpha);
    let y = gamma_sample(rng, beta_param);
    x / (x + y)
}

/// `uniform(a, b)`: linear mapping of a uniform `[0, 1)` draw.
pub fn uniform(rng: &mut Rng, a: f64, b: f64) -> f64 {
    a + (b - a) * rng.next_f64()
}

/// `triangular(a, b, c)`: inverse-CDF sampling with mode `c`.
pub fn triangular(rng: &mut Rng, a: f64, b: f64, c: f64) -> f64 {
    let u = rng.next_f64();
    let fc = (c - a) / (b - a);
    if u < fc {
        a + ((b - a) * (c - a) * u).sqrt()
    } else {
        b - ((b - a) * (b - c) * (1.0 - u)).sqrt()
    }
}

/// Draws one sample from a closed-set distribution given its evaluated
/// parameters. `base_mean` supplies the reference value for a relative
/// (single-argument) `normal`; it is ignored by every other kind.
pub fn sample(
    rng: &mut Rng,
    kind: DistributionKind,
    params: &[f64],
    base_mean: f64,
) -> Result<f64, SampleError> {
    match (kind, params) {
        (DistributionKind::Normal, [percent]) => Ok(normal_relative(rng, base_mean, *percent)),
        (DistributionKind::Normal, [mu, sigma]) => Ok(normal_absolute(rng, *mu, *sigma)),
        (DistributionKind::Normal, other) => {
            Err(SampleError::ArityMismatch { kind, expected: "1 or 2", actual: other.len() })
        }
        (DistributionKind::Lognormal, [mu, sigma]) => Ok(lognormal(rng, *mu, *sigma)),
        (DistributionKind::Lognormal, other) => {
            Err(SampleError::ArityMismatch { kind, expected: "2", actual: other.len() })
        }
        (DistributionKind::Beta, [a, b]) => Ok(beta(rng, *a, *b)),
        (DistributionKind::Beta, other) => {
            Err(SampleError::ArityMismatch { kind, expected: "2", actual: other.len() })
        }
        (DistributionKind::Uniform, [a, b]) => Ok(uniform(rng, *a, *b)),
        (DistributionKind::Uniform, other) => {
            Err(SampleError::ArityMismatch { kind, expected: "2", actual: other.len() })
        }
        (DistributionKind::Triangular, [a, b, c]) => Ok(triangular(rng, *a, *b, *c)),
        (DistributionKind::Triangular, other) => {
            Err(SampleError::ArityMismatch { kind, expected: "3", actual: other.len() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_normal_has_mean_near_zero_and_std_near_one() {
        let mut rng = Rng::from_seed(1);
        let n = 100_000;
        let samples: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        assert!((-0.02..=0.02).contains(&mean), "mean was {mean}");
        assert!((0.98..=1.02).contains(&var.sqrt()), "std was {}", var.sqrt());
    }

    #[test]
    fn normal_relative_scales_sigma_by_base_mean() {
        let mut rng = Rng::from_seed(2);
        let samples: Vec<f64> = (0..50_000).map(|_| normal_relative(&mut rng, 100.0, 10.0)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((90.0..=110.0).contains(&mean), "mean was {mean}");
    }

    #[test]
    fn beta_samples_are_bounded_in_unit_interval() {
        let mut rng = Rng::from_seed(3);
        for _ in 0..1000 {
            let x = beta(&mut rng, 2.0, 5.0);
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn triangular_samples_are_bounded_by_endpoints() {
        let mut rng = Rng::from_seed(4);
        for _ in 0..1000 {
            let x = triangular(&mut rng, 10.0, 20.0, 15.0);
            assert!((10.0..=20.0).contains(&x));
        }
    }

    #[test]
    fn sample_rejects_wrong_arity() {
        let mut rng = Rng::from_seed(5);
        let err = sample(&mut rng, DistributionKind::Beta, &[1.0], 0.0).unwrap_err();
        assert!(matches!(err, SampleError::ArityMismatch { .. }));
    }

    #[test]
    fn deterministic_with_same_seed() {
        let mut r1 = Rng::from_seed(99);
        let mut r2 = Rng::from_seed(99);
        let a = sample(&mut r1, DistributionKind::Uniform, &[0.0, 1.0], 0.0).unwrap();
        let b = sample(&mut r2, DistributionKind::Uniform, &[0.0, 1.0], 0.0).unwrap();
        assert_eq!(a, b);
    }
}
