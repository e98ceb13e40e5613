//! Per-timestep aggregation of Monte Carlo samples into a `Distribution`
//! summary (spec §4.5 "Aggregation"): mean, sample std, median, min, max, and
//! a configurable percentile set via the nearest-rank method.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<(f64, f64)>,
    /// Raw per-run samples, retained only when the caller opts in
    /// (spec §3 "optional sample arrays").
    pub samples: Option<Vec<f64>>,
}

/// Nearest-rank percentile over an already-sorted slice. `p` is in `[0, 100]`.
pub fn nearest_rank_percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// Summarises one `(variable|impact, timestep)`'s sample set (spec §4.5's
/// per-timestep aggregation). `samples` need not be pre-sorted; `retain_samples`
/// controls whether the raw array survives in the returned `Distribution`.
pub fn summarize(samples: &[f64], percentiles: &[f64], retain_samples: bool) -> Distribution {
    let n = samples.len();
    if n == 0 {
        return Distribution {
            mean: 0.0,
            std: 0.0,
            median: 0.0,
            min: 0.0,
            max: 0.0,
            percentiles: percentiles.iter().map(|p| (*p, 0.0)).collect(),
            samples: retain_samples.then(Vec::new),
        };
    }

    let mean = samples.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        var.sqrt()
    } else {
        0.0
    };

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median = nearest_rank_percentile(&sorted, 50.0);
    let min = sorted[0];
    let max = sorted[n - 1];
    let percentile_values = percentiles.iter().map(|&p| (p, nearest_rank_percentile(&sorted, p))).collect();

    Distribution {
        mean,
        std,
        median,
        min,
        max,
        percentiles: percentile_values,
        samples: if retain_samples { Some(sorted) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_deterministic_samples_has_zero_std() {
        let samples = vec![100.0; 50];
        let dist = summarize(&samples, &[5.0, 50.0, 95.0], false);
        assert_eq!(dist.mean, 100.0);
        assert_eq!(dist.std, 0.0);
        assert_eq!(dist.min, 100.0);
        assert_eq!(dist.max, 100.0);
    }

    #[test]
    fn nearest_rank_percentile_matches_known_values() {
        let sorted: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        assert_eq!(nearest_rank_percentile(&sorted, 50.0), 5.0);
        assert_eq!(nearest_rank_percentile(&sorted, 100.0), 10.0);
        assert_eq!(nearest_rank_percentile(&sorted, 1.0), 1.0);
    }

    #[test]
    fn summarize_retains_samples_only_when_requested() {
        let samples = vec![1.0, 2.0, 3.0];
        let without = summarize(&samples, &[50.0], false);
        assert!(without.samples.is_none());
        let with = summarize(&samples, &[50.0], true);
        assert_eq!(with.samples.unwrap().len(), 3);
    }

    #[test]
    fn empty_samples_summarize_to_zero() {
        let dist = summarize(&[], &[5.0, 95.0], false);
        assert_eq!(dist.mean, 0.0);
        assert_eq!(dist.percentiles, vec![(5.0, 0.0), (95.0, 0.0)]);
    }
}
