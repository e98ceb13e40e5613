//! Bayesian calibration of `normal` uncertainty priors against observed data
//! (spec §4.8). Produces a new AST; the original is never mutated.

use std::collections::HashMap;

use chrono::Datelike;
use sdl_core::{DistributionKind, Position, Span};
use sdl_parser::{Calibrate, CalibrateMethod, Declaration, Distribution, Expr, ExprKind, Scenario};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::ObservedPoint;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibrate target {0:?} has no matching assumption declaration")]
    UnknownTarget(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub target: String,
    pub original_distribution: DistributionSnapshot,
    pub calibrated_distribution: DistributionSnapshot,
    pub data_points_used: usize,
    pub posterior_mean: f64,
    pub posterior_std: f64,
}

/// A serialisable summary of a `Distribution` AST node (spec's
/// `CalibrationResult` reports distributions, not raw spans).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub kind: String,
    pub relative: bool,
    pub mean: f64,
    pub std: f64,
}

/// A target skipped during calibration, with the reason (spec §7: "Invalid
/// calibration prior: skip target with warning; continue").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSkip {
    pub target: String,
    pub reason: String,
}

fn synthetic_span() -> Span {
    Span::point(Position::start())
}

fn parse_window_years(window: Option<&str>) -> Option<i64> {
    let window = window?;
    let digits: String = window.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok()
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 1e-6);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt().max(1e-6))
}

/// Extracts `(mu0, sigma0, relative)` from a `normal` prior. Returns `None`
/// for any other distribution kind, or a prior whose params this crate
/// cannot interpret — both are surfaced as a skip, not an error.
fn normal_prior_params(dist: &Distribution, declared_value: f64) -> Option<(f64, f64, bool)> {
    if dist.kind != DistributionKind::Normal {
        return None;
    }
    match dist.params.as_slice() {
        [p] => match &p.kind {
            ExprKind::Percentage(pct) => Some((declared_value, declared_value.abs() * pct / 100.0, true)),
            _ => None,
        },
        [mu, sigma] => match (&mu.kind, &sigma.kind) {
            (ExprKind::Number(mu), ExprKind::Number(sigma)) => Some((*mu, *sigma, false)),
            _ => None,
        },
        _ => None,
    }
}

fn rebuild_distribution(kind: DistributionKind, mean: f64, std: f64, relative: bool, span: Span) -> Distribution {
    let params = if relative {
        let percent = if mean.abs() > f64::EPSILON { 100.0 * std / mean.abs() } else { 0.0 };
        vec![Expr::new(ExprKind::Percentage(percent), span)]
    } else {
        vec![
            Expr::new(ExprKind::Number(mean), span),
            Expr::new(ExprKind::Number(std), span),
        ]
    };
    Distribution { kind, params, span }
}

fn snapshot(dist: &Distribution, mean: f64, std: f64, relative: bool) -> DistributionSnapshot {
    DistributionSnapshot {
        kind: format!("{:?}", dist.kind).to_lowercase(),
        relative,
        mean,
        std,
    }
}

/// Runs every `calibrate` declaration in `scenario` against `observed`,
/// producing a new scenario (uncertainty fields replaced) plus the set of
/// successful calibrations and skipped targets. Declaration order is
/// preserved both for determinism (spec §5: "calibrator applies targets in
/// declaration order") and because the original scenario's declaration
/// vector is cloned, not rebuilt.
pub fn calibrate(
    scenario: &Scenario,
    observed: &HashMap<String, Vec<ObservedPoint>>,
) -> Result<(Scenario, Vec<CalibrationResult>, Vec<CalibrationSkip>), CalibrationError> {
    let mut calibrated = scenario.clone();
    let mut results = Vec::new();
    let mut skips = Vec::new();

    let calibrations: Vec<&Calibrate> = scenario
        .declarations
        .iter()
        .filter_map(|d| match d {
            Declaration::Calibrate(c) => Some(c),
            _ => None,
        })
        .collect();

    for calibrate_decl in calibrations {
        let target = &calibrate_decl.target;
        let Some(points) = observed.get(target) else {
            skips.push(CalibrationSkip {
                target: target.clone(),
                reason: "no observed data for this target".to_string(),
            });
            continue;
        };

        let years = parse_window_years(calibrate_decl.window.as_deref());
        let windowed: Vec<&ObservedPoint> = match (years, points.iter().map(|p| p.date).max()) {
            (Some(years), Some(latest)) => points
                .iter()
                .filter(|p| (latest.year() - p.date.year()) < years as i32)
                .collect(),
            _ => points.iter().collect(),
        };
        if windowed.is_empty() {
            skips.push(CalibrationSkip {
                target: target.clone(),
                reason: "no observed points fall inside the calibration window".to_string(),
            });
            continue;
        }

        let assumption = calibrated.declarations.iter_mut().find_map(|d| match d {
            Declaration::Assumption(a) if a.name == *target => Some(a),
            _ => None,
        });
        let Some(assumption) = assumption else {
            return Err(CalibrationError::UnknownTarget(target.clone()));
        };

        let declared_value = match &assumption.value.kind {
            ExprKind::Number(n) => *n,
            ExprKind::Percentage(p) => *p,
            _ => {
                skips.push(CalibrationSkip {
                    target: target.clone(),
                    reason: "declared value is not a constant this calibrator can read".to_string(),
                });
                continue;
            }
        };

        let Some(prior) = assumption.uncertainty.as_ref() else {
            skips.push(CalibrationSkip {
                target: target.clone(),
                reason: "assumption has no uncertainty distribution to calibrate".to_string(),
            });
            continue;
        };

        let Some((mu0, sigma0, relative)) = normal_prior_params(prior, declared_value) else {
            skips.push(CalibrationSkip {
                target: target.clone(),
                reason: "only normal priors are calibrated; this one is passed through unchanged".to_string(),
            });
            continue;
        };

        let values: Vec<f64> = windowed.iter().map(|p| p.value).collect();
        let n = values.len() as f64;
        let (sample_mean, sample_std) = mean_and_std(&values);

        let (posterior_mean, posterior_std) = match calibrate_decl.method {
            CalibrateMethod::BayesianUpdate => {
                let tau = 1.0 / sigma0.powi(2) + n / sample_std.powi(2);
                let mean = (mu0 / sigma0.powi(2) + n * sample_mean / sample_std.powi(2)) / tau;
                (mean, (1.0 / tau).sqrt())
            }
            CalibrateMethod::MaximumLikelihood => (sample_mean, sample_std),
            CalibrateMethod::Ensemble => {
                let w = (n / 20.0).min(0.7);
                let mean = (1.0 - w) * mu0 + w * sample_mean;
                let std = (1.0 - w * 0.5) * sigma0;
                (mean, std)
            }
        };

        let original_distribution = prior.clone();
        let span = assumption.uncertainty.as_ref().map(|d| d.span).unwrap_or_else(synthetic_span);
        let calibrated_distribution = rebuild_distribution(prior.kind, posterior_mean, posterior_std, relative, span);

        results.push(CalibrationResult {
            target: target.clone(),
            original_distribution: snapshot(&original_distribution, mu0, sigma0, relative),
            calibrated_distribution: snapshot(&calibrated_distribution, posterior_mean, posterior_std, relative),
            data_points_used: windowed.len(),
            posterior_mean,
            posterior_std,
        });

        assumption.uncertainty = Some(calibrated_distribution);
    }

    Ok((calibrated, results, skips))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario_with_normal_prior(uncertainty_src: &str) -> Scenario {
        let src = format!(
            r#"
            scenario "Calibration" {{
                timeframe: 2020 -> 2025
                assumption growth {{
                    value: 10
                    uncertainty: {uncertainty_src}
                }}
                calibrate growth {{
                    url: "https://ec.europa.eu/eurostat/api/foo"
                    method: "bayesian_update"
                    window: "5y"
                }}
                simulate {{ runs: 100 seed: 1 }}
            }}
            "#
        );
        let (scenario, diags) = sdl_parser::parse(&src);
        assert!(!diags.has_errors(), "{diags:?}");
        scenario.expect("scenario should parse")
    }

    fn points_at(value: f64, years: &[i32]) -> Vec<ObservedPoint> {
        years
            .iter()
            .map(|y| ObservedPoint {
                date: NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(),
                value,
                source: "test".to_string(),
                provisional: false,
            })
            .collect()
    }

    #[test]
    fn bayesian_posterior_matches_prior_mean_when_observations_agree() {
        let scenario = scenario_with_normal_prior("normal(10, 2)");
        let mut observed = HashMap::new();
        observed.insert("growth".to_string(), points_at(10.0, &[2021, 2022, 2023]));

        let (_, results, skips) = calibrate(&scenario, &observed).unwrap();
        assert!(skips.is_empty());
        let result = &results[0];
        assert!((result.posterior_mean - 10.0).abs() < 1e-6);
        assert!(result.posterior_std < 2.0);
    }

    #[test]
    fn relative_prior_is_rewritten_as_relative() {
        let scenario = scenario_with_normal_prior("normal(±15%)");
        let mut observed = HashMap::new();
        observed.insert("growth".to_string(), points_at(12.0, &[2021, 2022, 2023]));

        let (calibrated, results, _) = calibrate(&scenario, &observed).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].calibrated_distribution.relative);

        let assumption = calibrated.declarations.iter().find_map(|d| match d {
            Declaration::Assumption(a) if a.name == "growth" => Some(a),
            _ => None,
        }).unwrap();
        let uncertainty = assumption.uncertainty.as_ref().unwrap();
        assert!(matches!(uncertainty.params.as_slice(), [p] if matches!(p.kind, ExprKind::Percentage(_))));
    }

    #[test]
    fn non_normal_prior_is_skipped() {
        let scenario = scenario_with_normal_prior("uniform(5, 15)");
        let mut observed = HashMap::new();
        observed.insert("growth".to_string(), points_at(10.0, &[2021, 2022]));

        let (_, results, skips) = calibrate(&scenario, &observed).unwrap();
        assert!(results.is_empty());
        assert_eq!(skips.len(), 1);
    }

    #[test]
    fn target_with_no_observed_data_is_skipped() {
        let scenario = scenario_with_normal_prior("normal(10, 2)");
        let observed = HashMap::new();

        let (_, results, skips) = calibrate(&scenario, &observed).unwrap();
        assert!(results.is_empty());
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].target, "growth");
    }
}
