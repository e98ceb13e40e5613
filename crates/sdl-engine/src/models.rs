//! Growth-model evaluation (spec §4.5 step 4): `linear`, `exponential`,
//! `logistic`, `sigmoid`, `polynomial`, each evaluated at a single timestep `t`
//! relative to the scenario's first timestep `t0`.

use sdl_core::ModelKind;
use sdl_parser::Model;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model {kind:?} is missing required parameter `{param}`")]
    MissingParam { kind: ModelKind, param: &'static str },
}

/// Named parameters of a `Model`, already evaluated to `f64` against the run's
/// environment (so a parameter value can itself reference an assumption).
pub type ModelParams = HashMap<String, f64>;

fn get<'a>(params: &'a ModelParams, kind: ModelKind, name: &'static str) -> Result<f64, ModelError> {
    params.get(name).copied().ok_or(ModelError::MissingParam { kind, param: name })
}

/// Evaluates `model` at timestep `t`, where `t0` is the scenario's first
/// timestep (`linear`/`exponential`/`logistic` are all parameterised relative
/// to `t - t0`).
pub fn evaluate(model: &Model, params: &ModelParams, t: f64, t0: f64) -> Result<f64, ModelError> {
    let dt = t - t0;
    match model.kind {
        ModelKind::Linear => {
            let slope = get(params, model.kind, "slope")?;
            let intercept = get(params, model.kind, "intercept")?;
            Ok(intercept + slope * dt)
        }
        ModelKind::Exponential => {
            let rate = get(params, model.kind, "rate")?;
            let base = get(params, model.kind, "base")?;
            Ok(base * (rate * dt).exp())
        }
        ModelKind::Logistic | ModelKind::Sigmoid => {
            let k = get(params, model.kind, "k")?;
            let midpoint = get(params, model.kind, "midpoint")?;
            let max = get(params, model.kind, "max")?;
            Ok(max / (1.0 + (-k * (t - midpoint)).exp()))
        }
        ModelKind::Polynomial => {
            // Coefficients were flattened into `c0, c1, c2, ...` by the parser
            // (lowest degree first); evaluate via Horner's method.
            let mut coeffs: Vec<(usize, f64)> = params
                .iter()
                .filter_map(|(k, v)| k.strip_prefix('c').and_then(|n| n.parse::<usize>().ok()).map(|i| (i, *v)))
                .collect();
            coeffs.sort_by_key(|(i, _)| *i);
            let mut acc = 0.0;
            for (_, c) in coeffs.into_iter().rev() {
                acc = acc * dt + c;
            }
            Ok(acc)
        }
    }
}

/// Helper for callers that have not yet resolved named params against an
/// environment (e.g. they are all numeric literals): evaluates each
/// param expression with the given evaluator function.
pub fn resolve_params<E>(model: &Model, mut eval_one: E) -> Result<ModelParams, ()>
where
    E: FnMut(&sdl_parser::Expr) -> Option<f64>,
{
    let mut out = HashMap::new();
    for (name, expr) in &model.params {
        match expr.kind {
            sdl_parser::ExprKind::Model(ref inner) if name == "coeffs" => {
                for (cname, cexpr) in &inner.params {
                    out.insert(cname.clone(), eval_one(cexpr).ok_or(())?);
                }
            }
            _ => {
                out.insert(name.clone(), eval_one(expr).ok_or(())?);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdl_parser::parse;

    fn model_from(src: &str) -> Model {
        let full = format!(
            r#"scenario "T" {{ timeframe: 2020 -> 2030 variable x {{ model: {src} }} simulate {{ runs: 1 seed: 1 }} }}"#
        );
        let (scenario, diags) = parse(&full);
        assert!(!diags.has_errors(), "{diags:?}");
        let scenario = scenario.unwrap();
        scenario
            .declarations
            .iter()
            .find_map(|d| match d {
                sdl_parser::Declaration::Variable(v) => v.model.clone(),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn linear_model_evaluates_intercept_plus_slope_times_dt() {
        let model = model_from("linear(slope: 10, intercept: 100)");
        let params: ModelParams = [("slope".to_string(), 10.0), ("intercept".to_string(), 100.0)].into();
        assert_eq!(evaluate(&model, &params, 2025.0, 2025.0).unwrap(), 100.0);
        assert_eq!(evaluate(&model, &params, 2030.0, 2025.0).unwrap(), 150.0);
    }

    #[test]
    fn exponential_model_grows_by_rate() {
        let model = model_from("exponential(rate: 0.1, base: 100)");
        let params: ModelParams = [("rate".to_string(), 0.1), ("base".to_string(), 100.0)].into();
        let v0 = evaluate(&model, &params, 2025.0, 2025.0).unwrap();
        let v1 = evaluate(&model, &params, 2026.0, 2025.0).unwrap();
        assert_eq!(v0, 100.0);
        assert!(v1 > v0);
    }

    #[test]
    fn logistic_model_approaches_max_at_large_t() {
        let model = model_from("logistic(k: 1, midpoint: 2025, max: 200)");
        let params: ModelParams =
            [("k".to_string(), 1.0), ("midpoint".to_string(), 2025.0), ("max".to_string(), 200.0)].into();
        let late = evaluate(&model, &params, 2060.0, 2025.0).unwrap();
        assert!(late > 199.0 && late <= 200.0);
    }

    #[test]
    fn polynomial_model_horner_evaluates_correctly() {
        let model = model_from("polynomial(coeffs: [1, 2, 3])");
        // 1 + 2*dt + 3*dt^2, at dt=2: 1 + 4 + 12 = 17
        let params: ModelParams =
            [("c0".to_string(), 1.0), ("c1".to_string(), 2.0), ("c2".to_string(), 3.0)].into();
        assert_eq!(evaluate(&model, &params, 2027.0, 2025.0).unwrap(), 17.0);
    }

    #[test]
    fn missing_param_is_reported() {
        let model = model_from("linear(slope: 10, intercept: 100)");
        let params = ModelParams::new();
        let err = evaluate(&model, &params, 2025.0, 2025.0).unwrap_err();
        assert!(matches!(err, ModelError::MissingParam { .. }));
    }
}
