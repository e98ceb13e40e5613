//! The Monte Carlo engine (spec §4.5): drives N independent runs, each
//! sampling assumptions, evolving variables across the scenario's time grid,
//! deriving impacts, and evaluating branch activation, then aggregates
//! per-timestep distributions across runs.

use crate::aggregate::summarize;
use crate::config::{ramp, SimulationConfig};
use crate::eval::{eval, Environment};
use crate::interpolation::interpolate;
use crate::models;
use crate::result::{
    BranchResult, ConvergenceDiagnostics, SimulationResult, TimestepRecord, VarResult,
};
use rayon::prelude::*;
use sdl_parser::{Assumption, Branch, Declaration, Impact, Parameter, Scenario, Variable};
use sdl_sampler::{hash_path_component, sample as sample_distribution, Rng};
use sdl_validator::{SymbolKind, ValidationResult};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("refusing to simulate: scenario did not pass validation")]
    InvalidAst,
    #[error("more than half of runs ({failed}/{total}) failed expression evaluation")]
    TooManyFailedRuns { failed: u32, total: u32 },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Flat lookup tables over a scenario's top-level declarations. Branch-nested
/// declarations are deliberately excluded: override application is an
/// explicit future extension (spec §9 Open Question (c)), so the engine's
/// per-run evolution only ever touches top-level assumptions, parameters,
/// variables, and impacts.
struct Declarations<'a> {
    assumptions: Vec<&'a Assumption>,
    parameters: HashMap<&'a str, &'a Parameter>,
    variables: HashMap<&'a str, &'a Variable>,
    impacts: HashMap<&'a str, &'a Impact>,
    branches: Vec<&'a Branch>,
}

fn collect_declarations(decls: &[Declaration]) -> Declarations<'_> {
    let mut out = Declarations {
        assumptions: Vec::new(),
        parameters: HashMap::new(),
        variables: HashMap::new(),
        impacts: HashMap::new(),
        branches: Vec::new(),
    };
    for decl in decls {
        match decl {
            Declaration::Assumption(a) => out.assumptions.push(a),
            Declaration::Parameter(p) => {
                out.parameters.insert(p.name.as_str(), p);
            }
            Declaration::Variable(v) => {
                out.variables.insert(v.name.as_str(), v);
            }
            Declaration::Impact(i) => {
                out.impacts.insert(i.name.as_str(), i);
            }
            Declaration::Branch(b) => out.branches.push(b),
            Declaration::Calibrate(_) | Declaration::Watch(_) | Declaration::Simulate(_) => {}
        }
    }
    out
}

/// Per-run accumulated samples, merged into the aggregate buffers only when
/// the run completes without an expression-evaluation error.
struct RunOutcome {
    variables: HashMap<String, Vec<f64>>,
    impacts: HashMap<String, Vec<f64>>,
    branch_activations: HashMap<String, bool>,
}

/// Runs the Monte Carlo simulation over a validated scenario (spec §4.5
/// "Contract"). The engine refuses to simulate an AST that did not pass
/// validation (spec §7).
#[instrument(skip(scenario, validation, config), fields(scenario = %scenario.name, runs = config.runs))]
pub fn run(
    scenario: &Scenario,
    validation: &ValidationResult,
    config: &SimulationConfig,
) -> EngineResult<SimulationResult> {
    if !validation.valid {
        return Err(EngineError::InvalidAst);
    }

    let started = std::time::Instant::now();
    let decls = collect_declarations(&scenario.declarations);

    let timesteps: Vec<i32> = {
        let mut ts = Vec::new();
        let mut y = scenario.timeframe.start_year;
        while y <= scenario.timeframe.end_year {
            ts.push(y);
            y += scenario.resolution as i32;
        }
        ts
    };
    let last_idx = timesteps.len().saturating_sub(1);
    let t0 = timesteps.first().copied().unwrap_or(0) as f64;

    let topo_order = validation.causal_graph.topological_sort().unwrap_or_default();
    let impact_order: Vec<&str> =
        topo_order.iter().filter(|n| decls.impacts.contains_key(n.as_str())).map(|n| n.as_str()).collect();

    let root_rng = Rng::from_seed(config.seed);

    debug!(runs = config.runs, timesteps = timesteps.len(), "starting monte carlo batch");

    let outcomes: Vec<Option<RunOutcome>> = (0..config.runs)
        .into_par_iter()
        .map(|run_index| {
            run_single(run_index, &decls, &impact_order, &timesteps, t0, last_idx, &validation.symbol_table, config, &root_rng)
        })
        .collect();

    let total_runs = outcomes.len() as u32;
    let successes: Vec<RunOutcome> = outcomes.into_iter().flatten().collect();
    let failed_runs = total_runs - successes.len() as u32;
    if total_runs > 0 && failed_runs as f64 / total_runs as f64 > 0.5 {
        warn!(failed_runs, total_runs, "majority of runs failed expression evaluation");
        return Err(EngineError::TooManyFailedRuns { failed: failed_runs, total: total_runs });
    }

    let variables = aggregate_series(&decls.variables.keys().map(|s| s.to_string()).collect::<Vec<_>>(), &successes, &timesteps, config, |o, name| o.variables.get(name));
    let impacts = aggregate_series(&decls.impacts.keys().map(|s| s.to_string()).collect::<Vec<_>>(), &successes, &timesteps, config, |o, name| o.impacts.get(name));

    let mut branches = HashMap::new();
    for b in &decls.branches {
        let activated = successes.iter().filter(|o| *o.branch_activations.get(&b.name).unwrap_or(&false)).count();
        let rate = if successes.is_empty() { 0.0 } else { activated as f64 / successes.len() as f64 };
        branches.insert(
            b.name.clone(),
            BranchResult { name: b.name.clone(), activation_rate: rate, trigger_probability: b.probability },
        );
    }

    let (converged, convergence_diagnostics) = match config.convergence {
        Some(eps) => {
            let (converged, diag) = check_convergence(&successes, &variables, eps);
            (Some(converged), Some(diag))
        }
        None => (None, None),
    };

    Ok(SimulationResult {
        scenario_name: scenario.name.clone(),
        runs: config.runs,
        seed: config.seed,
        elapsed_ms: started.elapsed().as_millis() as u64,
        timesteps,
        variables,
        impacts,
        branches,
        converged,
        convergence_diagnostics,
        failed_runs,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_single(
    run_index: u32,
    decls: &Declarations<'_>,
    impact_order: &[&str],
    timesteps: &[i32],
    t0: f64,
    last_idx: usize,
    symbols: &sdl_validator::SymbolTable,
    config: &SimulationConfig,
    root_rng: &Rng,
) -> Option<RunOutcome> {
    let run_rng = root_rng.sub_rng(&[run_index as u64]);
    let mut base_env: Environment = Environment::new();

    // Step 2: sample assumptions.
    for a in &decls.assumptions {
        let base = eval(&a.value, &base_env).ok()?;
        let value = match &a.uncertainty {
            Some(dist) => {
                let mut sub = run_rng.sub_rng(&[hash_path_component(&a.name)]);
                let params: Vec<f64> = dist.params.iter().map(|p| eval(p, &base_env)).collect::<Result<_, _>>().ok()?;
                sample_distribution(&mut sub, dist.kind, &params, base).ok()?
            }
            None => base,
        };
        base_env.insert(a.name.clone(), value);
    }

    // Step 3: resolve parameters (declared value is always the current value;
    // the baseline used for delta computation lives in `config`).
    for p in decls.parameters.values() {
        base_env.insert(p.name.clone(), p.value);
    }

    let mut variable_samples: HashMap<String, Vec<f64>> = HashMap::new();
    let mut impact_samples: HashMap<String, Vec<f64>> = HashMap::new();
    let mut branch_activations: HashMap<String, bool> = HashMap::new();
    let mut final_env: Environment = base_env.clone();

    // Anchor points may themselves be expressions over assumptions/parameters;
    // they do not vary by timestep, so resolve once per run.
    let mut resolved_anchors: HashMap<&str, Vec<(i32, f64)>> = HashMap::new();
    for v in decls.variables.values() {
        let mut anchors: Vec<(i32, f64)> =
            v.timeseries.iter().map(|(y, e)| eval(e, &base_env).map(|val| (*y, val))).collect::<Result<_, _>>().ok()?;
        anchors.sort_by_key(|(y, _)| *y);
        resolved_anchors.insert(v.name.as_str(), anchors);
    }

    for (t_idx, &year) in timesteps.iter().enumerate() {
        let mut local_env = base_env.clone();

        for v in decls.variables.values() {
            let base = if let Some(model) = &v.model {
                let params = models::resolve_params(model, |e| eval(e, &base_env).ok()).ok()?;
                models::evaluate(model, &params, year as f64, t0).ok()?
            } else {
                interpolate(&resolved_anchors[v.name.as_str()], v.interpolation, year as f64)
            };

            let mut modulated = base;
            for dep in &v.depends_on {
                if symbols.kind_of(&dep.name) != Some(SymbolKind::Parameter) {
                    continue;
                }
                let v_cur = *base_env.get(&dep.name)?;
                let v_def = config.parameter_defaults.get(&dep.name).copied().unwrap_or(v_cur);
                if v_def == 0.0 {
                    continue;
                }
                let delta = (v_cur - v_def) / v_def;
                let sensitivity = dep.sensitivity.unwrap_or(config.default_sensitivity);
                modulated *= 1.0 + sensitivity * delta * ramp(t_idx, last_idx);
            }

            let mut value = match &v.uncertainty {
                Some(dist) => {
                    let mut sub = run_rng.sub_rng(&[hash_path_component(&v.name), t_idx as u64]);
                    let params: Vec<f64> =
                        dist.params.iter().map(|p| eval(p, &base_env)).collect::<Result<_, _>>().ok()?;
                    sample_distribution(&mut sub, dist.kind, &params, modulated).ok()?
                }
                None => modulated,
            };
            if v.non_negative {
                value = value.max(0.0);
            }

            local_env.insert(v.name.clone(), value);
            variable_samples.entry(v.name.clone()).or_insert_with(|| vec![0.0; timesteps.len()])[t_idx] = value;
        }

        for &name in impact_order {
            let impact = decls.impacts[name];
            let value = eval(&impact.formula, &local_env).ok()?;
            local_env.insert(impact.name.clone(), value);
            impact_samples.entry(impact.name.clone()).or_insert_with(|| vec![0.0; timesteps.len()])[t_idx] = value;
        }

        if t_idx == timesteps.len() - 1 {
            final_env = local_env;
        }
    }

    for b in &decls.branches {
        let activated = eval(&b.when, &final_env).map(|v| v != 0.0).ok()?;
        branch_activations.insert(b.name.clone(), activated);
    }

    Some(RunOutcome { variables: variable_samples, impacts: impact_samples, branch_activations })
}

fn aggregate_series(
    names: &[String],
    successes: &[RunOutcome],
    timesteps: &[i32],
    config: &SimulationConfig,
    select: impl for<'r> Fn(&'r RunOutcome, &str) -> Option<&'r Vec<f64>>,
) -> HashMap<String, VarResult> {
    let mut out = HashMap::new();
    for name in names {
        let mut timestep_records = Vec::with_capacity(timesteps.len());
        for (t_idx, &year) in timesteps.iter().enumerate() {
            let samples: Vec<f64> = successes
                .iter()
                .filter_map(|o| select(o, name).and_then(|v| v.get(t_idx)).copied())
                .collect();
            let distribution = summarize(&samples, &config.percentiles, config.retain_samples);
            timestep_records.push(TimestepRecord { year, distribution });
        }
        out.insert(name.clone(), VarResult { name: name.clone(), timesteps: timestep_records });
    }
    out
}

fn check_convergence(
    successes: &[RunOutcome],
    variables: &HashMap<String, VarResult>,
    eps: f64,
) -> (bool, ConvergenceDiagnostics) {
    let mut relative_deltas = HashMap::new();
    let mut converged = true;
    let half = successes.len() / 2;

    for (name, result) in variables {
        let Some(final_record) = result.timesteps.last() else { continue };
        let overall_mean = final_record.distribution.mean;
        let final_idx = result.timesteps.len() - 1;

        let first_half: Vec<f64> =
            successes[..half].iter().filter_map(|o| o.variables.get(name).and_then(|v| v.get(final_idx))).copied().collect();
        let second_half: Vec<f64> =
            successes[half..].iter().filter_map(|o| o.variables.get(name).and_then(|v| v.get(final_idx))).copied().collect();

        let mean_of = |xs: &[f64]| if xs.is_empty() { 0.0 } else { xs.iter().sum::<f64>() / xs.len() as f64 };
        let delta = if overall_mean.abs() > f64::EPSILON {
            (mean_of(&first_half) - mean_of(&second_half)).abs() / overall_mean.abs()
        } else {
            0.0
        };
        if delta > eps {
            converged = false;
        }
        relative_deltas.insert(name.clone(), delta);
    }

    (converged, ConvergenceDiagnostics { tolerance: eps, relative_deltas })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdl_parser::parse;
    use sdl_validator::validate;

    fn run_scenario(src: &str, config: SimulationConfig) -> SimulationResult {
        let (scenario, diags) = parse(src);
        assert!(!diags.has_errors(), "{diags:?}");
        let scenario = scenario.unwrap();
        let validation = validate(&scenario);
        assert!(validation.valid, "{:?}", validation.diagnostics);
        run(&scenario, &validation, &config).unwrap()
    }

    #[test]
    fn minimal_scenario_matches_spec_end_to_end_case_1() {
        let src = r#"
            scenario "M" {
                timeframe: 2025 -> 2030
                variable x { 2025: 100 2030: 200 uncertainty: normal(±10%) }
                simulate { runs: 100 seed: 42 }
            }
        "#;
        let result = run_scenario(src, SimulationConfig::default().with_runs(100).with_seed(42));
        assert_eq!(result.timesteps.len(), 6);
        let x = &result.variables["x"];
        let first = &x.timesteps[0].distribution;
        let last = x.timesteps.last().unwrap();
        assert!((90.0..=110.0).contains(&first.mean), "mean was {}", first.mean);
        assert!((180.0..=220.0).contains(&last.distribution.mean), "mean was {}", last.distribution.mean);
        assert!(first.std > 0.0);
    }

    #[test]
    fn deterministic_variable_has_zero_std_and_constant_mean() {
        let src = r#"
            scenario "D" {
                timeframe: 2025 -> 2027
                variable x { 2025: 100 2027: 100 }
                simulate { runs: 50 seed: 1 }
            }
        "#;
        let result = run_scenario(src, SimulationConfig::default().with_runs(50).with_seed(1));
        for record in &result.variables["x"].timesteps {
            assert_eq!(record.distribution.std, 0.0);
            assert_eq!(record.distribution.mean, 100.0);
        }
    }

    #[test]
    fn linear_model_matches_spec_end_to_end_case_3() {
        let src = r#"
            scenario "L" {
                timeframe: 2025 -> 2030
                variable x { model: linear(slope: 10, intercept: 100) }
                simulate { runs: 10 seed: 1 }
            }
        "#;
        let result = run_scenario(src, SimulationConfig::default().with_runs(10).with_seed(1));
        let x = &result.variables["x"];
        let first = x.timesteps[0].distribution.mean;
        let last = x.timesteps.last().unwrap().distribution.mean;
        assert!((first - 100.0).abs() < 10.0, "first was {first}");
        assert!((last - 150.0).abs() < 10.0, "last was {last}");
    }

    #[test]
    fn parameter_override_amplifies_trajectory_case_4() {
        let src = r#"
            scenario "P" {
                timeframe: 2025 -> 2030
                parameter p { value: 50 control: slider }
                variable x { 2025: 100 2030: 200 depends_on: [p] }
                simulate { runs: 20 seed: 3 }
            }
        "#;
        let config = SimulationConfig::default().with_runs(20).with_seed(3).with_parameter_default("p", 25.0);
        let result = run_scenario(src, config);
        let last_mean = result.variables["x"].timesteps.last().unwrap().distribution.mean;
        assert!(last_mean > 200.0 * 1.1, "expected amplified mean, got {last_mean}");
    }

    #[test]
    fn parameter_default_equal_to_declared_leaves_trajectory_unmodulated() {
        let src = r#"
            scenario "P0" {
                timeframe: 2025 -> 2030
                parameter p { value: 50 control: slider }
                variable x { 2025: 100 2030: 200 depends_on: [p] }
                simulate { runs: 20 seed: 3 }
            }
        "#;
        let baseline = run_scenario(src, SimulationConfig::default().with_runs(20).with_seed(3));
        let modulated_to_self =
            run_scenario(src, SimulationConfig::default().with_runs(20).with_seed(3).with_parameter_default("p", 50.0));
        let a = baseline.variables["x"].timesteps.last().unwrap().distribution.mean;
        let b = modulated_to_self.variables["x"].timesteps.last().unwrap().distribution.mean;
        assert!((a - b).abs() / a.max(1.0) < 0.02);
    }

    #[test]
    fn branch_activation_rate_reflects_variable_growth_case_5() {
        let src = r#"
            scenario "B" {
                timeframe: 2025 -> 2030
                variable x { 2025: 20 2030: 80 uncertainty: normal(±20%) }
                branch "High" when x > 50 { probability: 0.4 }
                simulate { runs: 500 seed: 11 }
            }
        "#;
        let result = run_scenario(src, SimulationConfig::default().with_runs(500).with_seed(11));
        let branch = &result.branches["High"];
        assert!((0.3..=1.0).contains(&branch.activation_rate), "rate was {}", branch.activation_rate);
    }

    #[test]
    fn same_seed_is_bit_identical_across_invocations() {
        let src = r#"
            scenario "Det" {
                timeframe: 2025 -> 2030
                variable x { 2025: 100 2030: 200 uncertainty: normal(±10%) }
                simulate { runs: 200 seed: 99 }
            }
        "#;
        let a = run_scenario(src, SimulationConfig::default().with_runs(200).with_seed(99));
        let b = run_scenario(src, SimulationConfig::default().with_runs(200).with_seed(99));
        for (name, va) in &a.variables {
            let vb = &b.variables[name];
            for (ra, rb) in va.timesteps.iter().zip(&vb.timesteps) {
                assert_eq!(ra.distribution.mean, rb.distribution.mean);
                assert_eq!(ra.distribution.std, rb.distribution.std);
            }
        }
    }

    #[test]
    fn different_seeds_diverge_on_uncertain_variable() {
        let src = r#"
            scenario "Div" {
                timeframe: 2025 -> 2030
                variable x { 2025: 100 2030: 200 uncertainty: normal(±10%) }
                simulate { runs: 200 }
            }
        "#;
        let a = run_scenario(src, SimulationConfig::default().with_runs(200).with_seed(1));
        let b = run_scenario(src, SimulationConfig::default().with_runs(200).with_seed(2));
        let ma = a.variables["x"].timesteps.last().unwrap().distribution.mean;
        let mb = b.variables["x"].timesteps.last().unwrap().distribution.mean;
        assert_ne!(ma, mb);
    }

    #[test]
    fn invalid_ast_refuses_to_simulate() {
        let src = r#"
            scenario "Invalid" {
                timeframe: 2025 -> 2030
                impact total { formula: missing + 1 }
                simulate { runs: 10 seed: 1 }
            }
        "#;
        let (scenario, diags) = parse(src);
        assert!(!diags.has_errors());
        let scenario = scenario.unwrap();
        let validation = validate(&scenario);
        assert!(!validation.valid);
        let err = run(&scenario, &validation, &SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAst));
    }

    #[test]
    fn convergence_check_reports_converged_for_low_uncertainty() {
        let src = r#"
            scenario "Conv" {
                timeframe: 2025 -> 2030
                variable x { 2025: 100 2030: 200 uncertainty: normal(±1%) }
                simulate { runs: 2000 seed: 5 convergence: 0.05 }
            }
        "#;
        let (scenario, diags) = parse(src);
        assert!(!diags.has_errors());
        let scenario = scenario.unwrap();
        let validation = validate(&scenario);
        let config = SimulationConfig::from_scenario_defaults(scenario.declarations.iter().find_map(|d| match d {
            Declaration::Simulate(s) => Some(s),
            _ => None,
        }));
        let result = run(&scenario, &validation, &config).unwrap();
        assert_eq!(result.converged, Some(true));
    }
}
