//! `sdl run` — parse, validate, optionally pulse live data, then Monte Carlo
//! simulate a scenario file (spec §6).

use sdl_engine::SimulationConfig;
use sdl_parser::Declaration;
use sdl_pulse::{AdapterRegistry, PulseOptions};

use crate::cli::OutputFormat;
use crate::commands::{emit, format_diagnostics, parse_file};
use crate::error::{CliError, CliResult};
use crate::output;

pub async fn run(file: &str, runs: Option<u32>, seed: Option<u64>, no_pulse: bool, format: OutputFormat) -> CliResult<()> {
    let mut scenario = parse_file(file)?;

    if !no_pulse && has_live_targets(&scenario) {
        let registry = AdapterRegistry::with_bundled_adapters();
        let pulse_result = sdl_pulse::pulse(&scenario, &registry, &PulseOptions::default()).await;
        if let OutputFormat::Text = format {
            if pulse_result.is_live || !pulse_result.fetch_errors.is_empty() {
                output::print_pulse_result(&pulse_result);
            }
        }
        if let Some(calibrated) = pulse_result.calibrated_ast {
            scenario = calibrated;
        }
    }

    let validation = sdl_validator::validate(&scenario);
    if !validation.valid {
        return Err(CliError::ValidationFailed {
            file: file.to_string(),
            diagnostics: format_diagnostics(&validation.diagnostics),
        });
    }

    let simulate_decl = scenario.declarations.iter().find_map(|decl| match decl {
        Declaration::Simulate(s) => Some(s),
        _ => None,
    });
    let mut config = SimulationConfig::from_scenario_defaults(simulate_decl);
    if let Some(runs) = runs {
        config = config.with_runs(runs);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }

    let result = sdl_engine::run(&scenario, &validation, &config)?;

    emit(&result, format, |result| {
        output::print_simulation_result(result);
    })
}

/// Whether any assumption in `scenario` declares a `bind` source — `run`
/// only pulses live data when there is something to fetch.
fn has_live_targets(scenario: &sdl_parser::Scenario) -> bool {
    scenario.declarations.iter().any(|decl| match decl {
        Declaration::Assumption(a) => a.bind.is_some(),
        Declaration::Calibrate(_) => true,
        _ => false,
    })
}
