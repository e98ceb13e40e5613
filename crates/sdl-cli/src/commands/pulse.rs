//! `sdl pulse` — fetch live data, calibrate uncertainty priors, and check
//! watch rules against a scenario file, without simulating it (spec §6).

use sdl_pulse::{AdapterRegistry, PulseOptions};

use crate::cli::OutputFormat;
use crate::commands::{emit, format_diagnostics, parse_file};
use crate::error::{CliError, CliResult};
use crate::output;

pub async fn pulse(file: &str, format: OutputFormat) -> CliResult<()> {
    let scenario = parse_file(file)?;
    let validation = sdl_validator::validate(&scenario);
    if !validation.valid {
        return Err(CliError::ValidationFailed {
            file: file.to_string(),
            diagnostics: format_diagnostics(&validation.diagnostics),
        });
    }

    let registry = AdapterRegistry::with_bundled_adapters();
    let result = sdl_pulse::pulse(&scenario, &registry, &PulseOptions::default()).await;

    emit(&result, format, |result| {
        output::print_pulse_result(result);
    })
}
