//! `sdl check` — parse and validate a scenario file without simulating it
//! (spec §6).

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::commands::{emit, format_diagnostics, parse_file};
use crate::error::{CliError, CliResult};
use crate::output;

#[derive(Serialize)]
struct CheckReport {
    file: String,
    scenario: String,
    valid: bool,
    diagnostic_count: usize,
    errors: usize,
    warnings: usize,
}

pub fn check(file: &str, format: OutputFormat) -> CliResult<()> {
    let scenario = parse_file(file)?;
    let validation = sdl_validator::validate(&scenario);

    if !validation.valid {
        return Err(CliError::ValidationFailed {
            file: file.to_string(),
            diagnostics: format_diagnostics(&validation.diagnostics),
        });
    }

    let errors = validation.diagnostics.errors().count();
    let warnings = validation.diagnostics.len() - errors;
    let report = CheckReport {
        file: file.to_string(),
        scenario: scenario.name.clone(),
        valid: validation.valid,
        diagnostic_count: validation.diagnostics.len(),
        errors,
        warnings,
    };

    emit(&report, format, |report| {
        output::print_success(&format!("{} is valid", report.scenario));
        if !validation.diagnostics.is_empty() {
            output::print_diagnostics(&validation.diagnostics);
        }
    })
}
