pub mod check;
pub mod pulse;
pub mod run;

use std::fs;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use sdl_parser::Scenario;

/// Reads and parses a scenario file, turning parse failures into the exit-1
/// `CliError::ParseFailed` (spec §6/§7).
pub fn parse_file(path: &str) -> CliResult<Scenario> {
    let source = fs::read_to_string(path)?;
    let (scenario, diagnostics) = sdl_parser::parse(&source);
    match scenario {
        Some(scenario) if !diagnostics.has_errors() => Ok(scenario),
        _ => Err(CliError::ParseFailed {
            file: path.to_string(),
            diagnostics: format_diagnostics(&diagnostics),
        }),
    }
}

/// Renders a diagnostics list as one line per diagnostic, for embedding in a
/// `CliError` message.
pub fn format_diagnostics(diagnostics: &sdl_core::Diagnostics) -> String {
    diagnostics
        .iter()
        .map(|d| match d.span {
            Some(span) => format!("  [{}] {} ({})", d.code, d.message, span),
            None => format!("  [{}] {}", d.code, d.message),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serializes `value` as pretty JSON, or renders it via `text` — the
/// dispatcher every subcommand's output funnels through (spec §6).
pub fn emit<T: serde::Serialize>(value: &T, format: OutputFormat, text: impl FnOnce(&T)) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}
