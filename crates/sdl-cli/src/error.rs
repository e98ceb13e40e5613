//! CLI error handling (spec §6: exit code 0 success, 1 parse/validate
//! failure, 2 simulation failure).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{file} failed to parse:\n{diagnostics}")]
    ParseFailed { file: String, diagnostics: String },

    #[error("{file} failed validation:\n{diagnostics}")]
    ValidationFailed { file: String, diagnostics: String },

    #[error("simulation failed: {0}")]
    SimulationFailed(#[from] sdl_engine::EngineError),

    #[error("calibration failed: {0}")]
    CalibrationFailed(#[from] sdl_pulse::CalibrationError),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Exit code this error should produce (spec §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ParseFailed { .. } | CliError::ValidationFailed { .. } => 1,
            CliError::SimulationFailed(_) | CliError::CalibrationFailed(_) => 2,
            CliError::Io(_) | CliError::Json(_) => 2,
        }
    }
}
