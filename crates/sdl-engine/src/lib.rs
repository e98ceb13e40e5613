//! Expression evaluator and Monte Carlo simulation engine for SDL scenarios
//! (spec §4.4-§4.6): growth models, anchor interpolation, distribution-driven
//! sampling, and the run loop that ties them together into aggregated,
//! per-timestep result distributions.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod eval;
pub mod interpolation;
pub mod models;
pub mod result;

pub use aggregate::{nearest_rank_percentile, summarize, Distribution};
pub use config::SimulationConfig;
pub use engine::{run, EngineError, EngineResult};
pub use eval::{eval, EvalError, Environment};
pub use interpolation::interpolate;
pub use models::{evaluate as evaluate_model, ModelError, ModelParams};
pub use result::{BranchResult, ConvergenceDiagnostics, SimulationResult, TimestepRecord, VarResult};
