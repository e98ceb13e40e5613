//! Output types produced by one `MonteCarloEngine::run` call (spec §4.5
//! "Contract" and §6 "Simulation result schema").

use crate::aggregate::Distribution;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestepRecord {
    pub year: i32,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarResult {
    pub name: String,
    pub timesteps: Vec<TimestepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchResult {
    pub name: String,
    pub activation_rate: f64,
    pub trigger_probability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceDiagnostics {
    pub tolerance: f64,
    /// Per-variable `|mean(first_half) - mean(second_half)| / |mean(all)|`
    /// at the final timestep.
    pub relative_deltas: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub scenario_name: String,
    pub runs: u32,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub timesteps: Vec<i32>,
    pub variables: HashMap<String, VarResult>,
    pub impacts: HashMap<String, VarResult>,
    pub branches: HashMap<String, BranchResult>,
    pub converged: Option<bool>,
    pub convergence_diagnostics: Option<ConvergenceDiagnostics>,
    /// Runs excluded from aggregation after an expression evaluation failure
    /// (spec §7: "run is marked failed; other runs continue").
    pub failed_runs: u32,
}
