//! `SimulationConfig`: the engine's input knobs (spec §4.5 "Contract"). A
//! scenario's own `simulate` block is the lowest-priority source of these
//! values; CLI/API overrides take precedence (spec §4.5).

use sdl_parser::Simulate;
use std::collections::HashMap;

pub const DEFAULT_RUNS: u32 = 2000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];
pub const DEFAULT_SENSITIVITY: f64 = 0.30;
pub const RAMP_MIN: f64 = 0.3;
pub const RAMP_MAX: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub runs: u32,
    pub seed: u64,
    pub percentiles: Vec<f64>,
    /// Baseline value per parameter name, against which the declared value is
    /// compared to compute the parameter delta driving sensitivity modulation
    /// (spec §4.5 step 3). A parameter absent from this map has delta zero.
    pub parameter_defaults: HashMap<String, f64>,
    pub convergence: Option<f64>,
    pub default_sensitivity: f64,
    pub retain_samples: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            seed: DEFAULT_SEED,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            parameter_defaults: HashMap::new(),
            convergence: None,
            default_sensitivity: DEFAULT_SENSITIVITY,
            retain_samples: false,
        }
    }
}

impl SimulationConfig {
    /// Builds a config seeded from the scenario's own `simulate` block, if
    /// any, falling back to engine defaults for anything it omits. Callers
    /// (the CLI, an embedding API) then layer their own overrides on top.
    pub fn from_scenario_defaults(simulate: Option<&Simulate>) -> Self {
        let mut config = Self::default();
        if let Some(s) = simulate {
            if let Some(runs) = s.runs {
                config.runs = runs;
            }
            if let Some(seed) = s.seed {
                config.seed = seed;
            }
            if let Some(percentiles) = &s.percentiles {
                config.percentiles = percentiles.clone();
            }
            config.convergence = s.convergence;
        }
        config
    }

    pub fn with_runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parameter_default(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameter_defaults.insert(name.into(), value);
        self
    }
}

/// Linear ramp from `RAMP_MIN` to `RAMP_MAX` across the scenario's timestep
/// range, so parameter modulation responds less at early timesteps than late
/// ones (spec §4.5 step 4).
pub fn ramp(t_index: usize, last_index: usize) -> f64 {
    if last_index == 0 {
        return RAMP_MAX;
    }
    let frac = t_index as f64 / last_index as f64;
    RAMP_MIN + frac * (RAMP_MAX - RAMP_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_starts_low_and_ends_high() {
        assert_eq!(ramp(0, 10), RAMP_MIN);
        assert_eq!(ramp(10, 10), RAMP_MAX);
        assert!(ramp(5, 10) > RAMP_MIN && ramp(5, 10) < RAMP_MAX);
    }

    #[test]
    fn scenario_defaults_fall_back_to_engine_defaults() {
        let config = SimulationConfig::from_scenario_defaults(None);
        assert_eq!(config.runs, DEFAULT_RUNS);
        assert_eq!(config.seed, DEFAULT_SEED);
    }
}
