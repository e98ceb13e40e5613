//! The orchestrator: `pulse(ast, options) -> PulseResult` (spec §4.10). Ties
//! together the fetcher, calibrator, and watchdog, with each step
//! individually skippable and the whole run cancellable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sdl_parser::{Declaration, Scenario};
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterConfig, ObservedPoint};
use crate::calibrate::{calibrate, CalibrationError, CalibrationResult, CalibrationSkip};
use crate::cancellation::CancellationToken;
use crate::fetcher::{AdapterRegistry, DataFetcher};
use crate::watchdog::{self, WatchAlert};

#[derive(Debug, Clone)]
pub struct PulseOptions {
    pub fetch: bool,
    pub calibrate: bool,
    pub watch: bool,
    pub cancellation: CancellationToken,
}

impl Default for PulseOptions {
    fn default() -> Self {
        Self {
            fetch: true,
            calibrate: true,
            watch: true,
            cancellation: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchErrorEntry {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseResult {
    pub observed: HashMap<String, Vec<ObservedPoint>>,
    pub fetch_errors: Vec<FetchErrorEntry>,
    pub alerts: Vec<WatchAlert>,
    pub calibrations: Vec<CalibrationResult>,
    pub calibration_skips: Vec<CalibrationSkip>,
    #[serde(skip)]
    pub calibrated_ast: Option<Scenario>,
    pub fetched_at: DateTime<Utc>,
    /// At least one observed series and zero fetch errors (spec §4.10).
    pub is_live: bool,
}

impl Default for PulseResult {
    fn default() -> Self {
        Self {
            observed: HashMap::new(),
            fetch_errors: Vec::new(),
            alerts: Vec::new(),
            calibrations: Vec::new(),
            calibration_skips: Vec::new(),
            calibrated_ast: None,
            fetched_at: Utc::now(),
            is_live: false,
        }
    }
}

fn targets_for(scenario: &Scenario) -> Vec<AdapterConfig> {
    let mut configs = Vec::new();
    for decl in &scenario.declarations {
        match decl {
            Declaration::Assumption(a) => {
                if let Some(bind) = &a.bind {
                    configs.push(AdapterConfig {
                        source_url: bind.source_url.clone(),
                        field: bind.field.clone(),
                        fallback_value: bind.fallback_value,
                        target_id: a.name.clone(),
                        label: Some(a.name.clone()),
                        unit: None,
                    });
                }
            }
            Declaration::Calibrate(c) => {
                if !configs.iter().any(|cfg: &AdapterConfig| cfg.target_id == c.target) {
                    configs.push(AdapterConfig {
                        source_url: c.url.clone(),
                        field: None,
                        fallback_value: None,
                        target_id: c.target.clone(),
                        label: Some(c.target.clone()),
                        unit: None,
                    });
                }
            }
            _ => {}
        }
    }
    configs
}

/// Runs fetch → calibrate → watch against `scenario`, per `options`. Never
/// returns an error from partial progress (spec §7: "the orchestrator never
/// throws from successful partial progress") — failures are recorded as
/// structured entries inside the returned `PulseResult`.
pub async fn pulse(scenario: &Scenario, registry: &AdapterRegistry, options: &PulseOptions) -> PulseResult {
    let mut result = PulseResult::default();

    if options.cancellation.is_cancelled() {
        return result;
    }

    if options.fetch {
        let configs = targets_for(scenario);
        if !configs.is_empty() {
            let fetcher = DataFetcher::new(registry.clone());
            let fetched = fetcher.fetch_all(&configs, &options.cancellation).await;
            if options.cancellation.is_cancelled() {
                return result;
            }
            for (target, outcome) in fetched {
                match outcome {
                    Ok(points) => {
                        result.observed.insert(target, points);
                    }
                    Err(err) => {
                        result.fetch_errors.push(FetchErrorEntry {
                            target: target.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    if options.calibrate && !result.observed.is_empty() {
        match calibrate(scenario, &result.observed) {
            Ok((calibrated, calibrations, skips)) => {
                result.calibrations = calibrations;
                result.calibration_skips = skips;
                result.calibrated_ast = Some(calibrated);
            }
            Err(CalibrationError::UnknownTarget(target)) => {
                result.calibration_skips.push(CalibrationSkip {
                    target,
                    reason: "calibrate target names no assumption in this scenario".to_string(),
                });
            }
        }
    }

    if options.watch {
        result.alerts = watchdog::check(scenario, &result.observed, result.fetched_at);
    }

    result.is_live = !result.observed.is_empty() && result.fetch_errors.is_empty();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::FallbackAdapter;

    fn scenario() -> Scenario {
        let src = r#"
            scenario "Pulse" {
                timeframe: 2020 -> 2025
                assumption growth {
                    value: 100
                    bind {
                        source_url: "sdl:fallback/inflation_rate"
                    }
                    watch {
                        warn when: actual < assumed * 0.8
                    }
                }
                simulate { runs: 10 seed: 1 }
            }
        "#;
        let (scenario, diags) = sdl_parser::parse(src);
        assert!(!diags.has_errors(), "{diags:?}");
        scenario.expect("scenario should parse")
    }

    fn fallback_registry() -> AdapterRegistry {
        AdapterRegistry::new().register(Arc::new(FallbackAdapter::new()))
    }

    #[tokio::test]
    async fn pulse_is_live_when_a_series_is_observed_with_no_errors() {
        let result = pulse(&scenario(), &fallback_registry(), &PulseOptions::default()).await;
        assert!(result.is_live);
        assert!(result.observed.contains_key("growth"));
    }

    #[tokio::test]
    async fn skipping_fetch_leaves_nothing_observed_and_not_live() {
        let options = PulseOptions {
            fetch: false,
            ..PulseOptions::default()
        };
        let result = pulse(&scenario(), &fallback_registry(), &options).await;
        assert!(result.observed.is_empty());
        assert!(!result.is_live);
        assert!(result.alerts.is_empty());
    }

    #[tokio::test]
    async fn skipping_watch_produces_no_alerts_even_when_live() {
        let options = PulseOptions {
            watch: false,
            ..PulseOptions::default()
        };
        let result = pulse(&scenario(), &fallback_registry(), &options).await;
        assert!(result.is_live);
        assert!(result.alerts.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_start_returns_an_empty_result() {
        let options = PulseOptions::default();
        options.cancellation.cancel();
        let result = pulse(&scenario(), &fallback_registry(), &options).await;
        assert!(result.observed.is_empty());
        assert!(!result.is_live);
    }
}
