//! Watchdog: compares the most recent observed value of a watched
//! assumption against its declared value, and fires alerts when a rule's
//! condition holds (spec §4.9).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sdl_parser::{Declaration, ExprKind, Scenario, WatchSeverity};
use sdl_engine::{eval, Environment};
use serde::{Deserialize, Serialize};

use crate::adapter::ObservedPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warn,
    Error,
}

impl From<WatchSeverity> for AlertSeverity {
    fn from(s: WatchSeverity) -> Self {
        match s {
            WatchSeverity::Warn => AlertSeverity::Warn,
            WatchSeverity::Error => AlertSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchAlert {
    pub target: String,
    pub severity: AlertSeverity,
    pub observed: f64,
    pub assumed: f64,
    pub rule: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Evaluates every `watch` block nested in an assumption against the most
/// recent observed point for that assumption, in declaration order (spec
/// §5: "watchdog does the same [as the calibrator] for alerts").
///
/// Top-level `watch` declarations have no assumption to bind `actual`/
/// `assumed` against under this grammar and are not evaluated; they are a
/// forward-compatible parse target only.
pub fn check(scenario: &Scenario, observed: &HashMap<String, Vec<ObservedPoint>>, now: DateTime<Utc>) -> Vec<WatchAlert> {
    let mut alerts = Vec::new();

    for decl in &scenario.declarations {
        let Declaration::Assumption(assumption) = decl else {
            continue;
        };
        let Some(watch) = &assumption.watch else {
            continue;
        };
        let Some(points) = observed.get(&assumption.name) else {
            continue;
        };
        let Some(latest) = points.iter().max_by_key(|p| p.date) else {
            continue;
        };
        let assumed = match &assumption.value.kind {
            ExprKind::Number(n) => *n,
            ExprKind::Percentage(p) => *p,
            _ => continue,
        };
        let observed_value = latest.value;

        let mut env = Environment::new();
        env.insert("actual".to_string(), observed_value);
        env.insert("assumed".to_string(), assumed);

        for rule in &watch.rules {
            let Ok(result) = eval(&rule.condition, &env) else {
                continue;
            };
            if result != 0.0 {
                alerts.push(WatchAlert {
                    target: assumption.name.clone(),
                    severity: rule.severity.into(),
                    observed: observed_value,
                    assumed,
                    rule: format!("{} when {:?}", severity_keyword(rule.severity), rule.condition.kind),
                    message: format!(
                        "{}: observed {observed_value} vs assumed {assumed}",
                        assumption.name
                    ),
                    timestamp: now,
                });
            }
        }
    }

    alerts
}

fn severity_keyword(severity: WatchSeverity) -> &'static str {
    match severity {
        WatchSeverity::Warn => "warn",
        WatchSeverity::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scenario() -> Scenario {
        let src = r#"
            scenario "Watch" {
                timeframe: 2020 -> 2025
                assumption growth {
                    value: 100
                    watch {
                        warn when: actual < assumed * 0.8
                        error when: actual < assumed * 0.5
                    }
                }
                simulate { runs: 10 seed: 1 }
            }
        "#;
        let (scenario, diags) = sdl_parser::parse(src);
        assert!(!diags.has_errors(), "{diags:?}");
        scenario.expect("scenario should parse")
    }

    fn observed_at(value: f64) -> HashMap<String, Vec<ObservedPoint>> {
        let mut map = HashMap::new();
        map.insert(
            "growth".to_string(),
            vec![ObservedPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                value,
                source: "test".to_string(),
                provisional: false,
            }],
        );
        map
    }

    #[test]
    fn warn_fires_when_observed_drops_below_eighty_percent() {
        let alerts = check(&scenario(), &observed_at(70.0), Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warn);
    }

    #[test]
    fn no_alert_fires_for_a_mild_shortfall() {
        let alerts = check(&scenario(), &observed_at(85.0), Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn both_warn_and_error_fire_independently_for_a_severe_shortfall() {
        let alerts = check(&scenario(), &observed_at(40.0), Utc::now());
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().any(|a| a.severity == AlertSeverity::Warn));
        assert!(alerts.iter().any(|a| a.severity == AlertSeverity::Error));
    }
}
