//! Integration tests for the `sdl` binary, exercised end-to-end against real
//! scenario files on disk (spec §6 exit codes).

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

const VALID_SCENARIO: &str = r#"
    scenario "Integration" {
        timeframe: 2025 -> 2030
        variable revenue {
            2025: 100
            2030: 150
            uncertainty: normal(±10%)
        }
        simulate { runs: 50 seed: 7 }
    }
"#;

const INVALID_SCENARIO: &str = r#"
    scenario "Broken" {
        timeframe: 2030 -> 2025
        simulate { runs: 10 seed: 1 }
    }
"#;

fn scenario_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".sdl").expect("create temp scenario file");
    file.write_all(contents.as_bytes()).expect("write scenario file");
    file
}

#[test]
fn check_succeeds_on_a_valid_scenario() {
    let file = scenario_file(VALID_SCENARIO);
    Command::cargo_bin("sdl")
        .unwrap()
        .arg("check")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn check_exits_one_on_invalid_timeframe() {
    let file = scenario_file(INVALID_SCENARIO);
    Command::cargo_bin("sdl").unwrap().arg("check").arg(file.path()).assert().code(1);
}

#[test]
fn check_exits_one_on_unparseable_file() {
    let file = scenario_file("not a scenario at all {{{");
    Command::cargo_bin("sdl").unwrap().arg("check").arg(file.path()).assert().code(1);
}

#[test]
fn run_emits_valid_json_with_percentile_results() {
    let file = scenario_file(VALID_SCENARIO);
    let output = Command::cargo_bin("sdl")
        .unwrap()
        .args(["--format", "json", "run"])
        .arg(file.path())
        .arg("--no-pulse")
        .output()
        .expect("run sdl run");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON output");
    assert!(parsed.get("variables").is_some());
    assert_eq!(parsed["variables"]["revenue"]["timesteps"].as_array().unwrap().len(), 6);
}

#[test]
fn run_respects_runs_and_seed_overrides() {
    let file = scenario_file(VALID_SCENARIO);
    let output = Command::cargo_bin("sdl")
        .unwrap()
        .args(["--format", "json", "run"])
        .arg(file.path())
        .args(["--runs", "25", "--seed", "99", "--no-pulse"])
        .output()
        .expect("run sdl run");
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON output");
    assert_eq!(parsed["runs"], 25);
    assert_eq!(parsed["seed"], 99);
}

#[test]
fn run_exits_one_on_a_scenario_that_fails_validation() {
    let file = scenario_file(INVALID_SCENARIO);
    Command::cargo_bin("sdl").unwrap().arg("run").arg(file.path()).assert().code(1);
}

#[test]
fn pulse_reports_live_data_against_the_bundled_fallback_adapter() {
    let scenario = r#"
        scenario "PulseIntegration" {
            timeframe: 2020 -> 2025
            assumption growth {
                value: 100
                bind { source_url: "sdl:fallback/inflation_rate" }
            }
            simulate { runs: 10 seed: 1 }
        }
    "#;
    let file = scenario_file(scenario);
    Command::cargo_bin("sdl")
        .unwrap()
        .arg("pulse")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("live"));
}
