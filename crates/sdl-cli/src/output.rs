//! Output formatting: percentile tables, branch activation rates, and
//! diagnostics, text or JSON (spec §6 "Simulation result schema").

use colored::Colorize;
use sdl_core::Diagnostics;
use sdl_engine::SimulationResult;
use sdl_pulse::PulseResult;
use tabled::builder::Builder;

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Prints every diagnostic, one per line, severity-colored (spec §6
/// "Diagnostic format").
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        let severity = format!("{:?}", diagnostic.severity).to_uppercase();
        let severity = match diagnostic.severity {
            sdl_core::Severity::Error => severity.red().bold(),
            sdl_core::Severity::Warning => severity.yellow().bold(),
            sdl_core::Severity::Info => severity.blue().bold(),
        };
        match diagnostic.span {
            Some(span) => println!("  {} [{}] {} ({})", severity, diagnostic.code, diagnostic.message, span),
            None => println!("  {} [{}] {}", severity, diagnostic.code, diagnostic.message),
        }
    }
}

/// Renders a `SimulationResult` as percentile tables (one per variable and
/// impact) plus a branch activation table.
pub fn print_simulation_result(result: &SimulationResult) {
    print_success(&format!(
        "{} — {} runs, seed {}, {} ms",
        result.scenario_name, result.runs, result.seed, result.elapsed_ms
    ));
    if result.failed_runs > 0 {
        print_warning(&format!("{} run(s) failed and were excluded from aggregation", result.failed_runs));
    }
    if let Some(converged) = result.converged {
        if converged {
            print_success("converged within tolerance");
        } else {
            print_warning("did not converge within tolerance");
        }
    }

    for (name, var) in sorted(&result.variables) {
        println!("\n{}", name.cyan().bold());
        print_distribution_table(var);
    }
    for (name, impact) in sorted(&result.impacts) {
        println!("\n{} {}", "impact:".dimmed(), name.cyan().bold());
        print_distribution_table(impact);
    }

    if !result.branches.is_empty() {
        println!("\n{}", "branches".cyan().bold());
        let mut builder = Builder::default();
        builder.push_record(["Branch", "Activation Rate", "Declared Probability"]);
        for (name, branch) in sorted(&result.branches) {
            builder.push_record([
                name.clone(),
                format!("{:.1}%", branch.activation_rate * 100.0),
                branch
                    .trigger_probability
                    .map(|p| format!("{:.1}%", p * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        println!("{}", builder.build().to_string());
    }
}

fn sorted<V>(map: &std::collections::HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn print_distribution_table(var: &sdl_engine::VarResult) {
    let mut builder = Builder::default();
    let percentile_labels: Vec<String> = var
        .timesteps
        .first()
        .map(|t| t.distribution.percentiles.iter().map(|(p, _)| format!("p{p:.0}")).collect())
        .unwrap_or_default();

    let mut header = vec!["Year".to_string(), "Mean".to_string(), "Std".to_string(), "Median".to_string(), "Min".to_string(), "Max".to_string()];
    header.extend(percentile_labels);
    builder.push_record(header);

    for record in &var.timesteps {
        let d = &record.distribution;
        let mut row = vec![
            record.year.to_string(),
            format!("{:.3}", d.mean),
            format!("{:.3}", d.std),
            format!("{:.3}", d.median),
            format!("{:.3}", d.min),
            format!("{:.3}", d.max),
        ];
        row.extend(d.percentiles.iter().map(|(_, v)| format!("{v:.3}")));
        builder.push_record(row);
    }
    println!("{}", builder.build().to_string());
}

/// Renders a `PulseResult`: observed series summary, alerts, calibrations.
pub fn print_pulse_result(result: &PulseResult) {
    if result.is_live {
        print_success(&format!("live — {} observed series", result.observed.len()));
    } else {
        print_warning("not live — no observed series, or at least one fetch error");
    }

    for (target, points) in sorted(&result.observed) {
        println!("  {} {} observed point(s)", target.cyan(), points.len());
    }
    for err in &result.fetch_errors {
        print_warning(&format!("fetch failed for {}: {}", err.target, err.message));
    }

    if !result.calibrations.is_empty() {
        println!("\n{}", "calibrations".cyan().bold());
        let mut builder = Builder::default();
        builder.push_record(["Target", "Posterior Mean", "Posterior Std", "Points Used"]);
        for c in &result.calibrations {
            builder.push_record([
                c.target.clone(),
                format!("{:.4}", c.posterior_mean),
                format!("{:.4}", c.posterior_std),
                c.data_points_used.to_string(),
            ]);
        }
        println!("{}", builder.build().to_string());
    }
    for skip in &result.calibration_skips {
        print_warning(&format!("calibration skipped for {}: {}", skip.target, skip.reason));
    }

    if !result.alerts.is_empty() {
        println!("\n{}", "watch alerts".cyan().bold());
        for alert in &result.alerts {
            let label = match alert.severity {
                sdl_pulse::AlertSeverity::Warn => "WARN".yellow().bold(),
                sdl_pulse::AlertSeverity::Error => "ERROR".red().bold(),
            };
            println!("  {} {}", label, alert.message);
        }
    }
}
