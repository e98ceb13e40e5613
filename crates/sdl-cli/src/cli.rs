//! CLI definition and command dispatch.

use clap::{Parser, Subcommand};

use crate::commands::{check, pulse, run};
use crate::error::CliResult;

/// sdl - Scenario Description Language toolchain
///
/// Parses, validates, simulates, and (optionally) calibrates SDL scenario
/// files against live external data.
#[derive(Parser)]
#[command(name = "sdl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse, validate, and Monte Carlo simulate a scenario file
    Run {
        /// Path to the .sdl scenario file
        file: String,

        /// Number of Monte Carlo runs (overrides the scenario's own `simulate` block)
        #[arg(long)]
        runs: Option<u32>,

        /// Root RNG seed (overrides the scenario's own `simulate` block)
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the live-data pulse (fetch/calibrate/watch) before simulating
        #[arg(long)]
        no_pulse: bool,
    },

    /// Parse and validate a scenario file without simulating it
    Check {
        /// Path to the .sdl scenario file
        file: String,
    },

    /// Fetch live data, calibrate uncertainty priors, and check watch rules
    Pulse {
        /// Path to the .sdl scenario file
        file: String,
    },
}

impl Cli {
    pub async fn run(self) -> CliResult<()> {
        match self.command {
            Commands::Run {
                file,
                runs,
                seed,
                no_pulse,
            } => run::run(&file, runs, seed, no_pulse, self.format).await,
            Commands::Check { file } => check::check(&file, self.format),
            Commands::Pulse { file } => pulse::pulse(&file, self.format).await,
        }
    }
}
