#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the neighbourhood opportunity analysis.
//!
//! ```text
//! crime_trends simulate [--seed 838] [--neighbourhoods 158] [--output data/merged_neighbourhoods.csv]
//! crime_trends merge --crime crime.csv --profiles profiles.csv [--output ...]
//! crime_trends evaluate [--input ...] [--config analysis.toml] [--output-dir output]
//! crime_trends cluster [--input ...] [--family k_means --k 3]
//! crime_trends run [--crime ... --profiles ...] [--family k_means --k 3]
//! ```
//!
//! Running `crime_trends` with no subcommand enters interactive mode.
//!
//! Uses `indicatif-log-bridge` (via [`crime_trends_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod interactive;
mod output;
mod pipeline;

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use crime_trends_analytics::config::{default_config, load_config, validate_config};
use crime_trends_analytics_models::{AnalysisConfig, Candidate, ModelFamily};
use crime_trends_neighborhood::FeatureTable;
use crime_trends_neighborhood::simulate::{DEFAULT_SEED, SimulationParams, TORONTO_NEIGHBOURHOODS};

use crate::pipeline::{PipelineOptions, TableSource};

/// Default location of the merged feature table.
const DEFAULT_TABLE: &str = "data/merged_neighbourhoods.csv";

/// Default directory for analysis outputs.
const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Parser)]
#[command(
    name = "crime_trends",
    about = "Cluster neighbourhoods by socioeconomic opportunity and compare crime trends"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic merged feature table
    Simulate {
        /// RNG seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
        /// Number of neighbourhoods
        #[arg(long, default_value_t = TORONTO_NEIGHBOURHOODS)]
        neighbourhoods: usize,
        /// Merged CSV to write
        #[arg(long, default_value = DEFAULT_TABLE)]
        output: PathBuf,
    },
    /// Join a crime table and a census profile table into a merged table
    Merge {
        /// Crime CSV (neighbourhood, count and rate columns)
        #[arg(long)]
        crime: PathBuf,
        /// Census profile CSV
        #[arg(long)]
        profiles: PathBuf,
        /// Number of neighbourhoods the join must produce
        #[arg(long)]
        expected: Option<usize>,
        /// Merged CSV to write
        #[arg(long, default_value = DEFAULT_TABLE)]
        output: PathBuf,
    },
    /// Fit and score every candidate configuration without labelling
    Evaluate {
        /// Merged feature table
        #[arg(long, default_value = DEFAULT_TABLE)]
        input: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Label the selected configuration and write every output table
    Cluster {
        /// Merged feature table
        #[arg(long, default_value = DEFAULT_TABLE)]
        input: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Merge (or simulate) the feature table, then run the whole analysis
    Run {
        /// Crime CSV; simulates a table when omitted
        #[arg(long, requires = "profiles")]
        crime: Option<PathBuf>,
        /// Census profile CSV
        #[arg(long, requires = "crime")]
        profiles: Option<PathBuf>,
        /// Simulation seed when no input tables are given
        #[arg(long, default_value_t = DEFAULT_SEED)]
        simulation_seed: u64,
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

/// Options shared by every analysis subcommand.
#[derive(Args)]
struct AnalysisArgs {
    /// Analysis configuration TOML (defaults to the embedded configuration)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the seed for every random initialisation
    #[arg(long)]
    seed: Option<u64>,
    /// Override the number of neighbourhoods the table must have
    #[arg(long)]
    expected: Option<usize>,
    /// Directory for output tables
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
}

impl AnalysisArgs {
    /// Loads the configuration and folds the overrides into it.
    fn resolve(
        &self,
        selection: Option<Candidate>,
    ) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => default_config()?,
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(expected) = self.expected {
            config.table.expected_neighbourhoods = Some(expected);
        }
        if selection.is_some() {
            config.selection = selection;
        }
        validate_config(&config)?;
        Ok(config)
    }
}

/// The analyst's (family, K) choice.
#[derive(Args)]
struct SelectionArgs {
    /// Model family to label (`k_means` or `gaussian_mixture`)
    #[arg(long, requires = "k")]
    family: Option<ModelFamily>,
    /// Number of clusters to label
    #[arg(long, requires = "family")]
    k: Option<usize>,
}

impl SelectionArgs {
    const fn candidate(&self) -> Option<Candidate> {
        match (self.family, self.k) {
            (Some(family), Some(k)) => Some(Candidate { family, k }),
            _ => None,
        }
    }
}

/// Writes `table` in merged layout, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
fn write_table(table: &FeatureTable, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    table.write_merged_csv(File::create(path)?)?;
    log::info!(
        "Wrote {} neighbourhoods to {}",
        table.len(),
        path.display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = crime_trends_cli_utils::init_logger();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Simulate {
            seed,
            neighbourhoods,
            output,
        } => {
            let source = TableSource::Simulated(SimulationParams {
                seed,
                neighbourhoods,
            });
            write_table(&source.load(None)?, &output)?;
        }
        Commands::Merge {
            crime,
            profiles,
            expected,
            output,
        } => {
            let source = TableSource::Separate { crime, profiles };
            write_table(&source.load(expected)?, &output)?;
        }
        Commands::Evaluate { input, analysis } => {
            let options = PipelineOptions {
                source: TableSource::Merged(input),
                config: analysis.resolve(None)?,
                output_dir: analysis.output_dir,
            };
            if let Some(recommended) = pipeline::evaluate_only(&multi, &options)? {
                println!("Recommended configuration: {recommended}");
            }
        }
        Commands::Cluster {
            input,
            analysis,
            selection,
        } => {
            let options = PipelineOptions {
                source: TableSource::Merged(input),
                config: analysis.resolve(selection.candidate())?,
                output_dir: analysis.output_dir,
            };
            pipeline::run(&multi, &options)?;
        }
        Commands::Run {
            crime,
            profiles,
            simulation_seed,
            analysis,
            selection,
        } => {
            let config = analysis.resolve(selection.candidate())?;
            let source = match (crime, profiles) {
                (Some(crime), Some(profiles)) => TableSource::Separate { crime, profiles },
                _ => TableSource::Simulated(SimulationParams {
                    seed: simulation_seed,
                    ..SimulationParams::default()
                }),
            };

            let merged = analysis.output_dir.join("merged_neighbourhoods.csv");
            write_table(
                &source.load(config.table.expected_neighbourhoods)?,
                &merged,
            )?;

            let options = PipelineOptions {
                source: TableSource::Merged(merged),
                config,
                output_dir: analysis.output_dir,
            };
            pipeline::run(&multi, &options)?;
        }
    }

    Ok(())
}
