//! Menu-driven mode used when no subcommand is given.

use std::path::PathBuf;

use crime_trends_analytics::config::{default_config, load_config};
use crime_trends_analytics_models::AnalysisConfig;
use crime_trends_cli_utils::MultiProgress;
use crime_trends_neighborhood::simulate::{DEFAULT_SEED, SimulationParams, TORONTO_NEIGHBOURHOODS};
use dialoguer::{Confirm, Input, Select};

use crate::pipeline::{self, PipelineOptions, TableSource};
use crate::{DEFAULT_OUTPUT_DIR, DEFAULT_TABLE, write_table};

/// Top-level actions of the interactive menu.
enum Tool {
    RunPipeline,
    Simulate,
    Merge,
    Evaluate,
    Cluster,
}

impl Tool {
    const ALL: &[Self] = &[
        Self::RunPipeline,
        Self::Simulate,
        Self::Merge,
        Self::Evaluate,
        Self::Cluster,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunPipeline => "Run full analysis on a simulated table",
            Self::Simulate => "Simulate a feature table",
            Self::Merge => "Merge crime and profile tables",
            Self::Evaluate => "Score candidate configurations",
            Self::Cluster => "Label a configuration & write tables",
        }
    }
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt or the chosen action fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Neighbourhood Opportunity Analysis");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::RunPipeline => {
            let params = prompt_simulation()?;
            let options = PipelineOptions {
                source: TableSource::Simulated(params),
                config: prompt_config()?,
                output_dir: prompt_path("Output directory", DEFAULT_OUTPUT_DIR)?,
            };
            pipeline::run(multi, &options)?;
        }
        Tool::Simulate => {
            let params = prompt_simulation()?;
            let output = prompt_path("Merged CSV to write", DEFAULT_TABLE)?;
            write_table(&TableSource::Simulated(params).load(None)?, &output)?;
        }
        Tool::Merge => {
            let source = TableSource::Separate {
                crime: prompt_path("Crime CSV", "data/neighbourhood_crime_rates.csv")?,
                profiles: prompt_path("Census profile CSV", "data/neighbourhood_profiles.csv")?,
            };
            let expected = prompt_usize("Expected neighbourhoods", TORONTO_NEIGHBOURHOODS)?;
            let output = prompt_path("Merged CSV to write", DEFAULT_TABLE)?;
            write_table(&source.load(Some(expected))?, &output)?;
        }
        Tool::Evaluate => {
            let options = prompt_table_options()?;
            if let Some(recommended) = pipeline::evaluate_only(multi, &options)? {
                println!("Recommended configuration: {recommended}");
            }
        }
        Tool::Cluster => {
            let options = prompt_table_options()?;
            pipeline::run(multi, &options)?;
        }
    }

    Ok(())
}

fn prompt_path(prompt: &str, default: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()?;
    Ok(PathBuf::from(input.trim()))
}

fn prompt_usize(prompt: &str, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    Ok(Input::new()
        .with_prompt(prompt)
        .default(default)
        .interact_text()?)
}

fn prompt_simulation() -> Result<SimulationParams, Box<dyn std::error::Error>> {
    let seed: u64 = Input::new()
        .with_prompt("Simulation seed")
        .default(DEFAULT_SEED)
        .interact_text()?;
    let neighbourhoods = prompt_usize("Neighbourhoods", TORONTO_NEIGHBOURHOODS)?;
    Ok(SimulationParams {
        seed,
        neighbourhoods,
    })
}

/// Embedded configuration unless the analyst points at a file. The
/// configured selection is dropped so the choice is made after the scores
/// are shown.
fn prompt_config() -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    let custom = Confirm::new()
        .with_prompt("Use a custom configuration file?")
        .default(false)
        .interact()?;

    let mut config = if custom {
        load_config(&prompt_path("Configuration TOML", "analysis.toml")?)?
    } else {
        default_config()?
    };

    let choose_now = Confirm::new()
        .with_prompt("Choose the configuration after seeing the scores?")
        .default(true)
        .interact()?;
    if choose_now {
        config.selection = None;
    }

    Ok(config)
}

fn prompt_table_options() -> Result<PipelineOptions, Box<dyn std::error::Error>> {
    Ok(PipelineOptions {
        source: TableSource::Merged(prompt_path("Merged feature table", DEFAULT_TABLE)?),
        config: prompt_config()?,
        output_dir: prompt_path("Output directory", DEFAULT_OUTPUT_DIR)?,
    })
}
