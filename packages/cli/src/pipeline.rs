//! End-to-end analysis pipeline.
//!
//! Chains load -> standardize -> project -> sweep -> evaluate -> select ->
//! label -> tabulate, reporting each step on a shared `indicatif` bar.
//! Selection is the analyst's: it comes from the configuration, from CLI
//! flags folded into it, or from an interactive prompt that shows every
//! score next to the advisory recommendation.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crime_trends_analytics::engine::ClusteringEngine;
use crime_trends_analytics::label::label_clusters;
use crime_trends_analytics::progress::ProgressCallback;
use crime_trends_analytics::reduce::{PLOT_COMPONENTS, Projection, principal_components};
use crime_trends_analytics::select::{Evaluation, evaluate, silhouette_sweep};
use crime_trends_analytics::standardize::{feature_matrix, standardize};
use crime_trends_analytics::summary::cluster_summaries;
use crime_trends_analytics::trends::{crime_trends, rate_change_table};
use crime_trends_analytics_models::{
    AnalysisConfig, AnalysisSummary, Candidate, ProjectionRow, SweepPoint,
};
use crime_trends_cli_utils::{MultiProgress, TerminalProgress};
use crime_trends_crime_models::{CrimeType, study_years};
use crime_trends_neighborhood::simulate::{SimulationParams, simulate};
use crime_trends_neighborhood::{FeatureTable, join_tables};
use crime_trends_neighborhood_models::SesFeature;
use dialoguer::Select;
use ndarray::Array2;

use crate::output;

/// Where the feature table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// A merged CSV (profile and crime columns in one file).
    Merged(PathBuf),
    /// Separate crime and profile CSVs, joined on the neighbourhood name.
    Separate {
        /// Crime table.
        crime: PathBuf,
        /// Census profile table.
        profiles: PathBuf,
    },
    /// A synthetic table.
    Simulated(SimulationParams),
}

impl TableSource {
    /// Loads the table and logs plausibility warnings.
    ///
    /// `expected` applies to tables read from disk; a simulated table
    /// always has the size it was asked for.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened, parsing or the join
    /// fails, or simulation parameters are invalid.
    pub fn load(&self, expected: Option<usize>) -> Result<FeatureTable, Box<dyn std::error::Error>> {
        let table = match self {
            Self::Merged(path) => FeatureTable::from_merged_csv(open(path)?, expected)?,
            Self::Separate { crime, profiles } => {
                join_tables(open(crime)?, open(profiles)?, expected)?
            }
            Self::Simulated(params) => simulate(*params)?,
        };

        let warnings = table.check_plausibility();
        if !warnings.is_empty() {
            log::warn!("{} implausible values in the feature table", warnings.len());
        }

        Ok(table)
    }
}

fn open(path: &Path) -> Result<File, Box<dyn std::error::Error>> {
    File::open(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

/// Inputs of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Feature table source.
    pub source: TableSource,
    /// Validated analysis configuration.
    pub config: AnalysisConfig,
    /// Directory that receives every output file.
    pub output_dir: PathBuf,
}

/// Steps of a full run.
enum PipelineStep {
    Load,
    Standardize,
    Project,
    Sweep,
    Evaluate,
    Select,
    Label,
    Tabulate,
}

impl PipelineStep {
    const ALL: &[Self] = &[
        Self::Load,
        Self::Standardize,
        Self::Project,
        Self::Sweep,
        Self::Evaluate,
        Self::Select,
        Self::Label,
        Self::Tabulate,
    ];

    /// Steps up to and including scoring.
    const EVALUATION: &[Self] = &[
        Self::Load,
        Self::Standardize,
        Self::Project,
        Self::Sweep,
        Self::Evaluate,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Load => "Load feature table",
            Self::Standardize => "Standardize indicators",
            Self::Project => "Principal components",
            Self::Sweep => "Silhouette sweep",
            Self::Evaluate => "Fit & score candidates",
            Self::Select => "Select configuration",
            Self::Label => "Label clusters",
            Self::Tabulate => "Write tables",
        }
    }
}

/// Tracks the step bar's `[current/total]` prefix.
struct StepTracker {
    bar: Arc<dyn ProgressCallback>,
    current: usize,
    total: usize,
}

impl StepTracker {
    fn new(multi: &MultiProgress, steps: &[PipelineStep]) -> Self {
        let total = steps.len();
        Self {
            bar: TerminalProgress::steps_bar(multi, "Pipeline", total as u64),
            current: 0,
            total,
        }
    }

    /// Marks the previous step done and announces `step`.
    fn begin(&mut self, step: &PipelineStep) {
        if self.current > 0 {
            self.bar.inc(1);
        }
        self.current += 1;
        let message = format!("[{}/{}] {}", self.current, self.total, step.label());
        log::info!("{message}");
        self.bar.set_message(message);
    }

    fn finish(&self, message: String) {
        self.bar.inc(1);
        self.bar.finish(message);
    }
}

/// Everything known once the candidates are scored.
struct Evaluated {
    table: FeatureTable,
    scaled: Array2<f64>,
    projection: Projection,
    sweep: Vec<SweepPoint>,
    evaluation: Evaluation,
}

fn evaluate_table(
    multi: &MultiProgress,
    options: &PipelineOptions,
    steps: &mut StepTracker,
) -> Result<Evaluated, Box<dyn std::error::Error>> {
    let config = &options.config;

    steps.begin(&PipelineStep::Load);
    let table = options.source.load(config.table.expected_neighbourhoods)?;
    log::info!("Feature table has {} neighbourhoods", table.len());

    steps.begin(&PipelineStep::Standardize);
    let raw = feature_matrix(table.records());
    let (scaled, scaler) = standardize(raw.view())?;
    for (i, feature) in SesFeature::ALL.iter().enumerate() {
        log::debug!(
            "{feature}: mean {:.4}, std {:.4}",
            scaler.means[i],
            scaler.stds[i]
        );
    }

    steps.begin(&PipelineStep::Project);
    let projection = principal_components(scaled.view(), PLOT_COMPONENTS)?;
    log::info!(
        "PC1 + PC2 explain {:.1}% of the variance",
        projection.diagnostics.retained_ratio * 100.0
    );

    let engine = ClusteringEngine::new(config);

    steps.begin(&PipelineStep::Sweep);
    let sweep_bar = TerminalProgress::fits_bar(multi, "Silhouette sweep");
    let sweep = silhouette_sweep(&engine, scaled.view(), &config.sweep_ks, &sweep_bar)?;
    sweep_bar.finish_and_clear();
    if let Some(best) = sweep
        .iter()
        .copied()
        .reduce(|best, p| if p.silhouette > best.silhouette { p } else { best })
    {
        log::info!(
            "Best K-means silhouette {:.3} at K = {}",
            best.silhouette,
            best.k
        );
    }

    steps.begin(&PipelineStep::Evaluate);
    let fits_bar = TerminalProgress::fits_bar(multi, "Fitting candidates");
    let evaluation = evaluate(&engine, scaled.view(), &config.candidates(), &fits_bar)?;
    fits_bar.finish_and_clear();

    Ok(Evaluated {
        table,
        scaled,
        projection,
        sweep,
        evaluation,
    })
}

fn write_evaluation(dir: &Path, evaluated: &Evaluated) -> Result<(), Box<dyn std::error::Error>> {
    output::write_csv(
        &dir.join(output::EVALUATION_FILE),
        evaluated.evaluation.scores(),
    )?;
    output::write_csv(&dir.join(output::SWEEP_FILE), &evaluated.sweep)?;
    Ok(())
}

fn print_scores(multi: &MultiProgress, evaluation: &Evaluation) {
    let recommended = evaluation.recommend();
    multi.suspend(|| {
        println!();
        println!(
            "{:<6} {:>3} {:>11} {:>15} {:>18}",
            "Model", "K", "Silhouette", "Davies-Bouldin", "Calinski-Harabasz"
        );
        for record in evaluation.scores() {
            let marker = if Some(record.candidate()) == recommended {
                "  <- recommended"
            } else {
                ""
            };
            println!(
                "{:<6} {:>3} {:>11.3} {:>15.3} {:>18.1}{marker}",
                record.model.label(),
                record.k,
                record.silhouette,
                record.davies_bouldin,
                record.calinski_harabasz
            );
        }
        println!();
    });
}

/// Fits and scores every candidate and writes the evaluation tables,
/// without committing to a configuration.
///
/// # Errors
///
/// Returns an error if loading, standardization, fitting, scoring, or
/// writing fails.
pub fn evaluate_only(
    multi: &MultiProgress,
    options: &PipelineOptions,
) -> Result<Option<Candidate>, Box<dyn std::error::Error>> {
    let start = Instant::now();
    std::fs::create_dir_all(&options.output_dir)?;

    let mut steps = StepTracker::new(multi, PipelineStep::EVALUATION);
    let evaluated = evaluate_table(multi, options, &mut steps)?;
    write_evaluation(&options.output_dir, &evaluated)?;
    steps.finish(format!(
        "Scored {} configurations",
        evaluated.evaluation.scores().len()
    ));

    print_scores(multi, &evaluated.evaluation);
    log::info!("Evaluation complete in {:.1}s", start.elapsed().as_secs_f64());

    Ok(evaluated.evaluation.recommend())
}

/// Picks the configuration to label: the configured selection if there is
/// one, otherwise the analyst's answer to an interactive prompt.
fn choose(
    multi: &MultiProgress,
    config: &AnalysisConfig,
    evaluation: &Evaluation,
) -> Result<Candidate, Box<dyn std::error::Error>> {
    if let Some(selection) = config.selection {
        return Ok(selection);
    }
    if !console::user_attended() {
        return Err("no configuration selected: set [selection] in the config \
                    or pass --family and --k"
            .into());
    }

    let recommended = evaluation.recommend();
    let scores = evaluation.scores();
    let labels: Vec<String> = scores
        .iter()
        .map(|s| {
            let suffix = if Some(s.candidate()) == recommended {
                " (recommended)"
            } else {
                ""
            };
            format!(
                "{}: silhouette {:.3}, Davies-Bouldin {:.3}, Calinski-Harabasz {:.1}{suffix}",
                s.candidate(),
                s.silhouette,
                s.davies_bouldin,
                s.calinski_harabasz
            )
        })
        .collect();
    let default = recommended
        .and_then(|r| scores.iter().position(|s| s.candidate() == r))
        .unwrap_or(0);

    let idx = multi.suspend(|| {
        Select::new()
            .with_prompt("Which configuration should be labelled?")
            .items(&labels)
            .default(default)
            .interact()
    })?;

    Ok(scores[idx].candidate())
}

/// Runs the whole analysis and writes every output table plus the JSON
/// run summary.
///
/// # Errors
///
/// Returns an error if any step fails, including an ambiguous opportunity
/// ranking of the selected configuration's clusters.
#[allow(clippy::too_many_lines)]
pub fn run(
    multi: &MultiProgress,
    options: &PipelineOptions,
) -> Result<AnalysisSummary, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let dir = options.output_dir.as_path();
    std::fs::create_dir_all(dir)?;

    let mut steps = StepTracker::new(multi, PipelineStep::ALL);
    let evaluated = evaluate_table(multi, options, &mut steps)?;
    write_evaluation(dir, &evaluated)?;
    let Evaluated {
        table,
        scaled,
        projection,
        sweep,
        evaluation,
    } = evaluated;

    steps.begin(&PipelineStep::Select);
    if options.config.selection.is_none() {
        print_scores(multi, &evaluation);
    }
    let selection = choose(multi, &options.config, &evaluation)?;
    let fitted = evaluation.select(selection)?;
    let assignments = fitted.labels();

    steps.begin(&PipelineStep::Label);
    let centroids = fitted.model.centroids();
    let labels = label_clusters(centroids.view())?;

    steps.begin(&PipelineStep::Tabulate);
    let rows = labels.assignment_rows(table.names(), assignments)?;
    output::write_csv(&dir.join(output::ASSIGNMENTS_FILE), &rows)?;

    let projection_rows: Vec<ProjectionRow> = table
        .names()
        .zip(projection.coordinates.rows())
        .zip(assignments)
        .map(|((name, coords), &cluster)| ProjectionRow {
            neighbourhood: name.to_string(),
            pc1: coords[0],
            pc2: coords[1],
            cluster,
        })
        .collect();
    output::write_csv(&dir.join(output::PROJECTION_FILE), &projection_rows)?;

    let clusters = cluster_summaries(table.records(), assignments, &labels)?;
    output::write_csv(&dir.join(output::SUMMARY_FILE), &clusters)?;

    let trends = crime_trends(
        table.records(),
        assignments,
        &labels,
        CrimeType::analyzed(),
        &study_years(),
    )?;
    output::write_csv(&dir.join(output::TRENDS_FILE), &trends)?;
    for &crime in CrimeType::analyzed() {
        let rate_change = rate_change_table(&trends, &labels, crime);
        if rate_change.rows.is_empty() {
            continue;
        }
        output::write_rate_change(&output::rate_change_path(dir, &rate_change), &rate_change)?;
    }

    let summary = AnalysisSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        config: options.config.clone(),
        neighbourhoods: scaled.nrows(),
        variance: projection.diagnostics,
        sweep,
        scores: evaluation.scores().to_vec(),
        recommendation: evaluation.recommend(),
        selection,
        clusters,
    };
    output::write_json(&dir.join(output::RUN_SUMMARY_FILE), &summary)?;

    steps.finish(format!("Labelled {selection}"));
    log::info!("Pipeline complete in {:.1}s", start.elapsed().as_secs_f64());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use crime_trends_analytics::config::default_config;
    use crime_trends_analytics_models::ModelFamily;
    use crime_trends_cli_utils::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn options(name: &str) -> PipelineOptions {
        PipelineOptions {
            source: TableSource::Simulated(SimulationParams::default()),
            config: default_config().unwrap(),
            output_dir: std::env::temp_dir().join(format!(
                "crime_trends_pipeline_{name}_{}",
                std::process::id()
            )),
        }
    }

    #[test]
    fn full_run_writes_every_table() {
        let options = options("run");
        let summary = run(&hidden(), &options).unwrap();

        assert_eq!(
            summary.selection,
            Candidate {
                family: ModelFamily::KMeans,
                k: 3
            }
        );
        assert_eq!(summary.neighbourhoods, 158);
        assert_eq!(summary.scores.len(), 4);
        assert_eq!(summary.sweep.len(), 5);
        assert_eq!(summary.clusters.len(), 3);
        assert_eq!(summary.clusters.iter().map(|c| c.n).sum::<usize>(), 158);
        assert_eq!(summary.clusters[0].opportunity_index, "Low Opportunity");
        assert_eq!(summary.clusters[2].opportunity_index, "High Opportunity");
        assert!(summary.clusters[0].composite_score < summary.clusters[2].composite_score);

        let dir = &options.output_dir;
        for file in [
            output::ASSIGNMENTS_FILE,
            output::EVALUATION_FILE,
            output::SWEEP_FILE,
            output::PROJECTION_FILE,
            output::SUMMARY_FILE,
            output::TRENDS_FILE,
            output::RUN_SUMMARY_FILE,
            "assault_rate_change.csv",
            "shooting_rate_change.csv",
        ] {
            assert!(dir.join(file).is_file(), "missing {file}");
        }

        let assignments = std::fs::read_to_string(dir.join(output::ASSIGNMENTS_FILE)).unwrap();
        assert_eq!(assignments.lines().count(), 159);
        assert_eq!(
            assignments.lines().next(),
            Some("neighbourhood,cluster,opportunity_index")
        );

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn runs_are_reproducible() {
        let first = options("repeat_a");
        let second = options("repeat_b");
        let a = run(&hidden(), &first).unwrap();
        let b = run(&hidden(), &second).unwrap();

        assert_eq!(a.scores, b.scores);
        assert_eq!(a.clusters, b.clusters);
        assert_eq!(
            std::fs::read_to_string(first.output_dir.join(output::ASSIGNMENTS_FILE)).unwrap(),
            std::fs::read_to_string(second.output_dir.join(output::ASSIGNMENTS_FILE)).unwrap()
        );

        std::fs::remove_dir_all(&first.output_dir).unwrap();
        std::fs::remove_dir_all(&second.output_dir).unwrap();
    }

    #[test]
    fn evaluation_writes_scores_without_labelling() {
        let mut options = options("evaluate");
        options.config.selection = None;
        let recommendation = evaluate_only(&hidden(), &options).unwrap();

        assert!(recommendation.is_some());
        let dir = &options.output_dir;
        assert!(dir.join(output::EVALUATION_FILE).is_file());
        assert!(dir.join(output::SWEEP_FILE).is_file());
        assert!(!dir.join(output::ASSIGNMENTS_FILE).exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_input_file_names_the_path() {
        let source = TableSource::Merged(PathBuf::from("does/not/exist.csv"));
        let err = source.load(None).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.csv"));
    }
}
