//! CSV and JSON writers for analysis outputs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crime_trends_analytics::trends::RateChangeTable;
use serde::Serialize;

/// Per-neighbourhood cluster and opportunity label.
pub const ASSIGNMENTS_FILE: &str = "cluster_neighbourhoods.csv";

/// Validation scores of every evaluated configuration.
pub const EVALUATION_FILE: &str = "cluster_evaluation_metrics.csv";

/// Exploratory K-means silhouette sweep.
pub const SWEEP_FILE: &str = "silhouette_sweep.csv";

/// First two principal coordinates per neighbourhood.
pub const PROJECTION_FILE: &str = "pca_coordinates.csv";

/// Raw indicator means per cluster.
pub const SUMMARY_FILE: &str = "cluster_summary.csv";

/// Mean crime rate per cluster, crime, and year.
pub const TRENDS_FILE: &str = "cluster_crime_rates.csv";

/// Everything the run decided.
pub const RUN_SUMMARY_FILE: &str = "analysis_summary.json";

/// Path of the rate-change table for one crime, e.g.
/// `assault_rate_change.csv`.
#[must_use]
pub fn rate_change_path(dir: &Path, table: &RateChangeTable) -> PathBuf {
    dir.join(format!("{}_rate_change.csv", table.crime.as_ref()))
}

/// Writes `rows` as a headed CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a row fails to
/// serialize.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes a pre-formatted rate-change table.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_rate_change(
    path: &Path,
    table: &RateChangeTable,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.header)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rate changes to {}", table.crime.title(), path.display());
    Ok(())
}

/// Writes `value` as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be created or serialization fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    serialize_json(BufWriter::new(File::create(path)?), value)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn serialize_json<W: Write, T: Serialize>(
    mut writer: W,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crime_trends_analytics_models::{ModelFamily, ScoreRecord, TrendRow};
    use crime_trends_crime_models::CrimeType;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crime_trends_output_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn score_records_are_written_with_headers() {
        let dir = scratch_dir("scores");
        let path = dir.join(EVALUATION_FILE);
        let rows = [ScoreRecord {
            model: ModelFamily::GaussianMixture,
            k: 3,
            silhouette: 0.25,
            davies_bouldin: 1.5,
            calinski_harabasz: 80.0,
        }];
        write_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("model,k,silhouette,davies_bouldin,calinski_harabasz")
        );
        assert_eq!(lines.next(), Some("gaussian_mixture,3,0.25,1.5,80.0"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_percent_change_is_an_empty_cell() {
        let dir = scratch_dir("trends");
        let path = dir.join(TRENDS_FILE);
        let rows = [TrendRow {
            crime: CrimeType::Robbery,
            year: 2019,
            opportunity_index: "Low Opportunity".to_string(),
            avg_rate: 120.5,
            pct_change: None,
        }];
        write_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("robbery,2019,Low Opportunity,120.5,"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    /// Accepts writes but cannot flush.
    struct UnflushableSink;

    impl Write for UnflushableSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn json_flush_failures_are_reported() {
        let err = serialize_json(BufWriter::new(UnflushableSink), &[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn json_is_fully_written() {
        let dir = scratch_dir("json");
        let path = dir.join(RUN_SUMMARY_FILE);
        write_json(&path, &vec!["Low Opportunity", "High Opportunity"]).unwrap();

        let parsed: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, ["Low Opportunity", "High Opportunity"]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rate_change_tables_are_named_after_the_crime() {
        let dir = scratch_dir("rate_change");
        let table = RateChangeTable {
            crime: CrimeType::Assault,
            header: vec!["Year".to_string(), "Low".to_string(), "High".to_string()],
            rows: vec![vec![
                "2019".to_string(),
                "900.0".to_string(),
                "200.0".to_string(),
            ]],
        };
        let path = rate_change_path(&dir, &table);
        assert!(path.ends_with("assault_rate_change.csv"));

        write_rate_change(&path, &table).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Year,Low,High\n2019,900.0,200.0\n");
        std::fs::remove_dir_all(dir).unwrap();
    }
}
