//! Loading and validation of [`AnalysisConfig`].
//!
//! The default configuration is embedded at compile time from
//! `analysis.toml` so a bare invocation reproduces the published analysis.

use std::path::Path;

use crime_trends_analytics_models::AnalysisConfig;

use crate::AnalyticsError;

/// The embedded default configuration file.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../analysis.toml");

/// Parses and validates the embedded default configuration.
///
/// # Errors
///
/// Returns an error if the embedded file is invalid, which indicates a
/// development error caught by the test suite.
pub fn default_config() -> Result<AnalysisConfig, AnalyticsError> {
    parse_config(DEFAULT_CONFIG_TOML)
}

/// Parses and validates a TOML configuration. Omitted keys take their
/// [`AnalysisConfig::default`] values.
///
/// # Errors
///
/// Returns [`AnalyticsError::Toml`] for malformed TOML and
/// [`AnalyticsError::Config`] if validation fails.
pub fn parse_config(toml_str: &str) -> Result<AnalysisConfig, AnalyticsError> {
    let config: AnalysisConfig = toml::from_str(toml_str)?;
    validate_config(&config)?;
    Ok(config)
}

/// Reads, parses, and validates a TOML configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, AnalyticsError> {
    log::debug!("Loading analysis config from {}", path.display());
    parse_config(&std::fs::read_to_string(path)?)
}

fn invalid(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::Config {
        message: message.into(),
    }
}

/// Checks that a configuration can drive a run.
///
/// # Errors
///
/// Returns [`AnalyticsError::Config`] describing the first problem found.
pub fn validate_config(config: &AnalysisConfig) -> Result<(), AnalyticsError> {
    if config.families.is_empty() {
        return Err(invalid("at least one model family is required"));
    }
    if config.candidate_ks.is_empty() {
        return Err(invalid("at least one candidate K is required"));
    }
    if let Some(k) = config
        .candidate_ks
        .iter()
        .chain(&config.sweep_ks)
        .find(|&&k| k < 2)
    {
        return Err(invalid(format!("cluster counts must be at least 2, got {k}")));
    }
    if config.k_means.n_init == 0 {
        return Err(invalid("k_means.n_init must be at least 1"));
    }
    if config.k_means.max_iter == 0 || config.gaussian_mixture.max_iter == 0 {
        return Err(invalid("max_iter must be at least 1"));
    }
    let mixture = &config.gaussian_mixture;
    if !(mixture.tolerance.is_finite() && mixture.tolerance > 0.0) {
        return Err(invalid("gaussian_mixture.tolerance must be positive"));
    }
    if !(mixture.reg_covar.is_finite() && mixture.reg_covar >= 0.0) {
        return Err(invalid("gaussian_mixture.reg_covar must be non-negative"));
    }
    if let Some(selection) = config.selection
        && !config.candidates().contains(&selection)
    {
        return Err(invalid(format!(
            "selection {selection} is not among the evaluated candidates"
        )));
    }
    Ok(())
}
