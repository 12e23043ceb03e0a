#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `crime_trends` binary.
//!
//! [`TerminalProgress`] draws analytics [`ProgressCallback`] reports as
//! `indicatif` bars, and [`init_logger`] routes `log` records through the
//! same [`MultiProgress`] so a log line never tears a bar in half.

use std::sync::Arc;
use std::time::Duration;

use crime_trends_analytics::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::{MultiProgress, ProgressDrawTarget};

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const FITS_TEMPLATE: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} models [{elapsed_precise}]";
const STEPS_TEMPLATE: &str = "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]";

fn counted_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// A [`ProgressCallback`] drawn on the terminal.
pub struct TerminalProgress {
    bar: ProgressBar,
    /// Applied by `begin()`.
    counted: ProgressStyle,
}

impl TerminalProgress {
    /// A bar for a batch of model fits. Spins until the engine announces
    /// the batch size, then counts fitted models.
    #[must_use]
    pub fn fits_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message.to_string());

        Arc::new(Self {
            bar,
            counted: counted_style(FITS_TEMPLATE),
        })
    }

    /// A bar over the `total` steps of the pipeline.
    #[must_use]
    pub fn steps_bar(multi: &MultiProgress, message: &str, total: u64) -> Arc<dyn ProgressCallback> {
        let counted = counted_style(STEPS_TEMPLATE);
        let bar = multi.add(ProgressBar::new(total).with_style(counted.clone()));
        bar.set_message(message.to_string());

        Arc::new(Self { bar, counted })
    }
}

impl ProgressCallback for TerminalProgress {
    fn begin(&self, total: u64) {
        self.bar.set_style(self.counted.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge` and returns
/// the [`MultiProgress`] every bar must join.
///
/// Records at `info` and above are shown unless `RUST_LOG` says
/// otherwise. Only the first call installs a logger.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn steps_bar_counts_steps() {
        let progress = TerminalProgress::steps_bar(&hidden(), "Pipeline", 3);
        progress.set_message("[1/3] Load feature table".to_string());
        progress.inc(1);
        progress.inc(2);
        progress.finish("done".to_string());
    }

    #[test]
    fn fits_bar_switches_to_a_counted_bar() {
        let progress = TerminalProgress::fits_bar(&hidden(), "Fitting");
        progress.begin(4);
        progress.inc(4);
        progress.finish_and_clear();
    }

    #[test]
    fn second_logger_install_is_ignored() {
        let _first = init_logger();
        let _second = init_logger();
        log::info!("still logging");
    }
}
