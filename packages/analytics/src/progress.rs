//! Progress reporting for model fitting.
//!
//! The engine reports through [`ProgressCallback`] so it never depends on
//! a terminal. The CLI plugs in `indicatif` bars; library callers and
//! tests use [`null_progress`].

use std::sync::Arc;

/// Receives progress from a batch of model fits.
///
/// Shared behind an `Arc`, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Announces how many units the batch has.
    fn begin(&self, total: u64);

    /// Records `delta` finished units.
    fn inc(&self, delta: u64);

    /// Describes the unit in progress.
    fn set_message(&self, msg: String);

    /// Ends the batch, leaving `msg` on display.
    fn finish(&self, msg: String);

    /// Ends the batch and removes the indicator.
    fn finish_and_clear(&self);
}

/// Discards every report.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn begin(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
