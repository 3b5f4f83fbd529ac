//! Progress reporting for long-running stages.
//!
//! [`ProgressCallback`] decouples progress reporting from any rendering
//! backend. The CLI renders it with `indicatif`; library callers and tests
//! use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from a long-running stage.
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// concurrent workers.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
