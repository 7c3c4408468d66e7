//! Progress-callback trait for per-job pipeline events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] into
//! [`crate::lesson::LessonPipeline::with_progress`] to observe jobs as the
//! worker runs them. Callers can forward events to a channel, a database row
//! or a terminal spinner without the library knowing how the host
//! communicates.
//!
//! # Example
//!
//! ```rust
//! use lesson_bundler::{JobProgressCallback, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_stage(&self, job_id: &str, stage: Stage) {
//!         eprintln!("{job_id}: {stage}");
//!     }
//!
//!     fn on_job_complete(&self, _job_id: &str, _bundle_key: &str) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

/// The steps of one job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Extract,
    Transform,
    Assemble,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolving document",
            Stage::Extract => "extracting text",
            Stage::Transform => "writing script",
            Stage::Assemble => "assembling bundle",
            Stage::Persist => "storing bundle",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it runs each job.
///
/// Jobs run concurrently, so methods may be called from several tasks at
/// once; protect shared state accordingly. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once when a worker starts the job.
    fn on_job_start(&self, job_id: &str) {
        let _ = job_id;
    }

    /// Called as the job enters each [`Stage`].
    fn on_stage(&self, job_id: &str, stage: Stage) {
        let _ = (job_id, stage);
    }

    /// Called after the bundle is stored.
    fn on_job_complete(&self, job_id: &str, bundle_key: &str) {
        let _ = (job_id, bundle_key);
    }

    /// Called when any stage fails.
    ///
    /// # Arguments
    /// * `error`: the same description recorded on the job
    fn on_job_failed(&self, job_id: &str, error: &str) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl JobProgressCallback for Recorder {
        fn on_job_start(&self, job_id: &str) {
            self.events.lock().unwrap().push(format!("start {job_id}"));
        }

        fn on_stage(&self, _job_id: &str, stage: Stage) {
            self.events.lock().unwrap().push(stage.to_string());
        }

        fn on_job_failed(&self, _job_id: &str, error: &str) {
            self.events.lock().unwrap().push(format!("failed: {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start("j");
        cb.on_stage("j", Stage::Extract);
        cb.on_job_complete("j", "jobs/j/bundle.zip");
        cb.on_job_failed("j", "boom");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();

        cb.on_job_start("j1");
        cb.on_stage("j1", Stage::Resolve);
        cb.on_stage("j1", Stage::Transform);
        // Not overridden: falls through to the default.
        cb.on_job_complete("j1", "jobs/j1/bundle.zip");
        cb.on_job_failed("j1", "service unavailable");

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "start j1",
                "resolving document",
                "writing script",
                "failed: service unavailable"
            ]
        );
    }
}
