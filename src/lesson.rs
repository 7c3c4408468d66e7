//! The per-job orchestrator.
//!
//! [`LessonPipeline::run`] executes one job end to end:
//!
//! 1. **Resolve** the document key to a local file (downloading presigned
//!    references into a temp dir named after the job)
//! 2. **Extract** the page range
//! 3. **Transform** the combined text into a script
//! 4. **Assemble** the zip bundle in memory
//! 5. **Persist** the bundle under `jobs/<job_id>/bundle.zip`
//! 6. **Report** `{job_id, bundle_key}`
//!
//! The first failing step ends the job. Nothing is written to storage before
//! step 5, so a failed job never leaves a bundle behind. The temp dir from
//! step 1 is owned by a guard value and removed on every exit path.

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::jobs::{JobResult, JobSpec};
use crate::keys;
use crate::pipeline::bundle;
use crate::pipeline::extract::ContentExtractor;
use crate::pipeline::input;
use crate::pipeline::script::{combine_pages, LlmScriptWriter, ScriptWriter};
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Content type of stored bundles.
pub const BUNDLE_CONTENT_TYPE: &str = "application/zip";

/// Everything one job needs, shared across concurrently running jobs.
#[derive(Clone)]
pub struct LessonPipeline {
    storage: Arc<dyn Storage>,
    extractor: ContentExtractor,
    writer: Arc<dyn ScriptWriter>,
    scratch_dir: PathBuf,
    download_timeout_secs: u64,
    progress: ProgressCallback,
}

impl LessonPipeline {
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: ContentExtractor,
        writer: Arc<dyn ScriptWriter>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            storage,
            extractor,
            writer,
            scratch_dir: config.scratch_dir.clone(),
            download_timeout_secs: config.download_timeout_secs,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// The production wiring: text-layer + pdfium extraction and the
    /// configured LLM provider.
    ///
    /// Fails if no transformation credential is configured.
    pub fn from_config(config: &ServiceConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        let writer = LlmScriptWriter::from_config(&config.transform)?;
        Ok(Self::new(
            storage,
            ContentExtractor::from_config(config),
            Arc::new(writer),
            config,
        ))
    }

    /// Report job events to `progress`.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Run one job to completion.
    pub async fn run(&self, job: &JobSpec) -> Result<JobResult> {
        let start = Instant::now();
        info!(
            "Job {}: pages {} of {}",
            job.job_id, job.range, job.document_key
        );
        self.progress.on_job_start(&job.job_id);

        match self.run_stages(job).await {
            Ok(result) => {
                info!(
                    "Job {} succeeded in {}ms → {}",
                    job.job_id,
                    start.elapsed().as_millis(),
                    result.bundle_key
                );
                self.progress.on_job_complete(&job.job_id, &result.bundle_key);
                Ok(result)
            }
            Err(e) => {
                warn!("Job {} failed: {}", job.job_id, e);
                self.progress.on_job_failed(&job.job_id, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stages(&self, job: &JobSpec) -> Result<JobResult> {
        // ── Step 1: Resolve ──────────────────────────────────────────────────
        self.progress.on_stage(&job.job_id, Stage::Resolve);
        let document = input::resolve_document(
            self.storage.as_ref(),
            &job.document_key,
            &job.job_id,
            &self.scratch_dir,
            self.download_timeout_secs,
        )
        .await?;

        // ── Step 2: Extract ──────────────────────────────────────────────────
        self.progress.on_stage(&job.job_id, Stage::Extract);
        let pages = self.extractor.extract(document.path(), job.range).await?;
        debug!("Job {}: extracted {} pages", job.job_id, pages.len());

        // ── Step 3: Transform ────────────────────────────────────────────────
        self.progress.on_stage(&job.job_id, Stage::Transform);
        let combined = combine_pages(&pages);
        let script = self.writer.write_script(&combined, job.range).await?;

        // ── Step 4: Assemble ─────────────────────────────────────────────────
        self.progress.on_stage(&job.job_id, Stage::Assemble);
        let files = bundle::lesson_files(&script, job.range)?;
        let archive = bundle::assemble(&files)?;

        // ── Step 5: Persist ──────────────────────────────────────────────────
        self.progress.on_stage(&job.job_id, Stage::Persist);
        let bundle_key = keys::bundle_key(&job.job_id);
        self.storage
            .put_bytes(&bundle_key, archive, Some(BUNDLE_CONTENT_TYPE))
            .await?;

        if document.is_temporary() {
            debug!("Job {}: removing temporary download", job.job_id);
        }
        drop(document);

        // ── Step 6: Report ───────────────────────────────────────────────────
        Ok(JobResult {
            job_id: job.job_id.clone(),
            bundle_key,
        })
    }
}
