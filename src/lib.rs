//! # lesson-bundler
//!
//! Turn a page range of an uploaded PDF into a downloadable lesson bundle: a
//! narrated-lesson script written by an LLM plus the page-range metadata,
//! zipped together and produced by an asynchronous job pipeline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload ──▶ submit ──▶ [job store] ──▶ worker
//!                                        │
//!   ├─ 1. Resolve    local path, or download a presigned URL to a per-job temp dir
//!   ├─ 2. Extract    lopdf text layer; pdfium if the range yields < 50 chars
//!   ├─ 3. Transform  one chat call: combined "[Page N]" text → lesson script
//!   ├─ 4. Assemble   lesson.txt + meta.json → deflate zip
//!   ├─ 5. Persist    jobs/<job_id>/bundle.zip
//!   └─ 6. Report     {job_id, bundle_key} → succeeded
//! ```
//!
//! Documents and bundles live behind the [`Storage`] trait, backed either by
//! a local directory or an S3-compatible bucket with presigned access.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lesson_bundler::{JobWorker, LessonPipeline, LessonService, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .local_storage("./data")
//!         .api_key(std::env::var("OPENAI_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let service = LessonService::from_config(&config)?;
//!
//!     let mut pdf = tokio::fs::File::open("chapter.pdf").await?;
//!     let doc = service.upload_document(&mut pdf, Some("application/pdf")).await?;
//!     let job = service.submit_job(&doc.document_id, 2, 4).await?;
//!
//!     let pipeline = LessonPipeline::from_config(&config, Arc::clone(service.storage()))?;
//!     JobWorker::new(Arc::clone(service.jobs()), pipeline, &config)
//!         .run_once()
//!         .await?;
//!
//!     println!("{:?}", service.job_status(&job.job_id).await?.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lessonctl` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod lesson;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageRange, S3Config, ServiceConfig, ServiceConfigBuilder, StorageConfig, TransformConfig};
pub use error::{ErrorKind, LessonError, Result};
pub use jobs::worker::WorkSummary;
pub use jobs::{FileJobStore, JobRecord, JobResult, JobSpec, JobState, JobStatus, JobStore, JobWorker};
pub use lesson::LessonPipeline;
pub use pipeline::extract::{ContentExtractor, ExtractedPage, TextExtractor};
pub use pipeline::script::{LlmScriptWriter, ScriptWriter};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use service::{BundleLocation, DocumentInfo, DocumentSummary, LessonService, UploadedDocument};
pub use storage::{open_storage, LocalStorage, PresignedRef, RemoteStorage, Resolved, Storage, StoredObject};
