//! Error types for the lesson-bundler library.
//!
//! Every fallible operation returns [`LessonError`]. Callers that need to
//! react to a *class* of failure (an HTTP adapter mapping to status codes, the
//! CLI choosing an exit code) should match on [`LessonError::kind`] rather
//! than on individual variants:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `NotFound` | document, job or bundle key is absent |
//! | `InvalidRequest` | bad page range, content type or id; rejected before enqueue |
//! | `NotComplete` | the job exists but has not succeeded (yet) |
//! | `Extraction` | page out of bounds, unreadable document, both strategies failed |
//! | `Transformation` | missing credential, service error, empty response |
//! | `Storage` | backend I/O during resolve / put / download |
//! | `Config` | construction-time misconfiguration |
//! | `Internal` | bugs and runtime plumbing failures |
//!
//! Job failures are recorded as the `Display` form of the error, so every
//! message carries enough context to be read on its own.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = LessonError> = std::result::Result<T, E>;

/// All errors returned by the lesson-bundler library.
#[derive(Debug, Error)]
pub enum LessonError {
    // ── Lookup errors ─────────────────────────────────────────────────────
    /// No stored document under this key.
    #[error("Document not found: '{key}'")]
    DocumentNotFound { key: String },

    /// No job record with this id.
    #[error("Job not found: '{job_id}'")]
    JobNotFound { job_id: String },

    /// The job succeeded but its bundle is missing from storage.
    #[error("Bundle not found: '{key}'")]
    BundleNotFound { key: String },

    // ── Request errors ────────────────────────────────────────────────────
    /// `from_page` / `to_page` violate `1 <= from_page <= to_page`.
    #[error("Invalid page range {from_page}-{to_page}: pages are 1-indexed and from_page must be <= to_page")]
    InvalidPageRange { from_page: u32, to_page: u32 },

    /// Anything else a caller got wrong (content type, malformed id, …).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The job exists but is not in the `succeeded` state.
    #[error("Job '{job_id}' is not complete yet (state: {state})")]
    JobNotComplete { job_id: String, state: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The requested range runs past the end of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// The document could not be parsed at all.
    #[error("Document '{path}' could not be read: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// Both the primary and the fallback strategy failed.
    #[error("Text extraction failed: primary ({primary}), fallback ({fallback})")]
    ExtractionFailed { primary: String, fallback: String },

    /// Could not bind to a pdfium library for the fallback strategy.
    #[error("Failed to bind to pdfium library: {0}\nSet the pdfium library directory or install libpdfium system-wide.")]
    PdfiumBindingFailed(String),

    // ── Transformation errors ─────────────────────────────────────────────
    /// No credential configured for the transformation service.
    #[error("Script provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The transformation service returned an error.
    #[error("Script generation failed: {message}")]
    TransformationFailed { message: String },

    /// The transformation call exceeded its timeout.
    #[error("Script generation timed out after {secs}s")]
    TransformationTimeout { secs: u64 },

    /// The service answered with no usable content.
    #[error("Script generation returned an empty response")]
    EmptyScript,

    // ── Storage errors ────────────────────────────────────────────────────
    /// Backend I/O failure for a key.
    #[error("Storage error for '{key}': {detail}")]
    Storage { key: String, detail: String },

    /// Fetching a presigned reference failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Fetching a presigned reference exceeded the timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Local file I/O outside of a storage backend (temp dirs, job records).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building the zip archive failed.
    #[error("Bundle assembly failed: {0}")]
    BundleFailed(String),

    // ── Job model errors ──────────────────────────────────────────────────
    /// A job state transition that the state machine does not allow.
    #[error("Job '{job_id}' cannot move from {from} to {to}")]
    IllegalTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// A job record on disk could not be (de)serialised.
    #[error("Corrupt job record '{job_id}': {source}")]
    CorruptJobRecord {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`LessonError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    NotComplete,
    Extraction,
    Transformation,
    Storage,
    Config,
    Internal,
}

impl LessonError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LessonError::DocumentNotFound { .. }
            | LessonError::JobNotFound { .. }
            | LessonError::BundleNotFound { .. } => ErrorKind::NotFound,
            LessonError::InvalidPageRange { .. } | LessonError::InvalidRequest(_) => {
                ErrorKind::InvalidRequest
            }
            LessonError::JobNotComplete { .. } => ErrorKind::NotComplete,
            LessonError::PageOutOfRange { .. }
            | LessonError::CorruptDocument { .. }
            | LessonError::ExtractionFailed { .. }
            | LessonError::PdfiumBindingFailed(_) => ErrorKind::Extraction,
            LessonError::ProviderNotConfigured { .. }
            | LessonError::TransformationFailed { .. }
            | LessonError::TransformationTimeout { .. }
            | LessonError::EmptyScript => ErrorKind::Transformation,
            LessonError::Storage { .. }
            | LessonError::DownloadFailed { .. }
            | LessonError::DownloadTimeout { .. }
            | LessonError::Io { .. } => ErrorKind::Storage,
            LessonError::InvalidConfig(_) => ErrorKind::Config,
            LessonError::BundleFailed(_)
            | LessonError::IllegalTransition { .. }
            | LessonError::CorruptJobRecord { .. }
            | LessonError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn storage(key: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        LessonError::Storage {
            key: key.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LessonError::Io {
            path: path.into(),
            source,
        }
    }
}
