//! Identifiers and the persisted key layout.
//!
//! ```text
//! pdfs/<document_id>.pdf      uploaded source documents
//! jobs/<job_id>/bundle.zip    finished lesson bundles
//! ```
//!
//! Ids are lowercase hex UUIDv4 strings. Ids arriving from outside the
//! process are checked against a conservative alphabet before they are
//! spliced into a key or a file name.

use crate::error::{LessonError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Namespace holding uploaded documents.
pub const DOCUMENT_PREFIX: &str = "pdfs/";

/// Namespace holding job outputs.
pub const JOB_PREFIX: &str = "jobs/";

/// File name of the archive inside a job's namespace.
pub const BUNDLE_FILE_NAME: &str = "bundle.zip";

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap());

/// Allocate a fresh id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Reject ids that could escape their namespace.
pub fn validate_id(id: &str) -> Result<()> {
    if ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(LessonError::InvalidRequest(format!(
            "malformed id '{id}': expected 1-128 characters of [A-Za-z0-9_-]"
        )))
    }
}

/// Storage key of an uploaded document.
pub fn document_key(document_id: &str) -> String {
    format!("{DOCUMENT_PREFIX}{document_id}.pdf")
}

/// Storage key of a job's bundle. Deterministic in the job id, so a
/// redelivered job overwrites rather than duplicates its output.
pub fn bundle_key(job_id: &str) -> String {
    format!("{JOB_PREFIX}{job_id}/{BUNDLE_FILE_NAME}")
}

/// Recover the document id from a `pdfs/<id>.pdf` key.
pub fn document_id_from_key(key: &str) -> Option<&str> {
    let id = key.strip_prefix(DOCUMENT_PREFIX)?.strip_suffix(".pdf")?;
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}
