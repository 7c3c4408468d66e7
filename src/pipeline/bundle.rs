//! Bundle assembly: an in-memory deflate zip of a job's output files.

use crate::config::PageRange;
use crate::error::{LessonError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the script entry inside a lesson bundle.
pub const SCRIPT_FILE: &str = "lesson.txt";
/// Name of the metadata entry inside a lesson bundle.
pub const METADATA_FILE: &str = "meta.json";

/// Content of [`METADATA_FILE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BundleMetadata {
    pub from_page: u32,
    pub to_page: u32,
}

impl From<PageRange> for BundleMetadata {
    fn from(range: PageRange) -> Self {
        Self {
            from_page: range.from_page(),
            to_page: range.to_page(),
        }
    }
}

/// Zip `files` (name → bytes) into a single archive.
///
/// Entries are written in key order with a fixed timestamp, so equal input
/// maps yield byte-identical archives.
pub fn assemble(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for (name, data) in files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| LessonError::BundleFailed(format!("{name}: {e}")))?;
        writer
            .write_all(data)
            .map_err(|e| LessonError::BundleFailed(format!("{name}: {e}")))?;
    }

    let bytes = writer
        .finish()
        .map_err(|e| LessonError::BundleFailed(e.to_string()))?
        .into_inner();
    debug!("Assembled {} entries into {} bytes", files.len(), bytes.len());
    Ok(bytes)
}

/// The file set of a lesson bundle: the script and the page-range metadata.
pub fn lesson_files(script: &str, range: PageRange) -> Result<BTreeMap<String, Vec<u8>>> {
    let metadata = serde_json::to_vec(&BundleMetadata::from(range))
        .map_err(|e| LessonError::BundleFailed(format!("{METADATA_FILE}: {e}")))?;

    let mut files = BTreeMap::new();
    files.insert(SCRIPT_FILE.to_string(), script.as_bytes().to_vec());
    files.insert(METADATA_FILE.to_string(), metadata);
    Ok(files)
}
