//! Primary extraction strategy: read the PDF text layer with `lopdf`.
//!
//! Works without any native library. Documents encrypted with an empty user
//! password (common for "copy-protected" exports) are decrypted in place.

use super::extract::{ExtractedPage, TextExtractor};
use crate::config::PageRange;
use crate::error::{LessonError, Result};
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

/// Text-layer extraction via `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayerExtractor;

impl TextLayerExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Open `path`, decrypting documents protected only by an empty password.
fn load(path: &Path) -> Result<Document> {
    let mut doc = Document::load(path).map_err(|e| LessonError::CorruptDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    if doc.is_encrypted() {
        doc.decrypt("").map_err(|_| LessonError::CorruptDocument {
            path: path.to_path_buf(),
            detail: "document is password protected".into(),
        })?;
        debug!("Decrypted {} with empty password", path.display());
    }
    Ok(doc)
}

/// Number of pages in the document at `path`.
pub fn page_count(path: &Path) -> Result<u32> {
    Ok(load(path)?.get_pages().len() as u32)
}

impl TextExtractor for TextLayerExtractor {
    fn name(&self) -> &'static str {
        "text-layer"
    }

    fn extract(&self, pdf_path: &Path, range: PageRange) -> Result<Vec<ExtractedPage>> {
        let doc = load(pdf_path)?;
        let total = doc.get_pages().len() as u32;
        if range.to_page() > total {
            return Err(LessonError::PageOutOfRange {
                page: range.to_page(),
                total,
            });
        }

        let pages = range
            .pages()
            .map(|page_number| {
                // A single undecodable page (odd font encoding, broken content
                // stream) must not sink the range.
                let text = doc.extract_text(&[page_number]).unwrap_or_else(|e| {
                    warn!("Page {}: text layer unreadable: {}", page_number, e);
                    String::new()
                });
                ExtractedPage { page_number, text }
            })
            .collect();
        Ok(pages)
    }
}
