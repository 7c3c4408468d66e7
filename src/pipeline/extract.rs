//! Page-range text extraction with a density-driven fallback.
//!
//! Two strategies implement [`TextExtractor`]:
//!
//! 1. [`TextLayerExtractor`](super::text_layer::TextLayerExtractor): reads
//!    the PDF text layer directly. Cheap, and good enough for born-digital
//!    documents.
//! 2. [`PdfiumTextExtractor`](super::render::PdfiumTextExtractor): asks
//!    pdfium for layout-aware page text. Slower, needs the native library,
//!    and copes with documents whose text layer the first strategy cannot
//!    decode.
//!
//! [`ContentExtractor`] runs the primary strategy over the whole range and
//! sums the trimmed text length. Below `min_chars` the result is discarded
//! and the fallback's output is returned instead. The check is range-scoped:
//! one dense page among blank ones keeps the primary result.

use crate::config::PageRange;
use crate::error::{LessonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Text of one page. `page_number` follows the document's 1-indexed numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
}

/// One way of pulling text out of a PDF.
///
/// Implementations are blocking; [`ContentExtractor::extract`] runs them on
/// the blocking pool. They must return exactly one entry per page of `range`
/// in increasing order, and fail with [`LessonError::PageOutOfRange`] when the
/// range runs past the end of the document.
pub trait TextExtractor: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    fn extract(&self, pdf_path: &Path, range: PageRange) -> Result<Vec<ExtractedPage>>;
}

/// Sum of trimmed text lengths, in characters.
pub fn total_chars(pages: &[ExtractedPage]) -> usize {
    pages.iter().map(|p| p.text.trim().chars().count()).sum()
}

/// Primary + fallback extraction with a minimum-yield threshold.
#[derive(Clone)]
pub struct ContentExtractor {
    primary: Arc<dyn TextExtractor>,
    fallback: Arc<dyn TextExtractor>,
    min_chars: usize,
}

impl ContentExtractor {
    pub fn new(
        primary: Arc<dyn TextExtractor>,
        fallback: Arc<dyn TextExtractor>,
        min_chars: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            min_chars,
        }
    }

    /// Extract `range` from `pdf_path` on the blocking pool.
    pub async fn extract(&self, pdf_path: &Path, range: PageRange) -> Result<Vec<ExtractedPage>> {
        let this = self.clone();
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || this.extract_blocking(&path, range))
            .await
            .map_err(|e| LessonError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    /// Blocking implementation of [`ContentExtractor::extract`].
    pub fn extract_blocking(&self, pdf_path: &Path, range: PageRange) -> Result<Vec<ExtractedPage>> {
        let primary_err = match self.primary.extract(pdf_path, range) {
            Ok(pages) => {
                let chars = total_chars(&pages);
                if chars >= self.min_chars {
                    debug!(
                        "{}: {} chars over pages {}, keeping result",
                        self.primary.name(),
                        chars,
                        range
                    );
                    return Ok(pages);
                }
                info!(
                    "{} found only {} chars over pages {} (< {}), trying {}",
                    self.primary.name(),
                    chars,
                    range,
                    self.min_chars,
                    self.fallback.name()
                );
                match self.fallback.extract(pdf_path, range) {
                    Ok(fallback_pages) => return Ok(fallback_pages),
                    Err(e @ LessonError::PageOutOfRange { .. }) => return Err(e),
                    Err(e) => {
                        warn!("{} failed over pages {}: {}", self.fallback.name(), range, e);
                        return Err(LessonError::ExtractionFailed {
                            primary: format!(
                                "{} chars over pages {} (< {})",
                                chars, range, self.min_chars
                            ),
                            fallback: e.to_string(),
                        });
                    }
                }
            }
            Err(e @ LessonError::PageOutOfRange { .. }) => return Err(e),
            Err(e) => e,
        };

        warn!(
            "{} failed ({}), trying {}",
            self.primary.name(),
            primary_err,
            self.fallback.name()
        );
        self.fallback
            .extract(pdf_path, range)
            .map_err(|fallback_err| match fallback_err {
                e @ LessonError::PageOutOfRange { .. } => e,
                other => LessonError::ExtractionFailed {
                    primary: primary_err.to_string(),
                    fallback: other.to_string(),
                },
            })
    }
}
