//! Fallback extraction strategy: layout-aware page text via pdfium.
//!
//! pdfium decodes fonts and content streams that the pure-Rust text-layer
//! reader gives up on, at the cost of needing the native library at runtime.
//! Binding happens per call: the fallback only runs for sparse or unreadable
//! ranges, and a missing library then fails that one job instead of the
//! whole service at start-up.
//!
//! Like all [`TextExtractor`]s this is blocking; the pdfium C++ library keeps
//! thread-local state and must stay off the async worker threads.

use super::extract::{ExtractedPage, TextExtractor};
use crate::config::PageRange;
use crate::error::{LessonError, Result};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// pdfium-backed text extraction.
#[derive(Debug, Default, Clone)]
pub struct PdfiumTextExtractor {
    library_dir: Option<PathBuf>,
}

impl PdfiumTextExtractor {
    /// Bind to the library in `library_dir` if given, else the working
    /// directory, else the system library.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium> {
        let dir = self
            .library_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./"));
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| LessonError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl TextExtractor for PdfiumTextExtractor {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn extract(&self, pdf_path: &Path, range: PageRange) -> Result<Vec<ExtractedPage>> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| LessonError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total = pages.len() as u32;
        info!("PDF loaded in pdfium: {} pages", total);
        if range.to_page() > total {
            return Err(LessonError::PageOutOfRange {
                page: range.to_page(),
                total,
            });
        }

        let mut results = Vec::with_capacity(range.len());
        for page_number in range.pages() {
            let idx = (page_number - 1) as PdfPageIndex;
            let page = pages.get(idx).map_err(|e| LessonError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: {:?}", page_number, e),
            })?;

            let text = match page.text() {
                Ok(text) => text.all(),
                Err(e) => {
                    warn!("Page {}: pdfium text unavailable: {:?}", page_number, e);
                    String::new()
                }
            };
            debug!("Page {} → {} chars", page_number, text.len());
            results.push(ExtractedPage { page_number, text });
        }
        Ok(results)
    }
}
