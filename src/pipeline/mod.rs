//! Pipeline stages for turning a page range into a lesson bundle.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and can be swapped (e.g. another extraction strategy) without touching the
//! others. [`crate::lesson::LessonPipeline`] chains them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ script ──▶ bundle
//! (key)     (text)      (LLM)      (zip)
//!             │
//!    text_layer ─┴─ render (fallback)
//! ```
//!
//! 1. [`input`]: resolve a document key to a local file, downloading
//!    presigned references into a per-job temp dir
//! 2. [`extract`]: per-page text with the sparse-yield fallback; the
//!    strategies live in [`text_layer`] (lopdf) and [`render`] (pdfium) and
//!    run in `spawn_blocking`
//! 3. [`script`]: combine page text and call the transformation service;
//!    the only stage with outbound network I/O besides downloads
//! 4. [`bundle`]: zip the script and metadata in memory

pub mod bundle;
pub mod extract;
pub mod input;
pub mod render;
pub mod script;
pub mod text_layer;

use crate::config::ServiceConfig;
use extract::ContentExtractor;
use render::PdfiumTextExtractor;
use std::sync::Arc;
use text_layer::TextLayerExtractor;

impl ContentExtractor {
    /// Text layer first, pdfium on sparse or failed results.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(TextLayerExtractor::new()),
            Arc::new(PdfiumTextExtractor::new(config.pdfium_library_path.clone())),
            config.min_text_chars,
        )
    }
}
