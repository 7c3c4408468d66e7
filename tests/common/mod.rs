//! Shared helpers for the integration tests: synthetic PDFs, stub script
//! writers and extractors, and service wiring over temp directories.

#![allow(dead_code)]

use async_trait::async_trait;
use lesson_bundler::pipeline::text_layer::TextLayerExtractor;
use lesson_bundler::{
    ContentExtractor, ExtractedPage, FileJobStore, JobWorker, LessonError, LessonPipeline,
    LessonService, PageRange, ScriptWriter, ServiceConfig, Storage, TextExtractor,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Documents ────────────────────────────────────────────────────────────────

/// Body text placed on page `n` of [`sample_pdf`].
pub fn page_text(n: u32) -> String {
    format!("Page {n}: photosynthesis converts light energy into chemical energy")
}

/// A `pages`-page PDF with one line of Courier text per page.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(page_text(n))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialise PDF");
    bytes
}

/// Unzip `archive` into (name, bytes) pairs.
pub fn unzip(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip");
    (0..zip.len())
        .map(|i| {
            let mut entry = zip.by_index(i).expect("zip entry");
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).expect("read entry");
            (entry.name().to_string(), buf)
        })
        .collect()
}

// ── Stubs ────────────────────────────────────────────────────────────────────

/// Returns a fixed script and remembers what it was asked to transform.
#[derive(Default)]
pub struct RecordingWriter {
    pub inputs: Mutex<Vec<(String, PageRange)>>,
}

#[async_trait]
impl ScriptWriter for RecordingWriter {
    async fn write_script(&self, combined_text: &str, range: PageRange) -> lesson_bundler::Result<String> {
        self.inputs
            .lock()
            .unwrap()
            .push((combined_text.to_string(), range));
        Ok(format!(
            "Welcome! Today we cover pages {} to {}.",
            range.from_page(),
            range.to_page()
        ))
    }
}

/// Simulates the transformation service answering with an error.
pub struct FailingWriter;

#[async_trait]
impl ScriptWriter for FailingWriter {
    async fn write_script(&self, _combined_text: &str, _range: PageRange) -> lesson_bundler::Result<String> {
        Err(LessonError::TransformationFailed {
            message: "HTTP 503 Service Unavailable".into(),
        })
    }
}

/// Like [`RecordingWriter`] but takes `delay` to answer.
pub struct SlowWriter {
    pub delay: std::time::Duration,
}

#[async_trait]
impl ScriptWriter for SlowWriter {
    async fn write_script(&self, _combined_text: &str, range: PageRange) -> lesson_bundler::Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("A slow lesson on pages {range}."))
    }
}

/// A fallback that is never usable, standing in for a missing pdfium.
pub struct UnavailableExtractor;

impl TextExtractor for UnavailableExtractor {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn extract(&self, _pdf_path: &Path, _range: PageRange) -> lesson_bundler::Result<Vec<ExtractedPage>> {
        Err(LessonError::PdfiumBindingFailed("not installed in tests".into()))
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Config rooted in `dir` with fast polling.
pub fn test_config(dir: &Path) -> ServiceConfig {
    config_with_concurrency(dir, 2)
}

pub fn config_with_concurrency(dir: &Path, concurrency: usize) -> ServiceConfig {
    ServiceConfig::builder()
        .local_storage(dir.join("data"))
        .job_store_dir(dir.join("job-state"))
        .scratch_dir(dir.join("scratch"))
        .poll_interval_ms(10)
        .worker_concurrency(concurrency)
        .build()
        .expect("valid test config")
}

/// Text-layer extraction with an always-failing fallback.
pub fn test_extractor(config: &ServiceConfig) -> ContentExtractor {
    ContentExtractor::new(
        Arc::new(TextLayerExtractor::new()),
        Arc::new(UnavailableExtractor),
        config.min_text_chars,
    )
}

/// Service + worker sharing `storage` and a file job store under `dir`.
pub fn wire(
    dir: &Path,
    storage: Arc<dyn Storage>,
    writer: Arc<dyn ScriptWriter>,
) -> (LessonService, JobWorker) {
    wire_with(&test_config(dir), storage, writer)
}

/// [`wire`] with an explicit config.
pub fn wire_with(
    config: &ServiceConfig,
    storage: Arc<dyn Storage>,
    writer: Arc<dyn ScriptWriter>,
) -> (LessonService, JobWorker) {
    let jobs = Arc::new(FileJobStore::new(&config.job_store_dir).expect("job store"));
    let service = LessonService::new(Arc::clone(&storage), jobs.clone(), config);
    let pipeline = LessonPipeline::new(storage, test_extractor(config), writer, config);
    let worker = JobWorker::new(jobs, pipeline, config);
    (service, worker)
}

/// Upload `pdf` through the service and return its document id.
pub async fn upload(service: &LessonService, pdf: &[u8]) -> String {
    let mut reader = pdf;
    service
        .upload_document(&mut reader, Some("application/pdf"))
        .await
        .expect("upload")
        .document_id
}
