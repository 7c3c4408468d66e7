//! Client-facing operations: the thin adapters around the job pipeline.
//!
//! [`LessonService`] is what an HTTP layer or the `lessonctl` binary talks
//! to. It validates requests before anything is enqueued, reads job state
//! from the durable store, and hands out bundle locations. It never runs the
//! pipeline itself; [`crate::jobs::JobWorker`] does.

use crate::config::{PageRange, ServiceConfig};
use crate::error::{LessonError, Result};
use crate::jobs::{FileJobStore, JobRecord, JobState, JobStatus, JobStore};
use crate::keys;
use crate::pipeline::{input, text_layer};
use crate::storage::{open_storage, Resolved, Storage, STREAM_CHUNK_SIZE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Content types accepted for uploads. Parameters (`; charset=…`) are ignored.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "application/octet-stream"];

/// Content type recorded for stored documents.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/pdf";

/// A freshly stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedDocument {
    pub document_id: String,
    pub document_key: String,
    pub size_bytes: Option<u64>,
}

/// One entry of [`LessonService::list_documents`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub document_key: String,
}

/// Result of [`LessonService::document_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub document_key: String,
    pub page_count: u32,
}

/// Where a finished bundle can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLocation {
    pub job_id: String,
    pub bundle_key: String,
    /// Local path to proxy, or a presigned URL to redirect to.
    pub location: Resolved,
}

impl BundleLocation {
    /// File name offered to the end client.
    pub fn suggested_file_name(&self) -> String {
        format!("lesson-{}.zip", self.job_id)
    }
}

/// Upload / list / info / submit / status / download.
#[derive(Clone)]
pub struct LessonService {
    storage: Arc<dyn Storage>,
    jobs: Arc<dyn JobStore>,
    scratch_dir: PathBuf,
    download_timeout_secs: u64,
}

impl LessonService {
    pub fn new(storage: Arc<dyn Storage>, jobs: Arc<dyn JobStore>, config: &ServiceConfig) -> Self {
        Self {
            storage,
            jobs,
            scratch_dir: config.scratch_dir.clone(),
            download_timeout_secs: config.download_timeout_secs,
        }
    }

    /// Open the configured storage backend and a file-backed job store.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let storage = open_storage(config)?;
        let jobs = Arc::new(FileJobStore::new(&config.job_store_dir)?);
        Ok(Self::new(storage, jobs, config))
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Store an uploaded document under a fresh id.
    pub async fn upload_document(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: Option<&str>,
    ) -> Result<UploadedDocument> {
        if let Some(ct) = content_type {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            if !ACCEPTED_CONTENT_TYPES
                .iter()
                .any(|ok| ok.eq_ignore_ascii_case(essence))
            {
                return Err(LessonError::InvalidRequest(format!(
                    "unsupported content type '{ct}': expected application/pdf"
                )));
            }
        }

        let document_id = keys::new_id();
        let document_key = keys::document_key(&document_id);
        let stored = self
            .storage
            .put_stream(&document_key, reader, Some(DOCUMENT_CONTENT_TYPE))
            .await?;
        info!(
            "Stored document {} ({} bytes)",
            document_key,
            stored.size_bytes.unwrap_or(0)
        );

        Ok(UploadedDocument {
            document_id,
            document_key,
            size_bytes: stored.size_bytes,
        })
    }

    /// Every stored document, ordered by id.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let mut documents: Vec<DocumentSummary> = self
            .storage
            .list(keys::DOCUMENT_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| {
                let id = keys::document_id_from_key(&key)?.to_string();
                Some(DocumentSummary {
                    document_id: id,
                    document_key: key,
                })
            })
            .collect();
        documents.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(documents)
    }

    /// Page count of a stored document. Remote documents are downloaded to
    /// a temp dir first.
    pub async fn document_info(&self, document_id: &str) -> Result<DocumentInfo> {
        keys::validate_id(document_id)?;
        let document_key = keys::document_key(document_id);
        let scope = format!("info-{}", keys::new_id());
        let document = input::resolve_document(
            self.storage.as_ref(),
            &document_key,
            &scope,
            &self.scratch_dir,
            self.download_timeout_secs,
        )
        .await?;

        let path = document.path().to_path_buf();
        let page_count = tokio::task::spawn_blocking(move || text_layer::page_count(&path))
            .await
            .map_err(|e| LessonError::Internal(format!("Page count task panicked: {}", e)))??;

        Ok(DocumentInfo {
            document_id: document_id.to_string(),
            document_key,
            page_count,
        })
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    /// Validate and enqueue a job. No id is allocated unless the document
    /// exists and the range is valid.
    pub async fn submit_job(
        &self,
        document_id: &str,
        from_page: u32,
        to_page: u32,
    ) -> Result<JobStatus> {
        keys::validate_id(document_id)?;
        let document_key = keys::document_key(document_id);
        if !self.storage.exists(&document_key).await {
            return Err(LessonError::DocumentNotFound { key: document_key });
        }
        let range = PageRange::new(from_page, to_page)?;

        let record = JobRecord::new(keys::new_id(), document_key, range);
        self.jobs.create(&record).await?;
        info!(
            "Queued job {} for pages {} of {}",
            record.job_id, range, record.document_key
        );
        Ok(record.status())
    }

    /// Current `{job_id, state, result, error}`.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.jobs.get(job_id).await?.status())
    }

    /// Locate the bundle of a succeeded job.
    ///
    /// Unknown jobs fail with `NotFound`, jobs in any other state with
    /// `NotComplete`.
    pub async fn bundle_location(&self, job_id: &str) -> Result<BundleLocation> {
        let record = self.jobs.get(job_id).await?;
        let result = match (record.state, record.result) {
            (JobState::Succeeded, Some(result)) => result,
            (state, _) => {
                return Err(LessonError::JobNotComplete {
                    job_id: job_id.to_string(),
                    state: state.to_string(),
                })
            }
        };

        if !self.storage.exists(&result.bundle_key).await {
            return Err(LessonError::BundleNotFound {
                key: result.bundle_key,
            });
        }
        let location = self.storage.resolve(&result.bundle_key).await?;
        Ok(BundleLocation {
            job_id: result.job_id,
            bundle_key: result.bundle_key,
            location,
        })
    }

    /// Copy a succeeded job's bundle to `dest`. Returns the bytes written.
    pub async fn download_bundle(&self, job_id: &str, dest: &Path) -> Result<u64> {
        let bundle = self.bundle_location(job_id).await?;
        let written = match &bundle.location {
            Resolved::Local(path) => copy_file_chunked(path, dest).await?,
            Resolved::Remote(reference) => {
                input::download_to(&reference.url, dest, self.download_timeout_secs).await?
            }
        };
        debug!("Wrote {} bytes of {} to {}", written, bundle.bundle_key, dest.display());
        Ok(written)
    }
}

/// Copy `src` to `dest` in [`STREAM_CHUNK_SIZE`] pieces.
async fn copy_file_chunked(src: &Path, dest: &Path) -> Result<u64> {
    let mut reader = tokio::fs::File::open(src)
        .await
        .map_err(|e| LessonError::io(src, e))?;
    let mut writer = tokio::fs::File::create(dest)
        .await
        .map_err(|e| LessonError::io(dest, e))?;

    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| LessonError::io(src, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| LessonError::io(dest, e))?;
        total += n as u64;
    }
    writer.flush().await.map_err(|e| LessonError::io(dest, e))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::LocalStorage;

    fn service(dir: &Path) -> LessonService {
        let config = ServiceConfig::builder()
            .local_storage(dir.join("data"))
            .job_store_dir(dir.join("jobs"))
            .scratch_dir(dir.join("scratch"))
            .build()
            .unwrap();
        let storage = Arc::new(LocalStorage::new(dir.join("data")).unwrap());
        let jobs = Arc::new(FileJobStore::new(dir.join("jobs")).unwrap());
        LessonService::new(storage, jobs, &config)
    }

    #[tokio::test]
    async fn upload_rejects_other_content_types() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut body: &[u8] = b"hello";
        let err = svc
            .upload_document(&mut body, Some("text/plain"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(svc.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut body: &[u8] = b"%PDF-1.4\n";
        let uploaded = svc
            .upload_document(&mut body, Some("application/pdf; charset=binary"))
            .await
            .unwrap();
        assert_eq!(uploaded.document_key, format!("pdfs/{}.pdf", uploaded.document_id));
        assert_eq!(uploaded.size_bytes, Some(9));

        let listed = svc.list_documents().await.unwrap();
        assert_eq!(
            listed,
            vec![DocumentSummary {
                document_id: uploaded.document_id.clone(),
                document_key: uploaded.document_key.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn submit_against_missing_document_allocates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.submit_job("missing", 1, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(svc.jobs().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_job_status_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.job_status("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = svc.bundle_location("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn suggested_file_name_uses_job_id() {
        let loc = BundleLocation {
            job_id: "abc".into(),
            bundle_key: "jobs/abc/bundle.zip".into(),
            location: Resolved::Local(PathBuf::from("/tmp/x")),
        };
        assert_eq!(loc.suggested_file_name(), "lesson-abc.zip");
    }
}
