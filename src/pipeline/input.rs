//! Input resolution: turn a document key into a locally readable file.
//!
//! Extraction needs random access to the PDF, so a presigned reference is
//! downloaded into a temporary directory first. The directory is created
//! below the configured scratch dir and named after the job id, so two jobs
//! downloading at the same time never share a path. It is removed when the
//! [`ResolvedDocument`] is dropped, which covers success, failure, panic and
//! a cancelled job future alike.

use crate::error::{LessonError, Result};
use crate::storage::{Resolved, Storage};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// File name given to downloaded documents inside their temp dir.
const DOWNLOADED_NAME: &str = "document.pdf";

/// The resolved input: either a path owned by the storage backend or a
/// downloaded temp copy.
#[derive(Debug)]
pub enum ResolvedDocument {
    /// The backend exposes the document as a local file.
    Local(PathBuf),
    /// The document was fetched through a presigned reference.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedDocument {
    /// Get the path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedDocument::Local(p) => p,
            ResolvedDocument::Downloaded { path, .. } => path,
        }
    }

    /// True if dropping this value deletes a temporary copy.
    pub fn is_temporary(&self) -> bool {
        matches!(self, ResolvedDocument::Downloaded { .. })
    }
}

/// Resolve `key` to a local PDF path, downloading if the backend only hands
/// out a remote reference.
///
/// `scope` names the temp directory (normally the job id).
pub async fn resolve_document(
    storage: &dyn Storage,
    key: &str,
    scope: &str,
    scratch_dir: &Path,
    timeout_secs: u64,
) -> Result<ResolvedDocument> {
    if !storage.exists(key).await {
        return Err(LessonError::DocumentNotFound {
            key: key.to_string(),
        });
    }

    match storage.resolve(key).await? {
        Resolved::Local(path) => {
            check_pdf_magic(&path).await?;
            debug!("Resolved {} to local path {}", key, path.display());
            Ok(ResolvedDocument::Local(path))
        }
        Resolved::Remote(reference) => {
            tokio::fs::create_dir_all(scratch_dir)
                .await
                .map_err(|e| LessonError::io(scratch_dir, e))?;
            let temp_dir = tempfile::Builder::new()
                .prefix(&format!("lesson-{scope}-"))
                .tempdir_in(scratch_dir)
                .map_err(|e| LessonError::io(scratch_dir, e))?;
            let path = temp_dir.path().join(DOWNLOADED_NAME);

            info!("Downloading {} for {}", key, scope);
            download_to(&reference.url, &path, timeout_secs).await?;
            check_pdf_magic(&path).await?;

            Ok(ResolvedDocument::Downloaded {
                path,
                _temp_dir: temp_dir,
            })
        }
    }
}

/// Stream `url` into a new file at `dest` with a whole-request timeout.
///
/// Returns the number of bytes written. A partially written file is removed
/// on failure.
pub async fn download_to(url: &str, dest: &Path, timeout_secs: u64) -> Result<u64> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LessonError::DownloadFailed {
            url: redact_query(url),
            reason: e.to_string(),
        })?;

    let map_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            LessonError::DownloadTimeout {
                url: redact_query(url),
                secs: timeout_secs,
            }
        } else {
            LessonError::DownloadFailed {
                url: redact_query(url),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_reqwest)?;
    if !response.status().is_success() {
        return Err(LessonError::DownloadFailed {
            url: redact_query(url),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| LessonError::io(dest, e))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(map_reqwest(e));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(LessonError::io(dest, e));
        }
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| LessonError::io(dest, e))?;

    debug!("Downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}

/// Verify the `%PDF` magic bytes so a non-PDF fails with a clear message.
async fn check_pdf_magic(path: &Path) -> Result<()> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LessonError::io(path, e))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) if &magic == b"%PDF" => Ok(()),
        Ok(_) => Err(LessonError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("not a PDF (first bytes {magic:?})"),
        }),
        Err(_) => Err(LessonError::CorruptDocument {
            path: path.to_path_buf(),
            detail: "file is shorter than a PDF header".into(),
        }),
    }
}

/// Drop the query string (which carries the signature) before logging a URL.
fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}
