//! Local-filesystem backend.
//!
//! A key maps onto `<root>/<key>` with `/` translated to the platform
//! separator. Writes go to a hidden sibling temp file that is renamed over
//! the destination, so a reader never observes a half-written object and two
//! writers of distinct keys never touch the same file.

use super::{Resolved, Storage, StoredObject, STREAM_CHUNK_SIZE};
use crate::error::{LessonError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

const TEMP_SUFFIX: &str = ".partial";

/// Objects stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| LessonError::io(root, e))?;
        let root = std::path::absolute(root).map_err(|e| LessonError::io(root, e))?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its file path, rejecting keys that would leave the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let well_formed = !key.is_empty()
            && !key.ends_with('/')
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(LessonError::InvalidRequest(format!(
                "storage key '{key}' must be a relative path without '.' or '..' segments"
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Create the parent directory and pick a temp path next to `path`.
    async fn prepare_write(&self, key: &str, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LessonError::storage(key, e))?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(path.with_file_name(format!(
            ".{file_name}.{}{TEMP_SUFFIX}",
            crate::keys::new_id()
        )))
    }

    async fn commit(&self, key: &str, tmp: &Path, path: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(LessonError::storage(key, e));
        }
        Ok(())
    }

    /// Convert an absolute file path below the root back into a key.
    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        let tmp = self.prepare_write(key, &path).await?;
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LessonError::storage(key, e));
        }
        self.commit(key, &tmp, &path).await?;
        debug!("Stored {} bytes at {}", data.len(), path.display());

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: Some(data.len() as u64),
            content_type: content_type.map(str::to_string),
        })
    }

    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: Option<&str>,
    ) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        let tmp = self.prepare_write(key, &path).await?;

        let written = match copy_chunked(reader, &tmp).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(LessonError::storage(key, e));
            }
        };
        self.commit(key, &tmp, &path).await?;
        debug!("Streamed {} bytes to {}", written, path.display());

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: Some(written),
            content_type: content_type.map(str::to_string),
        })
    }

    async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn resolve(&self, key: &str) -> Result<Resolved> {
        Ok(Resolved::Local(self.path_for(key)?))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Walk only the directory part of the prefix; the remainder is a
        // plain string filter, matching object-store prefix semantics.
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LessonError::storage(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| LessonError::storage(prefix, e))?
            {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Skipping unreadable entry {}: {}", path.display(), e);
                        continue;
                    }
                };
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }
}

/// Copy `reader` into a new file at `dest` in [`STREAM_CHUNK_SIZE`] pieces.
async fn copy_chunked(
    reader: &mut (dyn AsyncRead + Unpin + Send),
    dest: &Path,
) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(total)
}
