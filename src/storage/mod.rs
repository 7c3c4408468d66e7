//! Backend-agnostic object storage.
//!
//! Documents and bundles are addressed by `/`-delimited string keys
//! (see [`crate::keys`]). Two interchangeable backends implement [`Storage`]:
//!
//! * [`LocalStorage`]: files below a root directory. `resolve` yields a
//!   local path.
//! * [`RemoteStorage`]: an S3-compatible bucket. `resolve` yields a
//!   time-limited presigned URL.
//!
//! Callers never branch on the backend type. They branch on the
//! [`Resolved`] value returned by `resolve`, and must handle both arms.
//!
//! ## Failure policy
//!
//! Writes propagate errors. `exists` never fails: a lookup that cannot be
//! answered counts as "absent". Misconfiguration (e.g. no bucket) fails when
//! the backend is constructed, not per call.

pub mod local;
pub mod remote;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

use crate::config::{ServiceConfig, StorageConfig};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Chunk size for streamed writes and proxied reads.
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Description of an object just written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: Option<u64>,
    pub content_type: Option<String>,
}

/// How to reach the bytes behind a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A path that can be opened directly.
    Local(PathBuf),
    /// A time-limited URL; must be fetched before local access.
    Remote(PresignedRef),
}

/// A presigned GET reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedRef {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Uniform put / exists / resolve / list over named objects.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Write `data` under `key`, replacing any existing object.
    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<StoredObject>;

    /// Write everything `reader` yields under `key` in bounded chunks,
    /// replacing any existing object.
    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: Option<&str>,
    ) -> Result<StoredObject>;

    /// True iff an object is stored under `key`.
    async fn exists(&self, key: &str) -> bool;

    /// A local path or a presigned reference for `key`.
    async fn resolve(&self, key: &str) -> Result<Resolved>;

    /// Every key that starts with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Construct the backend selected by `config.storage`.
pub fn open_storage(config: &ServiceConfig) -> Result<Arc<dyn Storage>> {
    match &config.storage {
        StorageConfig::Local { root } => Ok(Arc::new(LocalStorage::new(root)?)),
        StorageConfig::S3(s3) => Ok(Arc::new(RemoteStorage::from_config(
            s3,
            Duration::from_secs(config.presign_expiry_secs),
        )?)),
    }
}
