//! S3-compatible backend with presigned access.
//!
//! Logical keys are stored below a configurable prefix (`audio-lessons/` by
//! default) and the prefix is stripped again when listing, so callers only
//! ever see the same keys they wrote.
//!
//! The backend is written against `object_store`'s [`ObjectStore`] and
//! [`Signer`] traits; [`RemoteStorage::from_config`] wires both to one
//! `AmazonS3` client, and tests substitute an in-memory store.

use super::{PresignedRef, Resolved, Storage, StoredObject, STREAM_CHUNK_SIZE};
use crate::config::S3Config;
use crate::error::{LessonError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, PutOptions, PutPayload, WriteMultipart,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Parts of a multipart upload allowed in flight at once.
const MAX_INFLIGHT_PARTS: usize = 4;

/// Objects stored in a bucket, read back through presigned URLs.
#[derive(Clone)]
pub struct RemoteStorage {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
    prefix: String,
    expiry: Duration,
}

impl std::fmt::Debug for RemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl RemoteStorage {
    /// Build an S3 client from `config`. Fails if no bucket is configured.
    pub fn from_config(config: &S3Config, expiry: Duration) -> Result<Self> {
        let bucket = config
            .bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| LessonError::InvalidConfig("S3 bucket missing".into()))?;

        let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| LessonError::InvalidConfig(format!("S3 client: {e}")))?,
        );
        Ok(Self::new(s3.clone(), s3, &config.prefix, expiry))
    }

    /// Wrap an arbitrary store + signer pair.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn Signer>,
        prefix: &str,
        expiry: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            prefix: normalise_prefix(prefix),
            expiry,
        }
    }

    /// Physical location of a logical key.
    fn location(&self, key: &str) -> Result<ObjectPath> {
        if key.is_empty() || key.ends_with('/') {
            return Err(LessonError::InvalidRequest(format!(
                "storage key '{key}' must name an object"
            )));
        }
        ObjectPath::parse(format!("{}{}", self.prefix, key))
            .map_err(|e| LessonError::InvalidRequest(format!("storage key '{key}': {e}")))
    }

    /// Logical key of a physical location, if it lives below our prefix.
    fn logical_key<'a>(&self, location: &'a str) -> Option<&'a str> {
        location.strip_prefix(self.prefix.as_str())
    }
}

/// Ensure a non-empty prefix ends with exactly one `/` and has no leading one.
fn normalise_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn content_type_attributes(content_type: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(ct) = content_type {
        attributes.insert(Attribute::ContentType, ct.to_string().into());
    }
    attributes
}

#[async_trait]
impl Storage for RemoteStorage {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<StoredObject> {
        let location = self.location(key)?;
        let size = data.len() as u64;
        let opts = PutOptions {
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };
        self.store
            .put_opts(&location, PutPayload::from(data), opts)
            .await
            .map_err(|e| LessonError::storage(key, e))?;
        debug!("Uploaded {} bytes to {}", size, location);

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: Some(size),
            content_type: content_type.map(str::to_string),
        })
    }

    async fn put_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: Option<&str>,
    ) -> Result<StoredObject> {
        let location = self.location(key)?;
        let opts = PutMultipartOpts {
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };
        let upload = self
            .store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(|e| LessonError::storage(key, e))?;
        let mut writer = WriteMultipart::new(upload);

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(LessonError::storage(key, e));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_INFLIGHT_PARTS).await {
                let _ = writer.abort().await;
                return Err(LessonError::storage(key, e));
            }
            writer.write(&buf[..n]);
            total += n as u64;
        }
        writer
            .finish()
            .await
            .map_err(|e| LessonError::storage(key, e))?;
        debug!("Streamed {} bytes to {}", total, location);

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes: Some(total),
            content_type: content_type.map(str::to_string),
        })
    }

    async fn exists(&self, key: &str) -> bool {
        let Ok(location) = self.location(key) else {
            return false;
        };
        match self.store.head(&location).await {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => false,
            Err(e) => {
                warn!("Treating '{}' as absent after failed lookup: {}", key, e);
                false
            }
        }
    }

    async fn resolve(&self, key: &str) -> Result<Resolved> {
        let location = self.location(key)?;
        let url = self
            .signer
            .signed_url(reqwest::Method::GET, &location, self.expiry)
            .await
            .map_err(|e| LessonError::storage(key, e))?;
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(self.expiry)
                .map_err(|e| LessonError::Internal(format!("presign expiry: {e}")))?;

        Ok(Resolved::Remote(PresignedRef {
            url: url.to_string(),
            expires_at,
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // object_store lists by whole path segments, so list the directory
        // part and filter the rest as a plain string prefix.
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let physical_dir = format!("{}{}", self.prefix, dir_part);
        let physical_dir = physical_dir.trim_end_matches('/');
        let listing_root = if physical_dir.is_empty() {
            None
        } else {
            Some(
                ObjectPath::parse(physical_dir)
                    .map_err(|e| LessonError::InvalidRequest(format!("prefix '{prefix}': {e}")))?,
            )
        };

        let mut keys = Vec::new();
        let mut stream = self.store.list(listing_root.as_ref());
        while let Some(item) = stream.next().await {
            match item {
                Ok(meta) => {
                    if let Some(key) = self.logical_key(meta.location.as_ref()) {
                        if key.starts_with(prefix) {
                            keys.push(key.to_string());
                        }
                    }
                }
                Err(e) => return Err(LessonError::storage(prefix, e)),
            }
        }
        Ok(keys)
    }
}
