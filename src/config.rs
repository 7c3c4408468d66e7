//! Configuration types for the lesson pipeline.
//!
//! All runtime behaviour is controlled through [`ServiceConfig`], built once
//! at process start via [`ServiceConfigBuilder`] and handed by reference to
//! each component constructor. Nothing in the library reads the environment;
//! the `lessonctl` binary maps flags and environment variables onto the
//! builder.

use crate::error::{LessonError, Result};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Top-level configuration shared by storage, pipeline, workers and service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Which backing store holds documents and bundles.
    pub storage: StorageConfig,

    /// Directory holding durable job records. Default: `./data/job-state`.
    pub job_store_dir: PathBuf,

    /// Parent directory for per-job temporary downloads. Default: system temp dir.
    pub scratch_dir: PathBuf,

    /// Minimum trimmed character count across a page range before the
    /// primary extraction result is accepted. Default: 50.
    ///
    /// Below this the range is assumed to have no usable text layer (scanned
    /// or image-only pages) and the fallback strategy is run instead.
    pub min_text_chars: usize,

    /// Timeout for fetching a presigned document reference. Default: 60.
    pub download_timeout_secs: u64,

    /// Lifetime of presigned references handed out by the remote backend. Default: 3600.
    pub presign_expiry_secs: u64,

    /// Number of jobs a worker runs concurrently. Default: 4.
    pub worker_concurrency: usize,

    /// Delay between polls of the job store when idle. Default: 2000.
    pub poll_interval_ms: u64,

    /// Directory containing libpdfium for the fallback extractor.
    /// If None, the current directory and system library paths are searched.
    pub pdfium_library_path: Option<PathBuf>,

    /// Transformation-service settings.
    pub transform: TransformConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            job_store_dir: PathBuf::from("./data/job-state"),
            scratch_dir: std::env::temp_dir(),
            min_text_chars: 50,
            download_timeout_secs: 60,
            presign_expiry_secs: 3600,
            worker_concurrency: 4,
            poll_interval_ms: 2000,
            pdfium_library_path: None,
            transform: TransformConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: ServiceConfig::default(),
        }
    }
}

/// Backing store selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Objects are files below `root`.
    Local { root: PathBuf },
    /// Objects live in an S3-compatible bucket.
    S3(S3Config),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("./data"),
        }
    }
}

/// S3 backend settings.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Config {
    /// Bucket name. Required; a missing bucket fails at construction time.
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Prefix prepended to every logical key. Default: `audio-lessons/`.
    pub prefix: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack, …).
    pub endpoint: Option<String>,
    /// Permit plain-HTTP endpoints.
    pub allow_http: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            prefix: "audio-lessons/".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            allow_http: false,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("prefix", &self.prefix)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<redacted>"))
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint", &self.endpoint)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// Settings for the script-generation call.
#[derive(Clone)]
pub struct TransformConfig {
    /// Provider name understood by `edgequake_llm::ProviderFactory`. Default: "openai".
    pub provider_name: String,

    /// Model identifier. Default: "gpt-4o-mini".
    pub model: String,

    /// Service credential passed to the provider client. The writer refuses
    /// to start without one, so a missing key is caught before any job runs.
    pub api_key: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`
    /// and does not require `api_key`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom system prompt. If None, uses the built-in lesson prompt.
    pub system_prompt: Option<String>,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens in the generated script. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            provider: None,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 4096,
            api_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn local_storage(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageConfig::Local { root: root.into() };
        self
    }

    pub fn job_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.job_store_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn presign_expiry_secs(mut self, secs: u64) -> Self {
        self.config.presign_expiry_secs = secs;
        self
    }

    pub fn worker_concurrency(mut self, n: usize) -> Self {
        self.config.worker_concurrency = n.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.transform.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.transform.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.transform.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.transform.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.transform.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.transform.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.transform.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transform.api_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig> {
        let c = &self.config;
        if let StorageConfig::S3(s3) = &c.storage {
            if s3.bucket.as_deref().map_or(true, |b| b.trim().is_empty()) {
                return Err(LessonError::InvalidConfig(
                    "S3 storage selected but no bucket configured".into(),
                ));
            }
        }
        if c.download_timeout_secs == 0 {
            return Err(LessonError::InvalidConfig(
                "Download timeout must be ≥ 1s".into(),
            ));
        }
        if c.presign_expiry_secs == 0 {
            return Err(LessonError::InvalidConfig(
                "Presign expiry must be ≥ 1s".into(),
            ));
        }
        if c.transform.api_timeout_secs == 0 {
            return Err(LessonError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page range ───────────────────────────────────────────────────────────

/// A 1-indexed, inclusive page range with `1 <= from_page <= to_page`.
///
/// The invariant is enforced on construction and on deserialisation, so a
/// `PageRange` found anywhere in the crate is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPageRange")]
pub struct PageRange {
    from_page: u32,
    to_page: u32,
}

#[derive(Deserialize)]
struct RawPageRange {
    from_page: u32,
    to_page: u32,
}

impl TryFrom<RawPageRange> for PageRange {
    type Error = LessonError;

    fn try_from(raw: RawPageRange) -> Result<Self> {
        PageRange::new(raw.from_page, raw.to_page)
    }
}

impl PageRange {
    /// Validate and build a range.
    pub fn new(from_page: u32, to_page: u32) -> Result<Self> {
        if from_page < 1 || from_page > to_page {
            return Err(LessonError::InvalidPageRange { from_page, to_page });
        }
        Ok(Self { from_page, to_page })
    }

    pub fn from_page(&self) -> u32 {
        self.from_page
    }

    pub fn to_page(&self) -> u32 {
        self.to_page
    }

    /// Number of pages covered.
    pub fn len(&self) -> usize {
        (self.to_page - self.from_page + 1) as usize
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Page numbers in increasing order.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.from_page..=self.to_page
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from_page, self.to_page)
    }
}
