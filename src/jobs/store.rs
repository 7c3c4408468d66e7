//! Durable job records.
//!
//! [`FileJobStore`] keeps one JSON file per job in a directory:
//!
//! ```text
//! <dir>/<job_id>.json    the record, replaced atomically on every update
//! <dir>/<job_id>.claim   created (create-new) by the worker that runs it
//! ```
//!
//! `pending` records double as the work queue. Claiming is a single
//! create-new of the marker file, so exactly one worker wins even when
//! several processes share the directory.

use super::{JobRecord, JobState};
use crate::error::{LessonError, Result};
use crate::keys;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Queryable, durable job state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record. Fails if the id is already taken.
    async fn create(&self, record: &JobRecord) -> Result<()>;

    /// Load a record, or [`LessonError::JobNotFound`].
    async fn get(&self, job_id: &str) -> Result<JobRecord>;

    /// Overwrite an existing record.
    async fn update(&self, record: &JobRecord) -> Result<()>;

    /// All pending records, oldest first.
    async fn pending(&self) -> Result<Vec<JobRecord>>;

    /// Take exclusive ownership of a pending job and mark it `running`.
    ///
    /// Returns `None` if another worker got there first or the job is no
    /// longer pending.
    async fn claim(&self, job_id: &str) -> Result<Option<JobRecord>>;
}

/// Job records as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Open (and create if needed) a store in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| LessonError::io(&dir, e))?;
        Ok(Self { dir })
    }

    fn record_path(&self, job_id: &str) -> Result<PathBuf> {
        keys::validate_id(job_id)?;
        Ok(self.dir.join(format!("{job_id}.json")))
    }

    fn claim_path(&self, job_id: &str) -> Result<PathBuf> {
        keys::validate_id(job_id)?;
        Ok(self.dir.join(format!("{job_id}.claim")))
    }

    fn encode(record: &JobRecord) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(record).map_err(|source| LessonError::CorruptJobRecord {
            job_id: record.job_id.clone(),
            source,
        })
    }

    /// Write to a temp file and rename it over `path`, so readers never see
    /// a torn record.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension(format!("{}.tmp", keys::new_id()));
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LessonError::io(path, e));
        }
        Ok(())
    }

    async fn read(&self, job_id: &str, path: &Path) -> Result<JobRecord> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LessonError::JobNotFound {
                    job_id: job_id.to_string(),
                })
            }
            Err(e) => return Err(LessonError::io(path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| LessonError::CorruptJobRecord {
            job_id: job_id.to_string(),
            source,
        })
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(&record.job_id)?;
        let bytes = Self::encode(record)?;

        // Write a temp file and hard-link it into place: the link fails if
        // the id is taken, and readers never see an empty record.
        let tmp = path.with_extension(format!("{}.tmp", keys::new_id()));
        let staged = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::hard_link(&tmp, &path).await
        }
        .await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match staged {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LessonError::InvalidRequest(format!(
                    "job id '{}' already exists",
                    record.job_id
                )))
            }
            Err(e) => return Err(LessonError::io(&path, e)),
        }
        debug!("Created job {} ({})", record.job_id, record.state);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord> {
        let path = self.record_path(job_id)?;
        self.read(job_id, &path).await
    }

    async fn update(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(&record.job_id)?;
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(LessonError::JobNotFound {
                job_id: record.job_id.clone(),
            });
        }
        let bytes = Self::encode(record)?;
        self.write_atomic(&path, &bytes).await?;
        debug!("Job {} → {}", record.job_id, record.state);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<JobRecord>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| LessonError::io(&self.dir, e))?;

        let mut pending = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LessonError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(job_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Stray files whose stem is not a job id.
            if keys::validate_id(job_id).is_err() {
                continue;
            }
            match self.read(job_id, &path).await {
                Ok(record) if record.state == JobState::Pending => pending.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable job record {}: {}", path.display(), e),
            }
        }

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn claim(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let marker = self.claim_path(job_id)?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
            .await
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(LessonError::io(&marker, e)),
        }

        let started: Result<Option<JobRecord>> = async {
            let mut record = self.get(job_id).await?;
            if record.state != JobState::Pending {
                return Ok(None);
            }
            record.start()?;
            self.update(&record).await?;
            Ok(Some(record))
        }
        .await;

        // Leave the job claimable if it never reached running.
        if started.is_err() {
            let _ = tokio::fs::remove_file(&marker).await;
        }
        started
    }
}
