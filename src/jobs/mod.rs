//! The asynchronous job model: state machine, durable records, worker.
//!
//! ```text
//! pending ──▶ running ──▶ succeeded { result }
//!                    └──▶ failed    { error }
//! ```
//!
//! Each transition happens exactly once. Records live in a [`JobStore`]
//! outside the worker's memory, so status stays queryable across restarts
//! of either side.

pub mod store;
pub mod worker;

pub use store::{FileJobStore, JobStore};
pub use worker::JobWorker;

use crate::config::PageRange;
use crate::error::{LessonError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Succeeded and failed jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a succeeded job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub bundle_key: String,
}

/// What a worker needs to run a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    pub document_key: String,
    pub range: PageRange,
}

/// The durable record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub document_key: String,
    pub range: PageRange,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A fresh `pending` record.
    pub fn new(job_id: impl Into<String>, document_key: impl Into<String>, range: PageRange) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            document_key: document_key.into(),
            range,
            state: JobState::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec {
            job_id: self.job_id.clone(),
            document_key: self.document_key.clone(),
            range: self.range,
        }
    }

    /// `pending → running`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Pending, JobState::Running)
    }

    /// `running → succeeded`, attaching the result.
    pub fn succeed(&mut self, result: JobResult) -> Result<()> {
        self.transition(JobState::Running, JobState::Succeeded)?;
        self.result = Some(result);
        Ok(())
    }

    /// `running → failed`, attaching the error description.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobState::Running, JobState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<()> {
        if self.state != from {
            return Err(LessonError::IllegalTransition {
                job_id: self.job_id.clone(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Client-facing view of this record.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.job_id.clone(),
            state: self.state,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// `{job_id, state, result, error}` as exposed to status adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}
