//! Render job records: identifiers, the status lifecycle, persistence, and
//! cooperative cancellation.
//!
//! A job moves `ready -> rendering -> done | failed` and never leaves a
//! terminal state. The transition methods enforce this; callers persist the
//! updated record through a [`JobStore`] after each transition.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    error::{VoxreelError, VoxreelResult},
    media::MediaRef,
    model::JobMetadata,
};

/// Unique render job identifier. Artifact paths derive from it, so uniqueness
/// also gives each job exclusive ownership of its outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(uuid::Uuid);

impl JobId {
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ready,
    Rendering,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One render job: request snapshot plus lifecycle state.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderJob {
    pub id: JobId,
    pub status: JobStatus,
    pub metadata: JobMetadata,
    /// Output video reference, set on `done`.
    pub output: Option<MediaRef>,
    /// Human-readable failure detail, set on `failed`.
    pub failure: Option<String>,
}

impl RenderJob {
    pub fn new(metadata: JobMetadata) -> Self {
        Self {
            id: JobId::fresh(),
            status: JobStatus::Ready,
            metadata,
            output: None,
            failure: None,
        }
    }

    /// `ready -> rendering`, at job acceptance before any pipeline I/O.
    pub fn start_rendering(&mut self) -> VoxreelResult<()> {
        if self.status != JobStatus::Ready {
            return Err(self.bad_transition("rendering"));
        }
        self.status = JobStatus::Rendering;
        Ok(())
    }

    /// `rendering -> done`, once the encoded artifact is written.
    pub fn complete(&mut self, output: MediaRef) -> VoxreelResult<()> {
        if self.status != JobStatus::Rendering {
            return Err(self.bad_transition("done"));
        }
        self.status = JobStatus::Done;
        self.output = Some(output);
        Ok(())
    }

    /// `rendering -> failed`, at the first unrecoverable pipeline error.
    pub fn fail(&mut self, detail: impl Into<String>) -> VoxreelResult<()> {
        if self.status != JobStatus::Rendering {
            return Err(self.bad_transition("failed"));
        }
        self.status = JobStatus::Failed;
        self.failure = Some(detail.into());
        Ok(())
    }

    fn bad_transition(&self, target: &str) -> VoxreelError {
        VoxreelError::validation(format!(
            "job {} cannot move from '{}' to '{target}'",
            self.id,
            self.status.as_str()
        ))
    }
}

/// Persistence seam for job records. The pipeline writes through it at
/// creation, at the start of rendering, and at the terminal transition.
pub trait JobStore: Send + Sync {
    fn put(&self, job: &RenderJob) -> VoxreelResult<()>;
    fn get(&self, id: JobId) -> VoxreelResult<Option<RenderJob>>;
}

/// Map-backed store for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, RenderJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn put(&self, job: &RenderJob) -> VoxreelResult<()> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| VoxreelError::storage("job store mutex poisoned"))?;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get(&self, id: JobId) -> VoxreelResult<Option<RenderJob>> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| VoxreelError::storage("job store mutex poisoned"))?;
        Ok(jobs.get(&id).cloned())
    }
}

/// Cooperative cancellation flag, checked between pipeline stages and between
/// timeline slots. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
