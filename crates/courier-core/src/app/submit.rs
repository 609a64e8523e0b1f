//! Submitter - submission / control 側の操作
//!
//! ダッシュボードと同じキーを読み書きするので、CLI からも job の投入・
//! キャンセル・入力送信・状態確認ができる。

use std::sync::Arc;

use super::job_store::JobStore;
use crate::domain::{Artifacts, CourierError, InputMessage, Job, JobId, JobMode, LogItem};
use crate::ports::{Clock, IdGenerator};

/// A job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub repo_path: String,
    pub prompt: String,
    pub mode: JobMode,
    pub allowed_tools: Option<String>,
}

impl NewJob {
    pub fn new(repo_path: impl Into<String>, prompt: impl Into<String>, mode: JobMode) -> Self {
        Self {
            repo_path: repo_path.into(),
            prompt: prompt.into(),
            mode,
            allowed_tools: None,
        }
    }
}

#[derive(Clone)]
pub struct Submitter {
    store: JobStore,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Submitter {
    pub fn new(store: JobStore, ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }

    /// Create a pending job and enqueue it. Admission is the worker's call,
    /// so any path is accepted here.
    pub async fn create_job(&self, request: NewJob) -> Result<JobId, CourierError> {
        let id = self.ids.generate_job_id();
        let invalid = |reason: &str| CourierError::InvalidJob {
            job_id: id.to_string(),
            reason: reason.to_string(),
        };
        if request.repo_path.trim().is_empty() {
            return Err(invalid("repoPath is empty"));
        }
        if request.prompt.trim().is_empty() {
            return Err(invalid("prompt is empty"));
        }

        let mut job = Job::pending(
            id.clone(),
            request.repo_path,
            request.prompt,
            request.mode,
            self.clock.now_millis(),
        );
        if let Some(tools) = request.allowed_tools.filter(|t| !t.trim().is_empty()) {
            job = job.with_allowed_tools(tools);
        }
        self.store.create_job(&job).await?;
        tracing::info!(job_id = %id, repo_path = %job.repo_path, mode = %job.mode, "job submitted");
        Ok(id)
    }

    pub async fn request_cancel(&self, id: &JobId) -> Result<(), CourierError> {
        self.status(id).await?;
        self.store.request_cancel(id).await?;
        Ok(())
    }

    pub async fn send_input(
        &self,
        id: &JobId,
        text: impl Into<String>,
        interrupt: bool,
    ) -> Result<(), CourierError> {
        self.status(id).await?;
        self.store
            .push_input(id, &InputMessage::new(text, interrupt))
            .await?;
        Ok(())
    }

    pub async fn status(&self, id: &JobId) -> Result<Job, CourierError> {
        self.store
            .load_job(id)
            .await?
            .ok_or_else(|| CourierError::JobNotFound(id.to_string()))
    }

    pub async fn logs(&self, id: &JobId) -> Result<Vec<LogItem>, CourierError> {
        Ok(self.store.read_logs(id).await?)
    }

    pub async fn artifacts(&self, id: &JobId) -> Result<Artifacts, CourierError> {
        Ok(self.store.read_artifacts(id).await?)
    }

    /// Most recent jobs, newest first. Ids whose metadata is gone or
    /// unreadable are skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Job>, CourierError> {
        let mut jobs = Vec::new();
        for id in self.store.recent_jobs(limit).await? {
            match self.store.load_job(&id).await {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(CourierError::InvalidJob { reason, .. }) => {
                    tracing::debug!(job_id = %id, %reason, "skipping unreadable job");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }
}
