//! ArtifactCollector - 終了後のリポジトリ状態を artifacts に保存する
//!
//! best-effort。どの失敗も job の終了ステータスには影響しない。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::job_store::JobStore;
use super::retry::RetryPolicy;
use crate::domain::{Artifacts, InspectError, JobId};
use crate::ports::RepoInspector;

const DEFAULT_INSPECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ArtifactCollector {
    store: JobStore,
    inspector: Arc<dyn RepoInspector>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ArtifactCollector {
    pub fn new(store: JobStore, inspector: Arc<dyn RepoInspector>) -> Self {
        Self {
            store,
            inspector,
            timeout: DEFAULT_INSPECT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Upper bound for each inspection command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Inspect `repo` and store what could be captured in one write.
    pub async fn collect(&self, job_id: &JobId, repo: &Path) -> Artifacts {
        let diff = self
            .capture(job_id, "diff", self.inspector.diff(repo))
            .await;
        let status = self
            .capture(job_id, "status", self.inspector.status(repo))
            .await;
        let artifacts = Artifacts {
            git_diff: diff,
            git_status: status,
        };

        let written = self
            .retry
            .run("artifacts write", || self.store.write_artifacts(job_id, &artifacts))
            .await;
        if let Err(e) = written {
            tracing::warn!(job_id = %job_id, error = %e, "failed to store artifacts");
        }
        artifacts
    }

    async fn capture<F>(&self, job_id: &JobId, what: &'static str, inspection: F) -> Option<String>
    where
        F: std::future::Future<Output = Result<String, InspectError>>,
    {
        match tokio::time::timeout(self.timeout, inspection).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, artifact = what, error = %e, "artifact capture failed");
                None
            }
            Err(_) => {
                tracing::warn!(job_id = %job_id, artifact = what, timeout = ?self.timeout, "artifact capture timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryStore;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct Scripted {
        diff: Result<&'static str, ()>,
        status: Result<&'static str, ()>,
    }

    fn failed(command: &str) -> InspectError {
        InspectError::Failed {
            command: command.to_string(),
            code: Some(128),
            stderr: "fatal: not a git repository".to_string(),
        }
    }

    #[async_trait]
    impl RepoInspector for Scripted {
        async fn diff(&self, _repo: &Path) -> Result<String, InspectError> {
            self.diff.map(str::to_string).map_err(|_| failed("git diff"))
        }

        async fn status(&self, _repo: &Path) -> Result<String, InspectError> {
            self.status
                .map(str::to_string)
                .map_err(|_| failed("git status --short"))
        }
    }

    struct Hanging;

    #[async_trait]
    impl RepoInspector for Hanging {
        async fn diff(&self, _repo: &Path) -> Result<String, InspectError> {
            std::future::pending().await
        }

        async fn status(&self, _repo: &Path) -> Result<String, InspectError> {
            Ok(String::new())
        }
    }

    fn collector(inspector: impl RepoInspector + 'static) -> (JobStore, ArtifactCollector) {
        let store = JobStore::new(Arc::new(InMemoryStore::new()));
        let collector = ArtifactCollector::new(store.clone(), Arc::new(inspector));
        (store, collector)
    }

    #[tokio::test]
    async fn both_outputs_are_stored() {
        let (store, collector) = collector(Scripted {
            diff: Ok("diff --git a/x b/x\n"),
            status: Ok(" M x\n"),
        });
        let id = JobId::new("a");
        let got = collector.collect(&id, &PathBuf::from("/srv/repo")).await;

        assert_eq!(got.git_diff.as_deref(), Some("diff --git a/x b/x\n"));
        assert_eq!(store.read_artifacts(&id).await.unwrap(), got);
    }

    #[tokio::test]
    async fn a_failed_inspection_leaves_its_field_absent() {
        let (store, collector) = collector(Scripted {
            diff: Err(()),
            status: Ok(""),
        });
        let id = JobId::new("a");
        collector.collect(&id, Path::new("/srv/repo")).await;

        let stored = store.read_artifacts(&id).await.unwrap();
        assert_eq!(stored.git_diff, None);
        assert_eq!(stored.git_status.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn nothing_is_written_when_everything_fails() {
        let (store, collector) = collector(Scripted {
            diff: Err(()),
            status: Err(()),
        });
        let id = JobId::new("a");
        assert!(collector.collect(&id, Path::new("/srv/repo")).await.is_empty());
        assert!(store.read_artifacts(&id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_inspection_times_out() {
        let (_, collector) = collector(Hanging);
        let collector = collector.with_timeout(Duration::from_secs(1));
        let got = collector.collect(&JobId::new("a"), Path::new("/srv/repo")).await;
        assert_eq!(got.git_diff, None);
        assert_eq!(got.git_status.as_deref(), Some(""));
    }
}
