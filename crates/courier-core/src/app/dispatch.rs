//! DispatchLoop - キューから job を 1 件ずつ取り出して実行する
//!
//! # 設計
//! - 1 インスタンス = 1 job ずつ直列実行
//! - 複数インスタンス間の排他は store の pop（RPOP）のみに依存する
//! - 1 回の反復で起きたエラーは back-off してから再開する。ループ自体は止まらない
//! - shutdown は新しい job の claim を止めるだけで、実行中の job は最後まで走らせる

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::EngineConfig;
use super::job_store::JobStore;
use super::supervisor::Supervisor;
use crate::domain::{CourierError, JobId, JobStatus};
use crate::ports::Clock;

/// What one iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The queue was empty.
    Idle,
    /// Claimed, but there was no metadata to run.
    Dropped(JobId),
    /// Claimed a job that was not pending; left untouched.
    Skipped(JobId, JobStatus),
    /// The job reached this terminal status.
    Finished(JobId, JobStatus),
}

pub struct DispatchLoop {
    store: JobStore,
    supervisor: Supervisor,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl DispatchLoop {
    pub fn new(
        store: JobStore,
        supervisor: Supervisor,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            supervisor,
            clock,
            config,
        }
    }

    /// Claim and run at most one job.
    pub async fn run_once(&self) -> Result<Tick, CourierError> {
        let Some(id) = self.store.claim_next().await? else {
            return Ok(Tick::Idle);
        };
        tracing::info!(job_id = %id, "claimed job");

        let job = match self.store.load_job(&id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %id, "job metadata not found; dropping");
                return Ok(Tick::Dropped(id));
            }
            Err(CourierError::InvalidJob { reason, .. }) => {
                tracing::warn!(job_id = %id, %reason, "invalid job metadata");
                let error = format!("invalid job metadata: {reason}");
                let ended_at = self.clock.now_millis();
                self.config
                    .store_retry
                    .run("mark finished", || {
                        self.store
                            .mark_finished(&id, JobStatus::Failed, ended_at, Some(error.as_str()))
                    })
                    .await?;
                return Ok(Tick::Finished(id, JobStatus::Failed));
            }
            Err(e) => return Err(e),
        };

        if job.status != JobStatus::Pending {
            tracing::warn!(job_id = %id, status = %job.status, "claimed job is not pending; skipping");
            return Ok(Tick::Skipped(id, job.status));
        }

        let status = self.supervisor.run(&job).await?;
        Ok(Tick::Finished(id, status))
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_ms = self.config.queue_poll_interval.as_millis() as u64,
            "dispatch loop started"
        );
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(Tick::Idle) => self.config.queue_poll_interval,
                Ok(tick) => {
                    tracing::debug!(?tick, "dispatch iteration done");
                    Duration::ZERO
                }
                Err(e) => {
                    tracing::error!(error = %e, kind = ?e.kind(), "dispatch iteration failed; backing off");
                    self.config.error_backoff
                }
            };

            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
        tracing::info!("dispatch loop stopped");
    }
}

/// Handle to a dispatch loop running on its own task.
/// - `request_shutdown()` か handle の drop で claim を止める
/// - `shutdown_and_join()` で実行中の job の終了まで待つ
pub struct DispatchHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatchHandle {
    pub fn spawn(dispatch: Arc<DispatchLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            dispatch.run(shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Stop claiming new jobs. The in-flight job is not interrupted.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Shutdown and wait for the loop to return.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "dispatch loop task failed");
        }
    }
}
