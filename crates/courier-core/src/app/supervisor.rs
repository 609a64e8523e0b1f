//! Supervisor - 1 job 分のエージェントプロセスのライフサイクル
//!
//! admission → running → launch → (stdout/stderr pump ‖ control poller) → exit
//! → artifacts → 終了ステータス、の順に進む。終了ステータスの書き込みは必ず 1 回。
//!
//! # 実装詳細
//! - プロセスハンドルはこのタスクだけが持つ。poller からの interrupt 要求は mpsc で受ける
//! - cancel / timeout の interrupt 後、grace 期間内に終了しなければ kill する
//! - Log への追記はすべて LogSink 経由（送信順 = 追記順）
//! - stdin への書き込みは StdinWriter のタスクに任せる。詰まったパイプで poller を止めない
//! - pop 済みの job についての status 書き込みは RetryPolicy で再試行する
//! - endTime は startTime より必ず後（同じミリ秒に終わった job は +1ms）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::collector::ArtifactCollector;
use super::config::EngineConfig;
use super::framing::read_lines;
use super::job_store::JobStore;
use super::log_sink::spawn_writer;
use super::poller::{ControlPoller, InterruptCause, InterruptRequest};
use super::stdin_writer::spawn_stdin_writer;
use crate::domain::{CourierError, Job, JobStatus, LogEntry};
use crate::ports::{Clock, ExitOutcome, LaunchSpec, LaunchedProcess, ProcessLauncher};

pub const KILL_MESSAGE: &str = "Agent did not exit after interrupt; killing it.";

/// How the agent run ended, before it is mapped to a job status.
#[derive(Debug)]
struct RunEnd {
    exit: std::io::Result<ExitOutcome>,
    timed_out: bool,
}

impl RunEnd {
    fn status_and_error(&self, timeout: Option<Duration>) -> (JobStatus, Option<String>) {
        if self.timed_out {
            let limit = timeout.unwrap_or_default();
            return (JobStatus::Failed, Some(format!("job timed out after {limit:?}")));
        }
        match &self.exit {
            Ok(outcome) => match JobStatus::from_exit_code(outcome.code) {
                JobStatus::Completed => (JobStatus::Completed, None),
                status => (status, Some(format!("agent exited with {}", outcome.describe()))),
            },
            Err(e) => (JobStatus::Failed, Some(format!("failed to wait for agent: {e}"))),
        }
    }
}

pub struct Supervisor {
    store: JobStore,
    launcher: Arc<dyn ProcessLauncher>,
    collector: ArtifactCollector,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl Supervisor {
    pub fn new(
        store: JobStore,
        launcher: Arc<dyn ProcessLauncher>,
        collector: ArtifactCollector,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            launcher,
            collector,
            clock,
            config,
        }
    }

    /// Argument set for one job.
    pub fn launch_spec(&self, job: &Job, cwd: PathBuf) -> LaunchSpec {
        let tools = self.config.tools_for(job.allowed_tools.as_deref());
        LaunchSpec {
            program: self.config.agent_program.clone(),
            args: vec![
                "--verbose".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--permission-mode".to_string(),
                job.mode.permission_mode().as_flag().to_string(),
                "--allowedTools".to_string(),
                tools.to_string(),
            ],
            cwd,
            env: vec![("FORCE_COLOR".to_string(), "1".to_string())],
        }
    }

    /// Drive `job` to a terminal status and return it.
    ///
    /// Errors are store failures only; every job-level failure ends up in the
    /// job's metadata instead.
    pub async fn run(&self, job: &Job) -> Result<JobStatus, CourierError> {
        let id = &job.id;
        let store = &self.store;
        let retry = &self.config.store_retry;

        let repo = match self.config.allowed_roots.check(&job.repo_path) {
            Ok(repo) => repo,
            Err(e) => {
                tracing::warn!(job_id = %id, repo_path = %job.repo_path, error = %e, "job rejected");
                let reason = e.to_string();
                let ended_at = self.clock.now_millis();
                retry
                    .run("mark rejected", || store.mark_rejected(id, &reason, ended_at))
                    .await?;
                return Ok(JobStatus::Failed);
            }
        };

        let started = self.clock.now_millis();
        retry
            .run("mark running", || store.mark_running(id, started))
            .await?;

        let spec = self.launch_spec(job, repo.clone());
        tracing::info!(
            job_id = %id,
            repo_path = %job.repo_path,
            mode = %job.mode,
            program = %spec.program,
            "launching agent"
        );
        let launched = match self.launcher.launch(&spec).await {
            Ok(launched) => launched,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "agent launch failed");
                let reason = e.to_string();
                let ended_at = self.end_after(started);
                retry
                    .run("mark finished", || {
                        store.mark_finished(id, JobStatus::Failed, ended_at, Some(reason.as_str()))
                    })
                    .await?;
                return Ok(JobStatus::Failed);
            }
        };

        let end = self.supervise(job, launched).await;

        self.collector.collect(id, &repo).await;

        let (status, error) = end.status_and_error(self.config.job_timeout);
        let reason = error.as_deref();
        let ended_at = self.end_after(started);
        retry
            .run("mark finished", || store.mark_finished(id, status, ended_at, reason))
            .await?;
        tracing::info!(job_id = %id, %status, error = error.as_deref(), "job finished");
        Ok(status)
    }

    async fn supervise(&self, job: &Job, launched: LaunchedProcess) -> RunEnd {
        let id = job.id.clone();
        let LaunchedProcess {
            mut process,
            stdin,
            stdout,
            stderr,
        } = launched;

        let (log, writer) = spawn_writer(
            self.store.clone(),
            id.clone(),
            self.config.store_retry.clone(),
        );

        let out_log = log.clone();
        let stdout_pump = tokio::spawn(async move {
            read_lines(stdout, |line| out_log.raw(line)).await
        });
        let err_log = log.clone();
        let stderr_pump = tokio::spawn(async move {
            read_lines(stderr, |line| err_log.entry(&LogEntry::error(line))).await
        });

        let (stdin, stdin_task) = spawn_stdin_writer(stdin, log.clone(), id.clone());
        stdin.prompt(job.prompt.as_str());

        let (interrupt_tx, mut interrupts) = mpsc::channel::<InterruptRequest>(4);
        let (exited_tx, exited_rx) = watch::channel(false);
        let poller = ControlPoller::new(
            self.store.clone(),
            id.clone(),
            self.config.control_poll_interval,
            log.clone(),
            stdin,
            interrupt_tx,
            exited_rx,
        );
        let poller_task = tokio::spawn(poller.run());

        let timeout_at = self.config.job_timeout.map(|t| Instant::now() + t);
        let mut kill_at: Option<Instant> = None;
        let mut timed_out = false;
        let mut killed = false;

        let exit = loop {
            tokio::select! {
                exit = process.wait() => break exit,
                Some(request) = interrupts.recv() => {
                    let result = process.interrupt();
                    if request.cause == InterruptCause::Cancel {
                        kill_at = kill_at.or_else(|| self.grace_deadline());
                    }
                    let _ = request.ack.send(result);
                }
                _ = sleep_until(timeout_at), if !timed_out => {
                    timed_out = true;
                    let limit = self.config.job_timeout.unwrap_or_default();
                    tracing::warn!(job_id = %id, timeout = ?limit, "job timed out; interrupting agent");
                    log.entry(&LogEntry::system(format!(
                        "Job timed out after {limit:?}; interrupting agent."
                    )));
                    if let Err(e) = process.interrupt() {
                        tracing::warn!(job_id = %id, error = %e, "interrupt failed");
                    }
                    kill_at = kill_at.or_else(|| self.grace_deadline());
                }
                _ = sleep_until(kill_at), if !killed => {
                    killed = true;
                    tracing::warn!(job_id = %id, pid = process.id(), "grace period elapsed; killing agent");
                    log.entry(&LogEntry::system(KILL_MESSAGE));
                    if let Err(e) = process.kill() {
                        tracing::warn!(job_id = %id, error = %e, "kill failed");
                    }
                }
            }
        };

        match &exit {
            Ok(outcome) => tracing::info!(job_id = %id, exit = %outcome.describe(), "agent exited"),
            Err(e) => tracing::error!(job_id = %id, error = %e, "waiting for agent failed"),
        }

        // Stop the poller before draining so nothing is forwarded to a dead process.
        let _ = exited_tx.send(true);
        drop(interrupts);
        let drain = self.config.stream_drain_timeout;
        match finish(poller_task, drain).await {
            Some(exit) => tracing::debug!(job_id = %id, ?exit, "control poller stopped"),
            None => tracing::warn!(job_id = %id, "control poller did not stop; aborted"),
        }
        // A write into a pipe nobody reads never finishes on its own.
        match finish(stdin_task, drain).await {
            Some(written) => tracing::debug!(job_id = %id, written, "stdin closed"),
            None => tracing::warn!(job_id = %id, "stdin write still pending after exit; abandoned"),
        }

        for (stream, pump) in [("stdout", stdout_pump), ("stderr", stderr_pump)] {
            match finish(pump, drain).await {
                Some(Ok(lines)) => tracing::debug!(job_id = %id, stream, lines, "stream drained"),
                Some(Err(e)) => tracing::warn!(job_id = %id, stream, error = %e, "stream read failed"),
                None => tracing::warn!(job_id = %id, stream, "stream still open after exit; abandoned"),
            }
        }

        drop(log);
        match writer.await {
            Ok(lines) => tracing::debug!(job_id = %id, lines, "log flushed"),
            Err(e) => tracing::warn!(job_id = %id, error = %e, "log writer failed"),
        }

        RunEnd { exit, timed_out }
    }

    /// End timestamp strictly after `started`.
    fn end_after(&self, started: i64) -> i64 {
        self.clock.now_millis().max(started + 1)
    }

    fn grace_deadline(&self) -> Option<Instant> {
        self.config.cancel_grace.map(|grace| Instant::now() + grace)
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Join `task` within `limit`, aborting it otherwise. `None` when it had to
/// be aborted or panicked.
async fn finish<T>(mut task: JoinHandle<T>, limit: Duration) -> Option<T> {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(_)) => None,
        Err(_) => {
            task.abort();
            None
        }
    }
}
