//! ProcessLauncher port - 外部エージェントプロセスの起動
//!
//! 本番は `impls::process::TokioLauncher`（tokio::process）。
//! テストでは duplex ストリームで組んだ偽プロセスに差し替える。

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::LaunchError;

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Everything needed to start one agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

/// A running agent process.
///
/// `wait` must be cancel-safe: the supervisor polls it inside `select!`
/// and re-creates the future on every loop turn.
#[async_trait]
pub trait AgentProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Cooperative stop request (SIGINT).
    fn interrupt(&mut self) -> std::io::Result<()>;

    /// Forceful stop (SIGKILL). Does not wait for the exit.
    fn kill(&mut self) -> std::io::Result<()>;

    async fn wait(&mut self) -> std::io::Result<ExitOutcome>;
}

/// A launched process with its three pipes detached.
pub struct LaunchedProcess {
    pub process: Box<dyn AgentProcess>,
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedProcess, LaunchError>;
}
