//! TokioLauncher - tokio::process でエージェントを起動する ProcessLauncher

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::domain::LaunchError;
use crate::ports::{AgentProcess, ExitOutcome, LaunchSpec, LaunchedProcess, ProcessLauncher};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

/// `spawn` can fail with ETXTBSY when the executable was written a moment
/// ago and another thread forked while the write handle was still open.
async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    program: &str,
) -> Result<Child, LaunchError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(source) => {
                return Err(LaunchError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
        }
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedProcess, LaunchError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = spawn_with_text_file_busy_retry(&mut command, &spec.program).await?;

        let missing = |stream| LaunchError::MissingPipe {
            program: spec.program.clone(),
            stream,
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        tracing::debug!(program = %spec.program, pid = child.id(), cwd = %spec.cwd.display(), "agent spawned");

        Ok(LaunchedProcess {
            process: Box::new(TokioProcess { child }),
            stdin: Box::pin(stdin),
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
        })
    }
}

struct TokioProcess {
    child: Child,
}

#[async_trait]
impl AgentProcess for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> std::io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        // Already reaped: nothing to signal.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid)
            .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(pid), Signal::SIGINT).map_err(std::io::Error::from)
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        let status = self.child.wait().await?;
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Ok(ExitOutcome {
            code: status.code(),
            signal,
        })
    }
}
