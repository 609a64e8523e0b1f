//! ControlPoller - 実行中 job の cancel フラグと入力キューの監視
//!
//! # 実装詳細
//! - 1 tick ごとに control を読み、cancel なら interrupt して終了
//! - cancel でなければ入力キューから 1 件だけ取り出して stdin のキューに積む
//! - プロセスへのシグナルは supervisor が持つハンドル経由（InterruptRequest）
//! - stdin への書き込みは StdinWriter のタスクが行う。パイプが詰まっても tick は止まらない

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::job_store::JobStore;
use super::log_sink::LogSink;
use super::stdin_writer::StdinQueue;
use crate::domain::{JobId, LogEntry, StoreError};

pub const CANCELLED_MESSAGE: &str = "Job cancelled by user.";

/// Why the agent is being interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    /// The control record asked for cancellation. Arms the kill escalation.
    Cancel,
    /// An input message carried the interrupt marker.
    UserInput,
}

/// Ask the supervisor to SIGINT the agent; `ack` carries the signal result.
#[derive(Debug)]
pub struct InterruptRequest {
    pub cause: InterruptCause,
    pub ack: oneshot::Sender<std::io::Result<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// The agent exited on its own.
    ProcessExited,
    /// Cancellation was actioned.
    Cancelled,
    /// The supervisor stopped taking interrupt requests.
    SupervisorGone,
}

pub struct ControlPoller {
    store: JobStore,
    job_id: JobId,
    interval: Duration,
    log: LogSink,
    stdin: StdinQueue,
    interrupts: mpsc::Sender<InterruptRequest>,
    exited: watch::Receiver<bool>,
}

impl ControlPoller {
    pub fn new(
        store: JobStore,
        job_id: JobId,
        interval: Duration,
        log: LogSink,
        stdin: StdinQueue,
        interrupts: mpsc::Sender<InterruptRequest>,
        exited: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            job_id,
            interval,
            log,
            stdin,
            interrupts,
            exited,
        }
    }

    /// Poll until the agent exits or cancellation has been actioned.
    pub async fn run(mut self) -> PollerExit {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.exited.borrow_and_update() {
                return PollerExit::ProcessExited;
            }
            tokio::select! {
                biased;
                changed = self.exited.changed() => {
                    if changed.is_err() {
                        return PollerExit::ProcessExited;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(None) => {}
                Ok(Some(exit)) => return exit,
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, error = %e, "control poll failed");
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<Option<PollerExit>, StoreError> {
        if self.store.control(&self.job_id).await?.cancel {
            if !self.interrupt(InterruptCause::Cancel).await {
                return Ok(Some(PollerExit::SupervisorGone));
            }
            self.log.entry(&LogEntry::system(CANCELLED_MESSAGE));
            tracing::info!(job_id = %self.job_id, "job cancelled by user");
            return Ok(Some(PollerExit::Cancelled));
        }

        let Some(message) = self.store.pop_input(&self.job_id).await? else {
            return Ok(None);
        };
        if message.interrupt && !self.interrupt(InterruptCause::UserInput).await {
            return Ok(Some(PollerExit::SupervisorGone));
        }
        tracing::debug!(job_id = %self.job_id, interrupt = message.interrupt, "input queued for stdin");
        if !self.stdin.input(message) {
            tracing::warn!(job_id = %self.job_id, "stdin writer stopped; input lost");
            self.log
                .entry(&LogEntry::error("Failed to forward input: agent stdin is closed"));
        }
        Ok(None)
    }

    /// `false` when the supervisor is no longer listening.
    async fn interrupt(&self, cause: InterruptCause) -> bool {
        let (ack, done) = oneshot::channel();
        if self
            .interrupts
            .send(InterruptRequest { cause, ack })
            .await
            .is_err()
        {
            return false;
        }
        match done.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %self.job_id, error = %e, ?cause, "interrupt failed");
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::log_sink::spawn_writer;
    use crate::app::retry::RetryPolicy;
    use crate::app::stdin_writer::spawn_stdin_writer;
    use crate::domain::InputMessage;
    use crate::impls::InMemoryStore;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    struct Harness {
        store: JobStore,
        id: JobId,
        interrupts: mpsc::Receiver<InterruptRequest>,
        exited: watch::Sender<bool>,
        agent_stdin: tokio::io::DuplexStream,
        poller: tokio::task::JoinHandle<PollerExit>,
        writer: tokio::task::JoinHandle<usize>,
    }

    fn start() -> Harness {
        start_with_pipe(1024)
    }

    fn start_with_pipe(capacity: usize) -> Harness {
        let store = JobStore::new(Arc::new(InMemoryStore::new()));
        let id = JobId::new("job-1");
        let (log, writer) = spawn_writer(store.clone(), id.clone(), RetryPolicy::none());
        let (tx, interrupts) = mpsc::channel(4);
        let (exited, exited_rx) = watch::channel(false);
        let (ours, agent_stdin) = tokio::io::duplex(capacity);
        let (stdin, _stdin_task) = spawn_stdin_writer(Box::pin(ours), log.clone(), id.clone());

        let poller = ControlPoller::new(
            store.clone(),
            id.clone(),
            Duration::from_millis(10),
            log,
            stdin,
            tx,
            exited_rx,
        );
        let poller = tokio::spawn(poller.run());
        Harness {
            store,
            id,
            interrupts,
            exited,
            agent_stdin,
            poller,
            writer,
        }
    }

    async fn read_exact(stream: &mut tokio::io::DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn inputs_are_forwarded_in_order_and_audited() {
        let mut h = start();
        h.store
            .push_input(&h.id, &InputMessage::new("hello", false))
            .await
            .unwrap();
        h.store
            .push_input(&h.id, &InputMessage::new("world", false))
            .await
            .unwrap();

        assert_eq!(read_exact(&mut h.agent_stdin, 12).await, "hello\nworld\n");

        h.exited.send(true).unwrap();
        assert_eq!(h.poller.await.unwrap(), PollerExit::ProcessExited);
        h.writer.await.unwrap();

        let logs = h.store.read_logs(&h.id).await.unwrap();
        assert_eq!(
            logs,
            vec![
                crate::domain::LogItem::Entry(LogEntry::system("> User input: hello")),
                crate::domain::LogItem::Entry(LogEntry::system("> User input: world")),
            ]
        );
    }

    #[tokio::test]
    async fn interrupt_marker_signals_before_writing() {
        let mut h = start();
        h.store
            .push_input(&h.id, &InputMessage::new("stop and look at main.rs", true))
            .await
            .unwrap();

        let request = h.interrupts.recv().await.unwrap();
        assert_eq!(request.cause, InterruptCause::UserInput);
        request.ack.send(Ok(())).unwrap();

        assert_eq!(
            read_exact(&mut h.agent_stdin, 25).await,
            "stop and look at main.rs\n"
        );
        h.exited.send(true).unwrap();
        h.poller.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_logs_and_stops() {
        let mut h = start();
        h.store.request_cancel(&h.id).await.unwrap();

        let request = h.interrupts.recv().await.unwrap();
        assert_eq!(request.cause, InterruptCause::Cancel);
        request.ack.send(Ok(())).unwrap();

        assert_eq!(h.poller.await.unwrap(), PollerExit::Cancelled);
        h.writer.await.unwrap();

        let logs = h.store.read_logs(&h.id).await.unwrap();
        assert_eq!(
            logs,
            vec![crate::domain::LogItem::Entry(LogEntry::system(
                CANCELLED_MESSAGE
            ))]
        );
        // The poller dropped stdin on the way out.
        let mut rest = Vec::new();
        assert_eq!(h.agent_stdin.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_supervisor_ends_the_poller() {
        let h = start();
        h.store.request_cancel(&h.id).await.unwrap();
        drop(h.interrupts);
        assert_eq!(h.poller.await.unwrap(), PollerExit::SupervisorGone);
    }

    #[tokio::test]
    async fn exit_before_first_tick_stops_immediately() {
        let h = start();
        h.exited.send(true).unwrap();
        assert_eq!(h.poller.await.unwrap(), PollerExit::ProcessExited);
    }

    #[tokio::test]
    async fn cancel_is_seen_while_the_agent_ignores_stdin() {
        // The agent never reads, so the pipe fills long before this input is written.
        let mut h = start_with_pipe(64);
        h.store
            .push_input(&h.id, &InputMessage::new("x".repeat(16 * 1024), false))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.store.request_cancel(&h.id).await.unwrap();

        let request = tokio::time::timeout(Duration::from_secs(1), h.interrupts.recv())
            .await
            .expect("cancel was not noticed")
            .unwrap();
        assert_eq!(request.cause, InterruptCause::Cancel);
        request.ack.send(Ok(())).unwrap();
        assert_eq!(h.poller.await.unwrap(), PollerExit::Cancelled);
        drop(h.agent_stdin);
    }
}
