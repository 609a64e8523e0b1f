//! StdinWriter - エージェントの stdin への書き込み専用タスク
//!
//! エージェントが stdin を読まなくなるとパイプが詰まり、write が返らなくなる。
//! control poller がそれに巻き込まれると cancel を読めなくなるので、
//! poller はキューに積むだけにして、実際の書き込みはこのタスクが順番に行う。
//!
//! # 実装詳細
//! - prompt も入力も同じキューを通る（prompt が必ず先頭）
//! - 転送に成功した入力だけ監査行を Log に残す
//! - 送信側がすべて drop されるとタスクが終わり、stdin が閉じてエージェントは EOF を受け取る

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::log_sink::LogSink;
use crate::domain::{InputMessage, JobId, LogEntry};
use crate::ports::BoxedWriter;

#[derive(Debug)]
enum StdinItem {
    Prompt(String),
    Input(InputMessage),
}

/// Cloneable handle for queuing writes to the agent's stdin.
#[derive(Clone)]
pub struct StdinQueue {
    tx: mpsc::UnboundedSender<StdinItem>,
}

impl StdinQueue {
    /// Queue the initial prompt. `false` when the writer has stopped.
    pub fn prompt(&self, prompt: impl Into<String>) -> bool {
        self.tx.send(StdinItem::Prompt(prompt.into())).is_ok()
    }

    /// Queue a user message. `false` when the writer has stopped.
    pub fn input(&self, message: InputMessage) -> bool {
        self.tx.send(StdinItem::Input(message)).is_ok()
    }
}

/// Spawn the writer that owns `stdin`. Its result is the number of items
/// written successfully.
pub fn spawn_stdin_writer(
    mut stdin: BoxedWriter,
    log: LogSink,
    job_id: JobId,
) -> (StdinQueue, JoinHandle<usize>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StdinItem>();
    let join = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(item) = rx.recv().await {
            let (bytes, audit, failure) = match item {
                StdinItem::Prompt(prompt) => {
                    let mut bytes = prompt.into_bytes();
                    bytes.push(b'\n');
                    (bytes, None, "Failed to write prompt")
                }
                StdinItem::Input(message) => (
                    message.wire_bytes(),
                    Some(message.audit_line()),
                    "Failed to forward input",
                ),
            };

            let result = async {
                stdin.write_all(&bytes).await?;
                stdin.flush().await
            }
            .await;
            match result {
                Ok(()) => {
                    written += 1;
                    if let Some(line) = audit {
                        tracing::debug!(job_id = %job_id, "input forwarded");
                        log.entry(&LogEntry::system(line));
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, what = failure, "stdin write failed");
                    log.entry(&LogEntry::error(format!("{failure}: {e}")));
                }
            }
        }
        written
    });
    (StdinQueue { tx }, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::job_store::JobStore;
    use crate::app::log_sink::spawn_writer;
    use crate::app::retry::RetryPolicy;
    use crate::domain::LogItem;
    use crate::impls::InMemoryStore;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    fn store() -> JobStore {
        JobStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn prompt_then_inputs_in_order_with_audit() {
        let store = store();
        let id = JobId::new("a");
        let (log, log_writer) = spawn_writer(store.clone(), id.clone(), RetryPolicy::none());
        let (ours, mut agent) = tokio::io::duplex(1024);
        let (queue, task) = spawn_stdin_writer(Box::pin(ours), log, id.clone());

        assert!(queue.prompt("list files"));
        assert!(queue.input(InputMessage::new("hello", false)));
        assert!(queue.input(InputMessage::new("look again", true)));
        drop(queue);

        let mut received = String::new();
        agent.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "list files\nhello\nlook again\n");
        assert_eq!(task.await.unwrap(), 3);
        log_writer.await.unwrap();

        assert_eq!(
            store.read_logs(&id).await.unwrap(),
            vec![
                LogItem::Entry(LogEntry::system("> User input: hello")),
                LogItem::Entry(LogEntry::system("> User interrupt: look again")),
            ]
        );
    }

    #[tokio::test]
    async fn closed_stdin_is_logged_per_item() {
        let store = store();
        let id = JobId::new("a");
        let (log, log_writer) = spawn_writer(store.clone(), id.clone(), RetryPolicy::none());
        let (ours, agent) = tokio::io::duplex(64);
        drop(agent);
        let (queue, task) = spawn_stdin_writer(Box::pin(ours), log, id.clone());

        queue.prompt("list files");
        queue.input(InputMessage::new("hello", false));
        drop(queue);

        assert_eq!(task.await.unwrap(), 0);
        log_writer.await.unwrap();
        let logs = store.read_logs(&id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(matches!(
            &logs[0],
            LogItem::Entry(LogEntry::Error(text)) if text.starts_with("Failed to write prompt")
        ));
        assert!(matches!(
            &logs[1],
            LogItem::Entry(LogEntry::Error(text)) if text.starts_with("Failed to forward input")
        ));
    }

    #[tokio::test]
    async fn queuing_never_waits_on_a_full_pipe() {
        let store = store();
        let id = JobId::new("a");
        let (log, _log_writer) = spawn_writer(store, id.clone(), RetryPolicy::none());
        let (ours, _agent) = tokio::io::duplex(16);
        let (queue, task) = spawn_stdin_writer(Box::pin(ours), log, id);

        // The agent never reads; every send still returns at once.
        for _ in 0..64 {
            assert!(queue.input(InputMessage::new("x".repeat(1024), false)));
        }
        assert!(!task.is_finished());
        task.abort();
    }
}
