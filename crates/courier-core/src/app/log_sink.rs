//! LogSink - job の Log への順序付き書き込み
//!
//! stdout / stderr の pump と control poller はそれぞれ別タスクだが、
//! Log への追記は 1 本の writer タスクに集約する。送信順がそのまま追記順になり、
//! store の遅延がプロセス側の読み取りを止めることもない。
//! store が一時的に落ちている間は 1 行ずつ back-off で再試行し、諦めた行だけを捨てる。

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::job_store::JobStore;
use super::retry::RetryPolicy;
use crate::domain::{JobId, LogEntry};

/// Cloneable handle for queuing log lines.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LogSink {
    /// Queue a raw line (agent stdout, stored verbatim).
    pub fn raw(&self, line: String) {
        // The writer only stops once every sink is dropped.
        let _ = self.tx.send(line);
    }

    pub fn entry(&self, entry: &LogEntry) {
        self.raw(entry.to_line());
    }
}

/// Spawn the writer task for `job_id`.
///
/// The task ends when every `LogSink` clone has been dropped and the queue is
/// drained; its result is the number of lines stored.
pub fn spawn_writer(
    store: JobStore,
    job_id: JobId,
    retry: RetryPolicy,
) -> (LogSink, JoinHandle<usize>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let join = tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(line) = rx.recv().await {
            let appended = retry
                .run("log append", || store.append_raw(&job_id, &line))
                .await;
            match appended {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "dropping log line");
                }
            }
        }
        written
    });
    (LogSink { tx }, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn lines_keep_send_order_across_clones() {
        let store = JobStore::new(Arc::new(InMemoryStore::new()));
        let id = JobId::new("a");
        let (sink, writer) = spawn_writer(store.clone(), id.clone(), RetryPolicy::none());

        let other = sink.clone();
        sink.raw("1".into());
        other.entry(&LogEntry::system("2"));
        sink.raw("3".into());
        drop(sink);
        drop(other);

        assert_eq!(writer.await.unwrap(), 3);
        let lines = store.read_raw_logs(&id).await.unwrap();
        assert_eq!(
            lines,
            vec![
                "1".to_string(),
                r#"{"type":"system","content":"2"}"#.to_string(),
                "3".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn store_failures_skip_lines_without_stopping() {
        let kv = Arc::new(InMemoryStore::new());
        let store = JobStore::new(kv.clone());
        let id = JobId::new("a");

        kv.set_unavailable(true);
        let (sink, writer) = spawn_writer(store.clone(), id.clone(), RetryPolicy::none());
        sink.raw("lost".into());
        sink.raw("also lost".into());
        drop(sink);

        assert_eq!(writer.await.unwrap(), 0);
        kv.set_unavailable(false);
        assert!(store.read_raw_logs(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_outage_is_ridden_out() {
        let kv = Arc::new(InMemoryStore::new());
        let store = JobStore::new(kv.clone());
        let id = JobId::new("a");
        let retry = RetryPolicy {
            max_attempts: 50,
            base_delay: Duration::from_millis(10),
            multiplier: 1,
            max_delay: Duration::from_millis(10),
        };

        kv.set_unavailable(true);
        let (sink, writer) = spawn_writer(store.clone(), id.clone(), retry);
        sink.raw("first".into());
        sink.raw("second".into());
        drop(sink);

        tokio::time::sleep(Duration::from_millis(60)).await;
        kv.set_unavailable(false);

        assert_eq!(writer.await.unwrap(), 2);
        assert_eq!(
            store.read_raw_logs(&id).await.unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }
}
