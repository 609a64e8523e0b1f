//! JobStore - durable store の型付きクライアント
//!
//! KvStore のプリミティブを job 単位の操作にまとめる。キー配置は
//! ダッシュボードと共有しているので `keys` の文字列は変えないこと。
//!
//! # 書き込みの所有権
//! - meta: 作成は submit 側、それ以降は engine のみ
//! - events: engine が RPUSH（追記のみ）
//! - control / input: submit 側が書き、engine が読む
//! - artifacts: engine が終了後に 1 回だけ書く

use std::sync::Arc;

use crate::domain::job::fields;
use crate::domain::{
    Artifacts, ControlRecord, CourierError, InputMessage, Job, JobId, JobStatus, LogEntry,
    LogItem, StoreError,
};
use crate::ports::KvStore;

/// Key layout.
pub mod keys {
    use crate::domain::JobId;

    pub const QUEUE: &str = "jobs:queue";
    pub const RECENT: &str = "jobs:list";
    /// How many ids `jobs:list` keeps.
    pub const RECENT_LIMIT: i64 = 100;

    pub fn meta(id: &JobId) -> String {
        format!("job:{id}:meta")
    }

    pub fn events(id: &JobId) -> String {
        format!("job:{id}:events")
    }

    pub fn control(id: &JobId) -> String {
        format!("job:{id}:control")
    }

    pub fn input(id: &JobId) -> String {
        format!("job:{id}:input")
    }

    pub fn artifacts(id: &JobId) -> String {
        format!("job:{id}:artifacts")
    }
}

#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    // ---- queue ----

    /// Pop the oldest pending job id. The pop is the claim: an id handed out
    /// here is never handed out again.
    pub async fn claim_next(&self) -> Result<Option<JobId>, StoreError> {
        Ok(self.kv.rpop(keys::QUEUE).await?.map(JobId::from))
    }

    pub async fn enqueue(&self, id: &JobId) -> Result<(), StoreError> {
        self.kv.lpush(keys::QUEUE, id.as_str()).await
    }

    // ---- metadata ----

    /// `Ok(None)` when no metadata exists for `id`.
    pub async fn load_job(&self, id: &JobId) -> Result<Option<Job>, CourierError> {
        let map = self.kv.hgetall(&keys::meta(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        Job::from_fields(id, &map)
            .map(Some)
            .map_err(|reason| CourierError::InvalidJob {
                job_id: id.to_string(),
                reason,
            })
    }

    /// Store a new pending job, list it, and enqueue it.
    ///
    /// Metadata is written before the id is pushed so a worker never claims an
    /// id it cannot load.
    pub async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        self.kv.hset(&keys::meta(&job.id), &job.to_fields()).await?;
        self.enqueue(&job.id).await?;
        self.kv.lpush(keys::RECENT, job.id.as_str()).await?;
        self.kv.ltrim(keys::RECENT, 0, keys::RECENT_LIMIT - 1).await
    }

    pub async fn mark_running(&self, id: &JobId, start_time: i64) -> Result<(), StoreError> {
        self.kv
            .hset(
                &keys::meta(id),
                &[
                    field(fields::STATUS, JobStatus::Running.as_str()),
                    field(fields::START_TIME, start_time.to_string()),
                ],
            )
            .await
    }

    /// Record the terminal status. `error` is only written when present.
    pub async fn mark_finished(
        &self,
        id: &JobId,
        status: JobStatus,
        end_time: i64,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut update = vec![
            field(fields::STATUS, status.as_str()),
            field(fields::END_TIME, end_time.to_string()),
        ];
        if let Some(error) = error {
            update.push(field(fields::ERROR, error));
        }
        self.kv.hset(&keys::meta(id), &update).await
    }

    /// Admission rejection: straight from pending to failed.
    pub async fn mark_rejected(
        &self,
        id: &JobId,
        reason: &str,
        end_time: i64,
    ) -> Result<(), StoreError> {
        self.mark_finished(id, JobStatus::Failed, end_time, Some(reason))
            .await
    }

    // ---- log ----

    /// Append one raw line (agent output is stored verbatim).
    pub async fn append_raw(&self, id: &JobId, line: &str) -> Result<(), StoreError> {
        self.kv.rpush(&keys::events(id), line).await
    }

    pub async fn append_log(&self, id: &JobId, entry: &LogEntry) -> Result<(), StoreError> {
        self.append_raw(id, &entry.to_line()).await
    }

    /// Raw lines in append order.
    pub async fn read_raw_logs(&self, id: &JobId) -> Result<Vec<String>, StoreError> {
        self.kv.lrange(&keys::events(id), 0, -1).await
    }

    /// Decoded log, in append order.
    pub async fn read_logs(&self, id: &JobId) -> Result<Vec<LogItem>, StoreError> {
        Ok(self
            .read_raw_logs(id)
            .await?
            .iter()
            .map(|line| LogItem::parse(line))
            .collect())
    }

    // ---- control / input ----

    pub async fn control(&self, id: &JobId) -> Result<ControlRecord, StoreError> {
        let map = self.kv.hgetall(&keys::control(id)).await?;
        Ok(ControlRecord::from_fields(&map))
    }

    pub async fn request_cancel(&self, id: &JobId) -> Result<(), StoreError> {
        self.kv
            .hset(&keys::control(id), &[field(ControlRecord::CANCEL_FIELD, "true")])
            .await
    }

    /// Oldest queued input, if any.
    pub async fn pop_input(&self, id: &JobId) -> Result<Option<InputMessage>, StoreError> {
        Ok(self
            .kv
            .lpop(&keys::input(id))
            .await?
            .map(|raw| InputMessage::parse(&raw)))
    }

    pub async fn push_input(&self, id: &JobId, message: &InputMessage) -> Result<(), StoreError> {
        self.kv.rpush(&keys::input(id), &message.encode()).await
    }

    // ---- artifacts ----

    /// Single write of both fields. Empty artifacts are not written.
    pub async fn write_artifacts(&self, id: &JobId, artifacts: &Artifacts) -> Result<(), StoreError> {
        if artifacts.is_empty() {
            return Ok(());
        }
        self.kv
            .hset(&keys::artifacts(id), &artifacts.to_fields())
            .await
    }

    pub async fn read_artifacts(&self, id: &JobId) -> Result<Artifacts, StoreError> {
        let map = self.kv.hgetall(&keys::artifacts(id)).await?;
        Ok(Artifacts::from_fields(&map))
    }

    // ---- listing ----

    /// The `limit` most recently created job ids, newest first.
    pub async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = i64::try_from(limit).unwrap_or(i64::MAX).saturating_sub(1);
        Ok(self
            .kv
            .lrange(keys::RECENT, 0, stop)
            .await?
            .into_iter()
            .map(JobId::from)
            .collect())
    }
}

fn field(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}
