//! UpstashStore - Upstash Redis の REST API を使う KvStore
//!
//! 1 コマンド = 1 リクエスト。`POST {url}` に JSON 配列でコマンドを送り、
//! `{"result": ...}` か `{"error": "..."}` が返ってくる。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::StoreError;
use crate::ports::KvStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

pub struct UpstashStore {
    client: Client,
    url: String,
    token: String,
}

impl UpstashStore {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn command(&self, args: &[&str]) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::trace!(command = args.first().copied(), %status, "upstash reply");

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(StoreError::Unavailable(format!("HTTP {status}: {body}")));
        }

        let reply: Reply = serde_json::from_str(&body)
            .map_err(|e| StoreError::Protocol(format!("HTTP {status}: {e}: {body}")))?;
        if let Some(error) = reply.error {
            return Err(StoreError::Command(error));
        }
        if !status.is_success() {
            return Err(StoreError::Command(format!("HTTP {status}: {body}")));
        }
        Ok(reply.result)
    }
}

fn optional_string(value: Value) -> Result<Option<String>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(StoreError::Protocol(format!("expected string, got {other}"))),
    }
}

fn string_list(value: Value) -> Result<Vec<String>, StoreError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(StoreError::Protocol(format!(
                    "expected string item, got {other}"
                ))),
            })
            .collect(),
        other => Err(StoreError::Protocol(format!("expected array, got {other}"))),
    }
}

/// HGETALL comes back as a flat `[field, value, field, value, ...]` array.
fn field_map(value: Value) -> Result<HashMap<String, String>, StoreError> {
    let flat = string_list(value)?;
    if flat.len() % 2 != 0 {
        return Err(StoreError::Protocol(format!(
            "hgetall returned {} items, expected pairs",
            flat.len()
        )));
    }
    let mut map = HashMap::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        map.insert(field, value);
    }
    Ok(map)
}

#[async_trait]
impl KvStore for UpstashStore {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut args = Vec::with_capacity(2 + fields.len() * 2);
        args.push("HSET");
        args.push(key);
        for (field, value) in fields {
            args.push(field.as_str());
            args.push(value.as_str());
        }
        self.command(&args).await.map(drop)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        field_map(self.command(&["HGETALL", key]).await?)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.command(&["LPUSH", key, value]).await.map(drop)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.command(&["RPUSH", key, value]).await.map(drop)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        optional_string(self.command(&["LPOP", key]).await?)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        optional_string(self.command(&["RPOP", key]).await?)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let (start, stop) = (start.to_string(), stop.to_string());
        string_list(self.command(&["LRANGE", key, &start, &stop]).await?)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.command(&["LTRIM", key, &start, &stop]).await.map(drop)
    }
}
