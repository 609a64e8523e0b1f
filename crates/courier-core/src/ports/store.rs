//! KvStore port - 共有の durable store（Upstash Redis または InMemory）
//!
//! engine が使う Redis コマンドの最小集合。型付きのアクセスは
//! `app::job_store::JobStore` が担う。
//!
//! # 設計原則
//! - トランザクションなし（コマンド単位で直列化される）
//! - `lpop` / `rpop` は排他的: 同じ要素を二人が取ることはない
//! - blocking pop はない（REST なので）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::StoreError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set fields on a hash (creating it if needed).
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// All fields of a hash. A missing key is an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Prepend to a list.
    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Append to a list.
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove and return the head of a list.
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove and return the tail of a list.
    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Inclusive range with Redis index semantics (`-1` is the last element).
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// Keep only the inclusive range, dropping everything else.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError>;
}
