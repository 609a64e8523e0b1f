//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発用・テスト用の KvStore
//! - **UpstashStore**: Upstash Redis REST API の KvStore（本番用）
//! - **TokioLauncher**: tokio::process でエージェントを起動
//! - **GitInspector**: `git diff` / `git status --short`

pub mod git;
pub mod inmem_store;
pub mod process;
pub mod upstash;

pub use self::git::GitInspector;
pub use self::inmem_store::InMemoryStore;
pub use self::process::TokioLauncher;
pub use self::upstash::UpstashStore;
