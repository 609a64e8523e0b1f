//! courier-core
//!
//! Job queue and execution engine for remote coding-agent runs.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, log, control, artifacts, errors）
//! - **ports**: 抽象化レイヤー（KvStore, ProcessLauncher, RepoInspector, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryStore, UpstashStore, TokioLauncher, GitInspector）
//! - **app**: アプリケーションロジック（builder, job_store, dispatch, supervisor, poller, collector, submit）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Engine, EngineBuilder, EngineConfig};
pub use domain::{CourierError, Job, JobId, JobMode, JobStatus};
