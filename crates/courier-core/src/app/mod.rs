//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてエンジンのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **JobStore**: durable store の型付きクライアント
//! - **DispatchLoop**: キューから job を取り出して 1 件ずつ実行
//! - **Supervisor**: 1 job 分のエージェントプロセスの管理
//! - **ControlPoller**: cancel フラグと入力キューの監視
//! - **StdinQueue**: エージェントの stdin への書き込みキュー
//! - **RetryPolicy**: pop 済み job の store 書き込みの再試行
//! - **ArtifactCollector**: 終了後の git diff / status の保存
//! - **Submitter**: job の投入・キャンセル・入力送信・参照

pub mod admission;
pub mod builder;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod framing;
pub mod job_store;
pub mod log_sink;
pub mod poller;
pub mod retry;
pub mod stdin_writer;
pub mod submit;
pub mod supervisor;

// 主要な型を再エクスポート
pub use self::admission::AllowedRoots;
pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::collector::ArtifactCollector;
pub use self::config::{DEFAULT_AGENT_PROGRAM, DEFAULT_ALLOWED_TOOLS, EngineConfig};
pub use self::dispatch::{DispatchHandle, DispatchLoop, Tick};
pub use self::framing::read_lines;
pub use self::job_store::JobStore;
pub use self::log_sink::LogSink;
pub use self::poller::{CANCELLED_MESSAGE, ControlPoller, PollerExit};
pub use self::retry::RetryPolicy;
pub use self::stdin_writer::{StdinQueue, spawn_stdin_writer};
pub use self::submit::{NewJob, Submitter};
pub use self::supervisor::{KILL_MESSAGE, Supervisor};
