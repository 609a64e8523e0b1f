//! Ports - 抽象化レイヤー
//!
//! 外部システム（Redis、エージェントプロセス、git）へのインターフェース。
//! engine はここの trait だけを見るので、テストでは偽物に差し替えられる。
//!
//! # 設計原則
//! - durable store が唯一の source of truth
//! - プロセスは 1 job に 1 つ、supervisor が所有する

pub mod clock;
pub mod id_generator;
pub mod inspector;
pub mod launcher;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::inspector::RepoInspector;
pub use self::launcher::{
    AgentProcess, BoxedReader, BoxedWriter, ExitOutcome, LaunchSpec, LaunchedProcess,
    ProcessLauncher,
};
pub use self::store::KvStore;
