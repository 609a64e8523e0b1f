//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 本番用の実装をデフォルトにして、テストでは偽物を差し込む

use std::sync::Arc;

use super::collector::ArtifactCollector;
use super::config::EngineConfig;
use super::dispatch::{DispatchHandle, DispatchLoop};
use super::job_store::JobStore;
use super::submit::Submitter;
use super::supervisor::Supervisor;
use crate::impls::{GitInspector, TokioLauncher};
use crate::ports::{Clock, IdGenerator, KvStore, ProcessLauncher, RepoInspector, SystemClock, UlidGenerator};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .store(Arc::new(UpstashStore::new(url, token)?))
///     .config(EngineConfig::from_env()?)
///     .build()?;
/// let handle = engine.spawn();
/// ```
///
/// # Fail-fast 設計
/// - store だけは既定値がないので必須
/// - launcher / inspector / clock / id generator は本番用の実装が既定値
pub struct EngineBuilder {
    store: Option<Arc<dyn KvStore>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    inspector: Option<Arc<dyn RepoInspector>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: EngineConfig,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            launcher: None,
            inspector: None,
            clock: None,
            ids: None,
            config: EngineConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn RepoInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        let Some(kv) = self.store else {
            return Err(BuildError::MissingComponents(vec!["store"]));
        };
        if self.config.allowed_roots.is_empty() {
            tracing::warn!("no allowed roots configured; every job will be rejected");
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let launcher = self.launcher.unwrap_or_else(|| Arc::new(TokioLauncher::new()));
        let inspector = self
            .inspector
            .unwrap_or_else(|| Arc::new(GitInspector::new()));
        let config = Arc::new(self.config);

        let store = JobStore::new(kv);
        let collector =
            ArtifactCollector::new(store.clone(), inspector).with_retry(config.store_retry.clone());
        let supervisor = Supervisor::new(
            store.clone(),
            launcher,
            collector,
            clock.clone(),
            config.clone(),
        );
        let dispatch = Arc::new(DispatchLoop::new(
            store.clone(),
            supervisor,
            clock.clone(),
            config.clone(),
        ));
        let submitter = Submitter::new(store.clone(), ids, clock);

        Ok(Engine {
            store,
            dispatch,
            submitter,
            config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired engine: the dispatch loop plus the submission surface over the
/// same store.
pub struct Engine {
    store: JobStore,
    dispatch: Arc<DispatchLoop>,
    submitter: Submitter,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn dispatch(&self) -> &Arc<DispatchLoop> {
        &self.dispatch
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the dispatch loop on its own task.
    pub fn spawn(&self) -> DispatchHandle {
        DispatchHandle::spawn(Arc::clone(&self.dispatch))
    }
}
