//! RepoInspector port - 実行後のリポジトリ状態の取得
//!
//! 本番は `impls::git::GitInspector`（`git diff` / `git status --short`）。

use std::path::Path;

use async_trait::async_trait;

use crate::domain::InspectError;

#[async_trait]
pub trait RepoInspector: Send + Sync {
    /// Textual diff of uncommitted changes.
    async fn diff(&self, repo: &Path) -> Result<String, InspectError>;

    /// Short status summary.
    async fn status(&self, repo: &Path) -> Result<String, InspectError>;
}
