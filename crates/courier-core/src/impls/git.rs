//! GitInspector - `git` コマンドでリポジトリ状態を取得する RepoInspector

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::InspectError;
use crate::ports::RepoInspector;

#[derive(Debug, Clone)]
pub struct GitInspector {
    program: String,
}

impl Default for GitInspector {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitInspector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, repo: &Path, args: &[&str]) -> Result<String, InspectError> {
        let command = format!("{} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(repo)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| InspectError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InspectError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RepoInspector for GitInspector {
    async fn diff(&self, repo: &Path) -> Result<String, InspectError> {
        self.run(repo, &["diff"]).await
    }

    async fn status(&self, repo: &Path) -> Result<String, InspectError> {
        self.run(repo, &["status", "--short"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outside_a_repository_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitInspector::new().status(dir.path()).await;
        // Either git is missing (Spawn) or it refuses the non-repo (Failed).
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let inspector = GitInspector {
            program: "courier-no-such-git".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = inspector.diff(dir.path()).await.unwrap_err();
        assert!(matches!(err, InspectError::Spawn { .. }));
        assert!(err.to_string().contains("courier-no-such-git diff"));
    }
}
