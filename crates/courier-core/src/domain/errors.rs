//! Errors - エラー型と分類
//!
//! 各ポート（store / launcher / inspector）は自分のエラー型を持ち、
//! `CourierError` がそれらを束ねる。dispatch loop は `ErrorKind` を見てログを出す。

use thiserror::Error;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（store に届かない等、back-off して再試行）
/// - Permanent: 恒久的なエラー（設定ミス、壊れたメタデータ）
/// - Infrastructure: プロセス起動やパイプ等、ホスト側の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Durable store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (network, timeout, 5xx).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but rejected the command.
    #[error("store command failed: {0}")]
    Command(String),

    /// The reply did not have the expected shape.
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Worth retrying: the store may answer the same command later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Failure to start the agent process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawned `{program}` without a {stream} pipe")]
    MissingPipe {
        program: String,
        stream: &'static str,
    },
}

/// Repository path rejected by the allow-list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Repository path not allowed: no allowed roots are configured")]
    NoRoots,

    #[error("Repository path not allowed: `{0}` is not absolute")]
    NotAbsolute(String),

    #[error("Repository path not allowed: `{0}` contains `..`")]
    ParentTraversal(String),

    #[error("Repository path not allowed: `{0}` is outside the allowed roots")]
    OutsideRoots(String),
}

/// Repository inspection (git diff / status) failures.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} must be {expected}, got `{value}`")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid job {job_id}: {reason}")]
    InvalidJob { job_id: String, reason: String },

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Store(e) if e.is_transient() => ErrorKind::Transient,
            CourierError::Store(_) => ErrorKind::Infrastructure,
            CourierError::Launch(_) | CourierError::Io(_) => ErrorKind::Infrastructure,
            CourierError::Admission(_)
            | CourierError::Config(_)
            | CourierError::InvalidJob { .. }
            | CourierError::JobNotFound(_) => ErrorKind::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_store_is_transient() {
        let err: CourierError = StoreError::Unavailable("timeout".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn admission_errors_mention_the_path() {
        let err = AdmissionError::OutsideRoots("/etc".into());
        let msg = err.to_string();
        assert!(msg.contains("not allowed"));
        assert!(msg.contains("/etc"));
    }
}
