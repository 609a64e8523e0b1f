//! Job record and status management.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// What the user asked the agent to do. Decides the permission level the
/// agent process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// Read-only investigation.
    #[default]
    Plan,
    Fix,
    Diagnose,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Plan => "plan",
            JobMode::Fix => "fix",
            JobMode::Diagnose => "diagnose",
        }
    }

    pub fn permission_mode(self) -> PermissionMode {
        match self {
            JobMode::Plan => PermissionMode::Plan,
            JobMode::Fix | JobMode::Diagnose => PermissionMode::AcceptEdits,
        }
    }
}

impl FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(JobMode::Plan),
            "fix" => Ok(JobMode::Fix),
            "diagnose" => Ok(JobMode::Diagnose),
            other => Err(format!("unknown job mode: {other}")),
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission level passed to the agent process (`--permission-mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Read-only.
    Plan,
    /// Write-enabled.
    AcceptEdits,
}

impl PermissionMode {
    pub fn as_flag(self) -> &'static str {
        match self {
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
        }
    }
}

/// Job status as stored in the metadata record.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Failed (admission rejected)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Terminal status for a process exit code.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        if code == Some(0) {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field names of the `job:{id}:meta` hash. Shared with the dashboard, so
/// they stay camelCase.
pub mod fields {
    pub const ID: &str = "id";
    pub const REPO_PATH: &str = "repoPath";
    pub const PROMPT: &str = "prompt";
    pub const MODE: &str = "mode";
    pub const ALLOWED_TOOLS: &str = "allowedTools";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const ERROR: &str = "error";
}

/// Job metadata.
///
/// Timestamps are epoch milliseconds, the unit the dashboard writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub repo_path: String,
    pub prompt: String,
    pub mode: JobMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// A freshly submitted job.
    pub fn pending(
        id: JobId,
        repo_path: impl Into<String>,
        prompt: impl Into<String>,
        mode: JobMode,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            repo_path: repo_path.into(),
            prompt: prompt.into(),
            mode,
            allowed_tools: None,
            status: JobStatus::Pending,
            created_at: Some(created_at),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn with_allowed_tools(mut self, tools: impl Into<String>) -> Self {
        self.allowed_tools = Some(tools.into());
        self
    }

    /// Decode a metadata hash.
    ///
    /// `repoPath` and `prompt` are required. A missing or unknown `mode`
    /// falls back to `plan` (read-only), a missing `status` to `pending`.
    pub fn from_fields(id: &JobId, map: &HashMap<String, String>) -> Result<Self, String> {
        let required = |name: &str| {
            map.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| format!("missing field `{name}`"))
        };
        let timestamp = |name: &str| -> Result<Option<i64>, String> {
            match map.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(raw) => raw
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| format!("field `{name}` is not a timestamp: {raw}")),
            }
        };

        let repo_path = required(fields::REPO_PATH)?;
        let prompt = required(fields::PROMPT)?;
        let mode = map
            .get(fields::MODE)
            .and_then(|m| m.parse().ok())
            .unwrap_or_default();
        let status = match map.get(fields::STATUS) {
            Some(raw) => raw.parse()?,
            None => JobStatus::Pending,
        };

        Ok(Self {
            id: id.clone(),
            repo_path,
            prompt,
            mode,
            allowed_tools: map
                .get(fields::ALLOWED_TOOLS)
                .filter(|v| !v.trim().is_empty())
                .cloned(),
            status,
            created_at: timestamp(fields::CREATED_AT)?,
            start_time: timestamp(fields::START_TIME)?,
            end_time: timestamp(fields::END_TIME)?,
            error: map.get(fields::ERROR).cloned(),
        })
    }

    /// Encode as a metadata hash. Absent optionals are left out.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut out = vec![
            (fields::ID.to_string(), self.id.to_string()),
            (fields::REPO_PATH.to_string(), self.repo_path.clone()),
            (fields::PROMPT.to_string(), self.prompt.clone()),
            (fields::MODE.to_string(), self.mode.as_str().to_string()),
            (fields::STATUS.to_string(), self.status.as_str().to_string()),
        ];
        let optional = [
            (fields::ALLOWED_TOOLS, self.allowed_tools.clone()),
            (fields::CREATED_AT, self.created_at.map(|t| t.to_string())),
            (fields::START_TIME, self.start_time.map(|t| t.to_string())),
            (fields::END_TIME, self.end_time.map(|t| t.to_string())),
            (fields::ERROR, self.error.clone()),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                out.push((name.to_string(), value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case::plan(JobMode::Plan, PermissionMode::Plan)]
    #[case::fix(JobMode::Fix, PermissionMode::AcceptEdits)]
    #[case::diagnose(JobMode::Diagnose, PermissionMode::AcceptEdits)]
    fn mode_maps_to_permission_level(#[case] mode: JobMode, #[case] expected: PermissionMode) {
        assert_eq!(mode.permission_mode(), expected);
    }

    #[rstest]
    #[case::start(JobStatus::Pending, JobStatus::Running, true)]
    #[case::rejected(JobStatus::Pending, JobStatus::Failed, true)]
    #[case::completed(JobStatus::Running, JobStatus::Completed, true)]
    #[case::failed(JobStatus::Running, JobStatus::Failed, true)]
    #[case::skip_running(JobStatus::Pending, JobStatus::Completed, false)]
    #[case::terminal_again(JobStatus::Failed, JobStatus::Completed, false)]
    #[case::restart(JobStatus::Completed, JobStatus::Running, false)]
    fn status_transitions(
        #[case] from: JobStatus,
        #[case] to: JobStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn exit_code_zero_completes() {
        assert_eq!(JobStatus::from_exit_code(Some(0)), JobStatus::Completed);
        assert_eq!(JobStatus::from_exit_code(Some(2)), JobStatus::Failed);
        assert_eq!(JobStatus::from_exit_code(None), JobStatus::Failed);
    }

    #[test]
    fn decodes_dashboard_written_meta() {
        let id = JobId::new("abc");
        let map = meta(&[
            ("id", "abc"),
            ("repoPath", "/home/dev/repos/app"),
            ("prompt", "list files"),
            ("mode", "fix"),
            ("status", "pending"),
            ("createdAt", "1718000000000"),
        ]);

        let job = Job::from_fields(&id, &map).unwrap();
        assert_eq!(job.repo_path, "/home/dev/repos/app");
        assert_eq!(job.mode, JobMode::Fix);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, Some(1_718_000_000_000));
        assert_eq!(job.allowed_tools, None);
    }

    #[test]
    fn unknown_mode_falls_back_to_read_only() {
        let map = meta(&[("repoPath", "/r"), ("prompt", "p"), ("mode", "yolo")]);
        let job = Job::from_fields(&JobId::new("x"), &map).unwrap();
        assert_eq!(job.mode, JobMode::Plan);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn missing_repo_path_is_rejected() {
        let map = meta(&[("prompt", "p")]);
        let err = Job::from_fields(&JobId::new("x"), &map).unwrap_err();
        assert!(err.contains("repoPath"));
    }

    #[test]
    fn to_fields_skips_absent_optionals() {
        let job = Job::pending(JobId::new("x"), "/r", "p", JobMode::Plan, 5);
        let fields: HashMap<_, _> = job.to_fields().into_iter().collect();
        assert_eq!(fields.get("createdAt").map(String::as_str), Some("5"));
        assert!(!fields.contains_key("startTime"));
        assert!(!fields.contains_key("error"));

        let back = Job::from_fields(&job.id, &fields).unwrap();
        assert_eq!(back, job);
    }
}
