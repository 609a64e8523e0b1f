//! EngineConfig - 環境変数からの設定読み込み
//!
//! バイナリ側で dotenvy を読んだあと `EngineConfig::from_env()` を呼ぶ。
//! テストは `from_lookup` にクロージャを渡して環境を汚さない。

use std::time::Duration;

use super::admission::AllowedRoots;
use super::retry::RetryPolicy;
use crate::domain::ConfigError;

pub const DEFAULT_ALLOWED_TOOLS: &str =
    "Read,Bash(git:*),Bash(npm run test:e2e),Bash(pnpm -v),Bash(node -v)";
pub const DEFAULT_AGENT_PROGRAM: &str = "claude";

pub const ENV_ALLOWED_ROOTS: &str = "ALLOWED_ROOTS";
pub const ENV_DEFAULT_TOOLS: &str = "COURIER_DEFAULT_TOOLS";
pub const ENV_AGENT_BIN: &str = "COURIER_AGENT_BIN";
pub const ENV_QUEUE_POLL_MS: &str = "COURIER_QUEUE_POLL_MS";
pub const ENV_ERROR_BACKOFF_MS: &str = "COURIER_ERROR_BACKOFF_MS";
pub const ENV_CONTROL_POLL_MS: &str = "COURIER_CONTROL_POLL_MS";
pub const ENV_CANCEL_GRACE_MS: &str = "COURIER_CANCEL_GRACE_MS";
pub const ENV_JOB_TIMEOUT_SECS: &str = "COURIER_JOB_TIMEOUT_SECS";
pub const ENV_STORE_RETRIES: &str = "COURIER_STORE_RETRIES";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub allowed_roots: AllowedRoots,
    /// Capability list used when a job does not carry `allowedTools`.
    pub default_tools: String,
    pub agent_program: String,
    /// Sleep after finding the queue empty.
    pub queue_poll_interval: Duration,
    /// Sleep after a failed dispatch iteration.
    pub error_backoff: Duration,
    pub control_poll_interval: Duration,
    /// SIGINT to SIGKILL escalation delay. `None` never escalates.
    pub cancel_grace: Option<Duration>,
    /// Overall job ceiling. `None` lets a job run forever.
    pub job_timeout: Option<Duration>,
    /// How long to keep reading the pipes after the agent exits. A grandchild
    /// that inherited stdout would otherwise hold the job open.
    pub stream_drain_timeout: Duration,
    /// Status, log and artifact writes for a claimed job.
    pub store_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allowed_roots: AllowedRoots::default(),
            default_tools: DEFAULT_ALLOWED_TOOLS.to_string(),
            agent_program: DEFAULT_AGENT_PROGRAM.to_string(),
            queue_poll_interval: Duration::from_millis(2_000),
            error_backoff: Duration::from_millis(5_000),
            control_poll_interval: Duration::from_millis(500),
            cancel_grace: Some(Duration::from_millis(10_000)),
            job_timeout: None,
            stream_drain_timeout: Duration::from_secs(5),
            store_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or blank variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_ALLOWED_ROOTS) {
            config.allowed_roots = AllowedRoots::parse(&raw)?;
        }
        if let Some(tools) = get(ENV_DEFAULT_TOOLS) {
            config.default_tools = tools.trim().to_string();
        }
        if let Some(program) = get(ENV_AGENT_BIN) {
            config.agent_program = program.trim().to_string();
        }
        if let Some(ms) = parse_u64(ENV_QUEUE_POLL_MS, get(ENV_QUEUE_POLL_MS))? {
            config.queue_poll_interval = positive_millis(ENV_QUEUE_POLL_MS, ms)?;
        }
        if let Some(ms) = parse_u64(ENV_ERROR_BACKOFF_MS, get(ENV_ERROR_BACKOFF_MS))? {
            config.error_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(ENV_CONTROL_POLL_MS, get(ENV_CONTROL_POLL_MS))? {
            config.control_poll_interval = positive_millis(ENV_CONTROL_POLL_MS, ms)?;
        }
        if let Some(ms) = parse_u64(ENV_CANCEL_GRACE_MS, get(ENV_CANCEL_GRACE_MS))? {
            config.cancel_grace = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(secs) = parse_u64(ENV_JOB_TIMEOUT_SECS, get(ENV_JOB_TIMEOUT_SECS))? {
            config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(attempts) = parse_u64(ENV_STORE_RETRIES, get(ENV_STORE_RETRIES))? {
            config.store_retry.max_attempts = u32::try_from(attempts)
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: ENV_STORE_RETRIES,
                    expected: "between 1 and 4294967295",
                    value: attempts.to_string(),
                })?;
        }
        Ok(config)
    }

    /// The capability list for a job.
    pub fn tools_for<'a>(&'a self, job_tools: Option<&'a str>) -> &'a str {
        job_tools
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.default_tools.as_str())
    }
}

fn parse_u64(name: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    raw.map(|raw| {
        raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a non-negative integer",
            value: raw,
        })
    })
    .transpose()
}

fn positive_millis(name: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::Invalid {
            name,
            expected: "greater than zero",
            value: ms.to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}
