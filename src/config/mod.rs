// ABOUTME: Environment-driven configuration for the Codex bridge
// Resolves command/args/cwd, env passthrough rules, session TTL, and
// feature flags into one immutable snapshot read at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Command to launch when spawning a Codex subprocess.
pub const ENV_COMMAND: &str = "CODEX_COMMAND";
/// Whitespace-separated arguments for the Codex command.
pub const ENV_ARGS: &str = "CODEX_ARGS";
/// Working directory for the Codex subprocess.
pub const ENV_CWD: &str = "CODEX_CWD";
/// Comma-separated allow-list of variables passed through to the subprocess.
pub const ENV_PASSTHROUGH: &str = "CODEX_ENV_PASSTHROUGH";
/// Idle seconds before a pooled session is evicted.
pub const ENV_SESSION_TTL: &str = "BRIDGE_SESSION_TTL_SECS";
/// Give every request an isolated, non-reused client.
pub const ENV_SINGLE_SHOT: &str = "BRIDGE_SINGLE_SHOT";
/// Cache clients per session key and reuse them across requests.
pub const ENV_REUSE_SESSIONS: &str = "BRIDGE_REUSE_SESSIONS";
/// Keep the subprocess alive across client handle drops.
pub const ENV_KEEP_ALIVE: &str = "BRIDGE_KEEP_ALIVE";
/// Route identity-less requests to the shared "global" session.
pub const ENV_ALLOW_GLOBAL_FALLBACK: &str = "BRIDGE_ALLOW_GLOBAL_FALLBACK";
/// Tracing filter directive (EnvFilter syntax).
pub const ENV_LOG: &str = "BRIDGE_LOG";
/// Directory for JSONL log files; logging stays on stderr when unset.
pub const ENV_LOG_DIR: &str = "BRIDGE_LOG_DIR";

const DEFAULT_COMMAND: &str = "codex";
const DEFAULT_ARGS: &str = "mcp-server";
const DEFAULT_PASSTHROUGH: &str = "PATH,HOME,USER";
const DEFAULT_TTL_SECS: u64 = 1800;
const DEFAULT_LOG_FILTER: &str = "codex_bridge=info";

/// Immutable configuration snapshot for the bridge
///
/// Read once from the process environment at startup; never hot-reloaded.
/// Every field has a default, so a missing or malformed variable can never
/// fail startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Command used to launch the Codex subprocess
    pub command: String,

    /// Arguments for the command
    pub args: Vec<String>,

    /// Working directory for the subprocess
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Variables passed through to the subprocess by exact name
    pub env_passthrough: Vec<String>,

    /// Idle duration before a pooled session is evicted
    #[serde(with = "duration_secs")]
    pub session_ttl: Duration,

    /// Every request gets an isolated, non-reused client (default on)
    pub single_shot: bool,

    /// Cache clients per session key (opt-in; ignored while single-shot)
    pub reuse_sessions: bool,

    /// Keep subprocesses alive across handle drops (forced off by single-shot)
    pub keep_alive: bool,

    /// Share one "global" session across identity-less requests
    pub allow_global_fallback: bool,

    /// Tracing filter directive
    pub log_filter: String,

    /// Directory for JSONL log files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            args: split_whitespace(DEFAULT_ARGS),
            cwd: None,
            env_passthrough: split_csv(DEFAULT_PASSTHROUGH),
            session_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            single_shot: true,
            reuse_sessions: false,
            keep_alive: false,
            allow_global_fallback: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Read the configuration snapshot from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build a snapshot from an arbitrary key/value lookup
    ///
    /// Pure function of the lookup; this is the testable core behind
    /// [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let command = get(ENV_COMMAND)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.command);

        let args = get(ENV_ARGS).map_or(defaults.args, |v| split_whitespace(&v));

        let cwd = get(ENV_CWD)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let env_passthrough =
            get(ENV_PASSTHROUGH).map_or(defaults.env_passthrough, |v| split_csv(&v));

        let session_ttl = get(ENV_SESSION_TTL)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(defaults.session_ttl, Duration::from_secs);

        let flag = |key: &str, default: bool| get(key).map_or(default, |v| parse_bool(&v));

        Self {
            command,
            args,
            cwd,
            env_passthrough,
            session_ttl,
            single_shot: flag(ENV_SINGLE_SHOT, defaults.single_shot),
            reuse_sessions: flag(ENV_REUSE_SESSIONS, defaults.reuse_sessions),
            keep_alive: flag(ENV_KEEP_ALIVE, defaults.keep_alive),
            allow_global_fallback: flag(ENV_ALLOW_GLOBAL_FALLBACK, defaults.allow_global_fallback),
            log_filter: get(ENV_LOG)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_filter),
            log_dir: get(ENV_LOG_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Whether pooled-session mode is active
    ///
    /// Pooling requires reuse to be opted in and single-shot to be off;
    /// single-shot always wins.
    #[must_use]
    pub const fn pooled(&self) -> bool {
        !self.single_shot && self.reuse_sessions
    }

    /// Effective keep-alive for spawned subprocesses
    ///
    /// Single-shot mode forces keep-alive off regardless of the flag.
    #[must_use]
    pub const fn effective_keep_alive(&self) -> bool {
        self.keep_alive && !self.single_shot
    }
}

/// Parse a boolean flag from the small set of truthy tokens
///
/// `1`, `true`, and `yes` (case-insensitive) are true; everything else,
/// including the empty string, is false.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Split a comma-separated list, trimming items and dropping empties
#[must_use]
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn split_whitespace(value: &str) -> Vec<String> {
    value.split_whitespace().map(ToString::to_string).collect()
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
