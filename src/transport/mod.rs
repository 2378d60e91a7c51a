// ABOUTME: Stdio transport for Codex subprocesses
// Spawns the configured command with piped stdin/stdout, a constructed
// (not inherited) environment, and explicit SIGTERM-then-SIGKILL teardown.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

/// Variable-name prefixes always passed through to the subprocess,
/// in addition to the configured allow-list.
pub const ENV_PASSTHROUGH_PREFIXES: [&str; 2] = ["XDG_", "CODEX_"];

/// How long to wait after SIGTERM before escalating to SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Errors that can occur when constructing a subprocess-backed client
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The configured command is empty
    #[error("Command cannot be empty")]
    EmptyCommand,

    /// The subprocess could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command that failed to start
        command: String,
        /// Underlying I/O error from the OS
        #[source]
        source: std::io::Error,
    },
}

/// Piped stdin/stdout of a spawned Codex subprocess
///
/// Handed to the forwarding layer, which owns serialization of concurrent
/// use; the bridge core never reads or writes these itself.
pub struct ClientStdio {
    /// Write side of the subprocess transport
    pub stdin: ChildStdin,
    /// Read side of the subprocess transport
    pub stdout: ChildStdout,
}

/// Handle to a live subprocess-backed Codex client
///
/// Cheap to share behind an `Arc`; multiple concurrent callers may hold
/// the same handle. Dropping a non-keep-alive handle kills the subprocess
/// (`kill_on_drop`); a keep-alive handle only releases the process through
/// [`StdioClient::terminate`].
pub struct StdioClient {
    command: String,
    pid: u32,
    keep_alive: bool,
    child: Mutex<Option<Child>>,
    io: Mutex<Option<ClientStdio>>,
}

impl std::fmt::Debug for StdioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioClient")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl StdioClient {
    /// Process ID of the subprocess (0 if unavailable)
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether this client keeps its subprocess alive across handle drops
    #[must_use]
    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Command this client was spawned from
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Take the piped stdio for the forwarding layer
    ///
    /// Returns `None` if the pipes were already claimed or the client has
    /// been terminated.
    pub async fn take_stdio(&self) -> Option<ClientStdio> {
        self.io.lock().await.take()
    }

    /// Whether the subprocess is still running
    pub async fn is_running(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Tear down the subprocess: SIGTERM, bounded wait, then SIGKILL
    ///
    /// Closing the pipes first lets well-behaved servers exit on EOF.
    /// Idempotent; terminating an already-gone client is a no-op.
    pub async fn terminate(&self) -> std::io::Result<()> {
        drop(self.io.lock().await.take());

        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        info!(pid = self.pid, command = %self.command, "terminating codex subprocess");

        #[cfg(unix)]
        if self.pid > 0 {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            #[allow(clippy::cast_possible_wrap)]
            if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                debug!(pid = self.pid, error = %e, "SIGTERM delivery failed, falling back to wait");
            }
        }

        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(status) => {
                debug!(pid = self.pid, status = ?status.ok(), "codex subprocess exited");
                Ok(())
            }
            Err(_) => {
                warn!(pid = self.pid, "codex subprocess ignored SIGTERM, killing");
                child.start_kill()?;
                child.wait().await?;
                Ok(())
            }
        }
    }
}

/// Builder for subprocess-backed Codex clients
///
/// Captures the transport parameters from a [`BridgeConfig`] snapshot.
/// Construction is never retried here; the caller decides what a failed
/// spawn means for its request.
#[derive(Debug, Clone)]
pub struct StdioClientBuilder {
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    passthrough: HashSet<String>,
    keep_alive: bool,
}

impl StdioClientBuilder {
    /// Derive a builder from the configuration snapshot
    ///
    /// Keep-alive follows `effective_keep_alive`, so single-shot mode
    /// always produces kill-on-drop clients.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            cwd: config.cwd.clone(),
            passthrough: config.env_passthrough.iter().cloned().collect(),
            keep_alive: config.effective_keep_alive(),
        }
    }

    /// Construct the environment map for the subprocess
    ///
    /// Stdio servers do not inherit the parent environment; only variables
    /// named in the allow-list or prefixed `XDG_`/`CODEX_` are passed.
    #[must_use]
    pub fn build_env(&self) -> HashMap<String, String> {
        self.build_env_from(std::env::vars())
    }

    fn build_env_from<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(name, _)| {
                self.passthrough.contains(name)
                    || ENV_PASSTHROUGH_PREFIXES
                        .iter()
                        .any(|prefix| name.starts_with(prefix))
            })
            .collect()
    }

    /// Spawn a new subprocess and wrap it in a client handle
    ///
    /// # Errors
    /// Returns [`SpawnError`] if the command is empty or cannot be started
    /// (missing binary, permissions). Spawn failures are not retried.
    pub async fn build(&self) -> Result<StdioClient, SpawnError> {
        if self.command.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        debug!(
            command = %self.command,
            args = ?self.args,
            keep_alive = self.keep_alive,
            "spawning codex subprocess"
        );

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .env_clear()
            .envs(self.build_env())
            .kill_on_drop(!self.keep_alive);

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        let io = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => Some(ClientStdio { stdin, stdout }),
            _ => None,
        };

        info!(pid = pid, command = %self.command, "codex subprocess spawned");

        Ok(StdioClient {
            command: self.command.clone(),
            pid,
            keep_alive: self.keep_alive,
            child: Mutex::new(Some(child)),
            io: Mutex::new(io),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn builder(command: &str, args: &[&str]) -> StdioClientBuilder {
        let mut config = BridgeConfig::default();
        config.command = command.to_string();
        config.args = args.iter().map(ToString::to_string).collect();
        StdioClientBuilder::from_config(&config)
    }

    #[test]
    fn test_env_filtering() {
        let mut config = BridgeConfig::default();
        config.env_passthrough = vec!["PATH".to_string(), "HOME".to_string()];
        let builder = StdioClientBuilder::from_config(&config);

        let vars = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/me".to_string()),
            ("SECRET_X".to_string(), "hunter2".to_string()),
            ("XDG_FOO".to_string(), "xdg".to_string()),
            ("CODEX_BAR".to_string(), "bar".to_string()),
            ("OTHER".to_string(), "nope".to_string()),
        ];

        let env = builder.build_env_from(vars);
        let mut names: Vec<&str> = env.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["CODEX_BAR", "HOME", "PATH", "XDG_FOO"]);
    }

    #[test]
    fn test_env_filtering_empty_allow_list() {
        let mut config = BridgeConfig::default();
        config.env_passthrough = vec![];
        let builder = StdioClientBuilder::from_config(&config);

        let vars = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("CODEX_HOME".to_string(), "/opt/codex".to_string()),
        ];

        let env = builder.build_env_from(vars);
        assert_eq!(env.len(), 1);
        assert!(env.contains_key("CODEX_HOME"));
    }

    #[test]
    fn test_keep_alive_forced_off_in_single_shot() {
        let mut config = BridgeConfig::default();
        config.single_shot = true;
        config.keep_alive = true;
        let builder = StdioClientBuilder::from_config(&config);
        assert!(!builder.keep_alive);
    }

    #[tokio::test]
    async fn test_build_empty_command() {
        let builder = builder("", &[]);
        let result = builder.build().await;
        assert!(matches!(result, Err(SpawnError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_build_missing_binary() {
        let builder = builder("definitely-not-a-real-binary-xyz", &[]);
        let result = builder.build().await;
        assert!(matches!(result, Err(SpawnError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let builder = builder("cat", &[]);
        let client = builder.build().await.unwrap();

        assert!(client.pid() > 0);
        assert!(client.is_running().await);

        client.terminate().await.unwrap();
        assert!(!client.is_running().await);

        // Idempotent
        client.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_stdio_round_trip() {
        let builder = builder("cat", &[]);
        let client = builder.build().await.unwrap();

        let stdio = client.take_stdio().await.expect("stdio available");
        let mut stdin = stdio.stdin;
        let mut stdout = BufReader::new(stdio.stdout);

        stdin.write_all(b"hello\n").await.unwrap();
        stdin.flush().await.unwrap();

        let mut line = String::new();
        stdout.read_line(&mut line).await.unwrap();
        assert_eq!(line, "hello\n");

        // Pipes can only be claimed once
        assert!(client.take_stdio().await.is_none());

        client.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_error_display() {
        let builder = builder("no-such-cmd-123", &[]);
        let err = builder.build().await.unwrap_err();
        assert!(err.to_string().contains("no-such-cmd-123"));
    }
}
