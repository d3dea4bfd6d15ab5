//! Go toolchain invocation.
//!
//! The [`Toolchain`] trait is the seam between the build and vet drivers and
//! the `go` command, so both drivers can be exercised without a Go
//! installation.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::{PlayError, ToolchainError};

const TOOLCHAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::toolchain");

/// Environment variables forwarded from the host to every `go` invocation.
const FORWARDED_ENV: [&str; 2] = ["PATH", "HOME"];

/// Boxed future type returned by [`Toolchain`] implementors.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, PlayError>> + Send + 'a>>;

/// `go` sub-commands the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoTool {
    /// `go build`.
    Build,
    /// `go vet`.
    Vet,
}

impl GoTool {
    /// Return the sub-command name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Vet => "vet",
        }
    }
}

/// One `go <tool> <args>` invocation in a build root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    tool: GoTool,
    args: Vec<String>,
    dir: Utf8PathBuf,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ToolInvocation {
    /// Create an invocation of `tool` running in `dir`.
    #[must_use]
    pub fn new(tool: GoTool, dir: impl Into<Utf8PathBuf>, timeout: Duration) -> Self {
        Self {
            tool,
            args: vec![],
            dir: dir.into(),
            env: vec![],
            timeout,
        }
    }

    /// Append command-line arguments after the sub-command.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment variables for this invocation only.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Return the sub-command.
    #[must_use]
    pub const fn tool(&self) -> GoTool {
        self.tool
    }

    /// Return the arguments after the sub-command.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Return the working directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Return the per-invocation environment.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Return the value of `key` in the per-invocation environment.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Return the time limit.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Result of a `go` invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    success: bool,
    output: String,
}

impl ToolOutput {
    /// Create a tool output.
    #[must_use]
    pub fn new(success: bool, output: impl Into<String>) -> Self {
        Self {
            success,
            output: output.into(),
        }
    }

    /// Return whether the tool exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Return the combined stdout and stderr text.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Behaviour required to run Go toolchain commands.
///
/// Implementations return `Ok` whenever the tool ran, whatever its exit
/// status, and reserve `Err` for a tool that could not be run.
pub trait Toolchain: Send + Sync {
    /// Run `invocation` to completion.
    fn run(&self, invocation: ToolInvocation) -> ToolFuture<'_>;
}

/// [`Toolchain`] backed by a local `go` binary.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go_binary: Utf8PathBuf,
    base_env: Vec<(String, String)>,
}

impl GoToolchain {
    /// Create a toolchain for `go_binary` with the environment shared by
    /// every invocation.
    #[must_use]
    pub fn new(go_binary: impl Into<Utf8PathBuf>, base_env: Vec<(String, String)>) -> Self {
        Self {
            go_binary: go_binary.into(),
            base_env,
        }
    }

    /// Create a toolchain, forwarding `PATH` and `HOME` from `env` ahead of
    /// `base_env`.
    #[must_use]
    pub fn with_host_env(
        go_binary: impl Into<Utf8PathBuf>,
        env: &impl mockable::Env,
        base_env: Vec<(String, String)>,
    ) -> Self {
        let mut merged: Vec<(String, String)> = FORWARDED_ENV
            .iter()
            .filter_map(|key| env.string(key).map(|value| (String::from(*key), value)))
            .collect();
        merged.extend(base_env);
        Self::new(go_binary, merged)
    }

    /// Return the `go` binary path.
    #[must_use]
    pub fn go_binary(&self) -> &Utf8Path {
        &self.go_binary
    }

    async fn run_async(&self, invocation: &ToolInvocation) -> Result<ToolOutput, PlayError> {
        let tool = invocation.tool().as_str();
        let mut command = tokio::process::Command::new(self.go_binary.as_std_path());
        command
            .arg(tool)
            .args(invocation.args())
            .current_dir(invocation.dir().as_std_path())
            .env_clear()
            .envs(self.base_env.iter().map(|(key, value)| (key, value)))
            .envs(invocation.env().iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            target: TOOLCHAIN_TARGET,
            tool,
            dir = %invocation.dir(),
            args = ?invocation.args(),
            "running go toolchain"
        );

        let output = match tokio::time::timeout(invocation.timeout(), command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return Err(PlayError::from(ToolchainError::SpawnFailed {
                    tool: String::from(tool),
                    message: error.to_string(),
                }));
            }
            Err(_) => {
                warn!(
                    target: TOOLCHAIN_TARGET,
                    tool,
                    timeout_secs = invocation.timeout().as_secs(),
                    "go toolchain timed out, killing process"
                );
                return Err(PlayError::from(ToolchainError::TimedOut {
                    tool: String::from(tool),
                    seconds: invocation.timeout().as_secs(),
                }));
            }
        };

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        debug!(
            target: TOOLCHAIN_TARGET,
            tool,
            status = ?output.status,
            output_bytes = combined.len(),
            "go toolchain exited"
        );

        Ok(ToolOutput::new(
            output.status.success(),
            String::from_utf8_lossy(&combined),
        ))
    }
}

impl Toolchain for GoToolchain {
    fn run(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move { self.run_async(&invocation).await })
    }
}
