//! Semantic error types for the goplay engine.
//!
//! This module defines the error hierarchy for goplay, following the principle
//! of using semantic error enums (via `thiserror`) for conditions the caller
//! might inspect or map to a response, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! Problems with the submitted program itself (wrong package name, compile
//! diagnostics, vet findings, non-zero exit) are *not* errors here: they are
//! carried inside [`crate::api::Response`]. The types below cover fatal
//! execution outcomes and infrastructure faults.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while driving the Go toolchain.
///
/// A toolchain that runs and reports diagnostics is not an error; these
/// variants cover a toolchain that could not be run at all.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The toolchain binary could not be spawned.
    #[error("failed to run '{tool}': {message}")]
    SpawnFailed {
        /// The toolchain sub-command (`build`, `vet`).
        tool: String,
        /// A description of the spawn failure.
        message: String,
    },

    /// The toolchain did not finish within the build timeout.
    #[error("'{tool}' timed out after {seconds} seconds")]
    TimedOut {
        /// The toolchain sub-command (`build`, `vet`).
        tool: String,
        /// The timeout in seconds.
        seconds: u64,
    },

    /// The build reported success but produced no executable.
    #[error("build succeeded but produced no executable: {message}")]
    ArtifactMissing {
        /// A description of the missing artifact.
        message: String,
    },
}

/// Errors that can occur during container engine operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Failed to create a sandbox container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to upload the program image into a container.
    #[error("failed to upload files to container '{container_id}': {message}")]
    UploadFailed {
        /// The ID of the target container.
        container_id: String,
        /// A description of the upload failure.
        message: String,
    },

    /// Failed to attach to or start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to collect the exit status of a container.
    #[error("failed to wait for container '{container_id}': {message}")]
    WaitFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the wait failure.
        message: String,
    },

    /// Failed to kill or remove a container.
    #[error("failed to remove container '{container_id}': {message}")]
    RemoveFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the removal failure.
        message: String,
    },
}

/// Errors raised by an isolation substrate outside of the container engine.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// The sandboxed program could not be launched.
    #[error("failed to launch sandboxed program: {message}")]
    LaunchFailed {
        /// A description of the launch failure.
        message: String,
    },

    /// Reading the program's output failed.
    #[error("failed reading sandboxed output: {message}")]
    StreamFailed {
        /// A description of the stream failure.
        message: String,
    },

    /// The program could not be terminated or reaped.
    #[error("failed to terminate sandboxed program: {message}")]
    KillFailed {
        /// A description of the termination failure.
        message: String,
    },
}

/// Fatal outcomes of running a sandboxed program.
///
/// These are distinct from compile and vet diagnostics: the request fails and
/// no event stream is returned.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The program exceeded its wall-clock budget and was killed.
    #[error("process took too long")]
    TimedOut {
        /// The wall-clock budget in milliseconds.
        limit_ms: u64,
    },

    /// The program wrote more output than allowed and was killed.
    #[error("program output too large: exceeded {limit} bytes")]
    OutputLimitExceeded {
        /// The output byte limit.
        limit: u64,
    },

    /// The run was aborted by the caller.
    #[error("program was killed: {reason}")]
    Killed {
        /// Why the program was killed.
        reason: String,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

impl FilesystemError {
    /// Classify an I/O error raised at `path`.
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path_buf = path.into();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path: path_buf },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: path_buf },
            _ => Self::IoError {
                path: path_buf,
                message: error.to_string(),
            },
        }
    }
}

/// Top-level error type for the goplay engine.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the engine. At the application boundary (main.rs), these
/// errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum PlayError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The Go toolchain could not be driven.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// The isolation substrate failed.
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// The sandboxed run ended fatally.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl PlayError {
    /// Returns whether the error is an infrastructure fault rather than a
    /// property of the submitted program.
    ///
    /// Infrastructure faults need operator attention; execution errors are
    /// reported to the submitter.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::Execution(_))
    }
}

/// A specialised `Result` type for goplay operations.
pub type Result<T> = std::result::Result<T, PlayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Report;
    use rstest::{fixture, rstest};

    /// Fixture providing a sample configuration file path.
    #[fixture]
    fn config_path() -> PathBuf {
        PathBuf::from("/etc/goplay/config.toml")
    }

    /// Fixture providing a sample container socket path.
    #[fixture]
    fn socket_path() -> PathBuf {
        PathBuf::from("/run/podman/podman.sock")
    }

    #[rstest]
    fn config_error_file_not_found_displays_correctly(config_path: PathBuf) {
        let error = ConfigError::FileNotFound { path: config_path };
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/goplay/config.toml"
        );
    }

    #[rstest]
    #[case(
        "sandbox.run_timeout_ms",
        "must be greater than zero",
        "invalid configuration value for 'sandbox.run_timeout_ms': must be greater than zero"
    )]
    #[case(
        "toolchain.go_binary",
        "cannot be empty",
        "invalid configuration value for 'toolchain.go_binary': cannot be empty"
    )]
    fn config_error_invalid_value_displays_correctly(
        #[case] field: &str,
        #[case] reason: &str,
        #[case] expected: &str,
    ) {
        let error = ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from(reason),
        };
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn toolchain_error_timeout_names_tool() {
        let error = ToolchainError::TimedOut {
            tool: String::from("build"),
            seconds: 60,
        };
        assert_eq!(error.to_string(), "'build' timed out after 60 seconds");
    }

    #[rstest]
    fn container_error_permission_denied_displays_correctly(socket_path: PathBuf) {
        let error = ContainerError::PermissionDenied { path: socket_path };
        assert_eq!(
            error.to_string(),
            "permission denied accessing container socket: /run/podman/podman.sock"
        );
    }

    #[rstest]
    fn execution_timeout_reads_like_the_playground() {
        let error = ExecutionError::TimedOut { limit_ms: 10_000 };
        assert_eq!(error.to_string(), "process took too long");
    }

    #[rstest]
    fn execution_output_limit_names_limit() {
        let error = ExecutionError::OutputLimitExceeded { limit: 1024 };
        assert_eq!(
            error.to_string(),
            "program output too large: exceeded 1024 bytes"
        );
    }

    #[rstest]
    #[case(std::io::ErrorKind::NotFound, "path not found: /etc/goplay/config.toml")]
    #[case(
        std::io::ErrorKind::PermissionDenied,
        "permission denied: /etc/goplay/config.toml"
    )]
    #[case(
        std::io::ErrorKind::Other,
        "I/O error at '/etc/goplay/config.toml': disk full"
    )]
    fn filesystem_error_classifies_io_kinds(
        config_path: PathBuf,
        #[case] kind: std::io::ErrorKind,
        #[case] expected: &str,
    ) {
        let io_error = std::io::Error::new(kind, "disk full");
        let error = FilesystemError::from_io(config_path, &io_error);
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    fn execution_errors_are_not_infrastructure() {
        let error = PlayError::from(ExecutionError::TimedOut { limit_ms: 1 });
        assert!(!error.is_infrastructure());
    }

    #[rstest]
    fn toolchain_errors_are_infrastructure() {
        let error = PlayError::from(ToolchainError::SpawnFailed {
            tool: String::from("vet"),
            message: String::from("not found"),
        });
        assert!(error.is_infrastructure());
    }

    #[rstest]
    #[case(
        PlayError::from(ConfigError::MissingRequired {
            field: String::from("toolchain.go_binary"),
        }),
        "missing required configuration: toolchain.go_binary"
    )]
    #[case(
        PlayError::from(ContainerError::CreateFailed {
            message: String::from("image missing"),
        }),
        "failed to create container: image missing"
    )]
    #[case(
        PlayError::from(ExecutionError::TimedOut { limit_ms: 5 }),
        "process took too long"
    )]
    fn eyre_report_preserves_error_messages(#[case] error: PlayError, #[case] expected: &str) {
        let report = Report::from(error);
        assert_eq!(report.to_string(), expected);
    }
}
