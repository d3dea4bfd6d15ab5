//! Configuration data types for goplay.

use camino::Utf8PathBuf;
use clap::ValueEnum;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::ConfigError;

/// Where sandboxed programs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateKind {
    /// A local child process with no containment. For development only.
    #[default]
    Process,
    /// A locked-down container driven through the Docker or Podman API.
    Container,
}

/// Output format of the diagnostic log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable records.
    #[default]
    Compact,
    /// One JSON object per record.
    Json,
}

/// Go toolchain configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// The `go` binary to invoke. Bare names are looked up on `PATH`.
    #[default(Utf8PathBuf::from("go"))]
    pub go_binary: Utf8PathBuf,

    /// `GOROOT` to pin. Also the source of the sandbox time-zone database.
    pub goroot: Option<Utf8PathBuf>,

    /// `GOPATH` shared by all builds.
    pub gopath: Option<Utf8PathBuf>,

    /// `GOCACHE` shared by all builds.
    pub cache_dir: Option<Utf8PathBuf>,

    /// Parent directory for per-request build and run directories.
    pub scratch_dir: Option<Utf8PathBuf>,

    /// Target operating system.
    #[default = "linux"]
    pub goos: String,

    /// Target architecture.
    #[default = "amd64"]
    pub goarch: String,

    /// Limit in seconds for one `go build` or `go vet` invocation.
    #[default(60)]
    pub build_timeout_secs: u64,
}

/// Third-party module resolution.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Allow `go build` to download modules through the proxy.
    #[default(true)]
    pub allow_downloads: bool,

    /// Module proxy URL.
    #[default = "https://proxy.golang.org"]
    pub proxy: String,
}

/// Sandbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Isolation substrate.
    pub substrate: SubstrateKind,

    /// Wall-clock budget in milliseconds for one run.
    #[default(10_000)]
    pub run_timeout_ms: u64,

    /// Maximum combined stdout and stderr bytes.
    #[default(104_857_600)]
    pub max_output_bytes: u64,

    /// Container memory limit in bytes.
    #[default(104_857_600)]
    pub memory_bytes: i64,

    /// Container process and thread limit.
    #[default(256)]
    pub pids_limit: i64,

    /// Container CPU quota in units of 1e-9 CPUs.
    #[default(1_000_000_000)]
    pub nano_cpus: i64,
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Record format.
    pub format: LogFormat,

    /// `tracing` filter directive, for example `info,goplay::sandbox=debug`.
    #[default = "info"]
    pub filter: String,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `GOPLAY_CONFIG_PATH` environment variable
/// 2. `.goplay.toml` in the current working directory
/// 3. `.goplay.toml` in the home directory
/// 4. `~/.config/goplay/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "GOPLAY",
    post_merge_hook,
    discovery(
        app_name = "goplay",
        env_var = "GOPLAY_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".goplay.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// The image sandbox containers are created from.
    pub image: Option<String>,

    /// Go toolchain configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub toolchain: ToolchainConfig,

    /// Module resolution configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub modules: ModulesConfig,

    /// Sandbox configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub sandbox: SandboxConfig,

    /// Logging configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Checks that the merged values can drive a run.
    ///
    /// The container substrate needs an image, and every limit must be
    /// positive.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when the container substrate is
    /// selected without an image, and `ConfigError::InvalidValue` for a zero or
    /// negative limit.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.sandbox.substrate == SubstrateKind::Container
            && self.image.as_deref().is_none_or(|image| image.trim().is_empty())
        {
            return Err(ConfigError::MissingRequired {
                field: String::from("image"),
            }
            .into());
        }

        let unsigned_limits = [
            ("toolchain.build_timeout_secs", self.toolchain.build_timeout_secs),
            ("sandbox.run_timeout_ms", self.sandbox.run_timeout_ms),
            ("sandbox.max_output_bytes", self.sandbox.max_output_bytes),
        ];
        if let Some((field, _)) = unsigned_limits.iter().find(|(_, value)| *value == 0) {
            return Err(invalid_limit(field));
        }

        let signed_limits = [
            ("sandbox.memory_bytes", self.sandbox.memory_bytes),
            ("sandbox.pids_limit", self.sandbox.pids_limit),
            ("sandbox.nano_cpus", self.sandbox.nano_cpus),
        ];
        if let Some((field, _)) = signed_limits.iter().find(|(_, value)| *value <= 0) {
            return Err(invalid_limit(field));
        }
        Ok(())
    }
}

fn invalid_limit(field: &str) -> crate::error::PlayError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from("must be greater than zero"),
    }
    .into()
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.log.filter = String::from(self.log.filter.trim());
        if self.log.filter.is_empty() {
            self.log.filter = LogConfig::default().filter;
        }
        Ok(())
    }
}
