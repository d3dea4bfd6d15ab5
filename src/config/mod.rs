//! Configuration system for goplay.
//!
//! This module provides the configuration structures and CLI definitions for the
//! goplay application. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/goplay/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//! image = "ghcr.io/example/goplay-sandbox:latest"
//!
//! [toolchain]
//! go_binary = "/usr/local/go/bin/go"
//! goroot = "/usr/local/go"
//! build_timeout_secs = 60
//!
//! [modules]
//! allow_downloads = false
//!
//! [sandbox]
//! substrate = "container"
//! run_timeout_ms = 10000
//! memory_bytes = 104857600
//!
//! [log]
//! format = "json"
//! filter = "info,goplay::sandbox=debug"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, RunArgs};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, LogConfig, LogFormat, ModulesConfig, SandboxConfig, SubstrateKind, ToolchainConfig,
};
