//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::{AppConfig, LogFormat, SubstrateKind};

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/podman/podman.sock"
        image = "ghcr.io/example/goplay-sandbox:latest"

        [toolchain]
        go_binary = "/usr/local/go/bin/go"
        goroot = "/usr/local/go"
        goarch = "arm64"
        build_timeout_secs = 90

        [modules]
        allow_downloads = false
        proxy = "https://goproxy.example"

        [sandbox]
        substrate = "container"
        run_timeout_ms = 5000
        pids_limit = 64

        [log]
        format = "json"
        filter = "debug"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        [sandbox]
        run_timeout_ms = 2500
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert!(config.image.is_none(), "image should be None");
    assert_eq!(config.toolchain.go_binary.as_str(), "go");
    assert_eq!(config.toolchain.goos, "linux");
    assert_eq!(config.toolchain.goarch, "amd64");
    assert_eq!(config.toolchain.build_timeout_secs, 60);
    assert!(config.modules.allow_downloads, "downloads should be on");
    assert_eq!(config.sandbox.substrate, SubstrateKind::Process);
    assert_eq!(config.sandbox.run_timeout_ms, 10_000);
    assert_eq!(config.sandbox.max_output_bytes, 100 * 1024 * 1024);
    assert_eq!(config.log.format, LogFormat::Compact);
    assert_eq!(config.log.filter, "info");
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;
    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "image": "file-image:latest",
            "sandbox": { "run_timeout_ms": 3000, "pids_limit": 32 }
        }),
        None,
    );
    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "sandbox": { "run_timeout_ms": 4000 }
    }));
    Ok(composer)
}
