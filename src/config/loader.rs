//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! `GOPLAY_*` environment variables, command-line arguments.
//!
//! The layers are assembled with `MergeComposer` directly rather than through
//! the derived `load()`. The `Cli` struct owns subcommand dispatch and the
//! `--config` flag, so discovery has to honour that path first. Typed
//! environment variables are parsed here and a bad value is an error: a
//! `GOPLAY_MODULES_ALLOW_DOWNLOADS=maybe` must not silently fall back to the
//! default. String fields such as `GOPLAY_ENGINE_SOCKET` are always accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

const APP_NAME: &str = "goplay";
const CONFIG_PATH_ENV: &str = "GOPLAY_CONFIG_PATH";

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// Taken verbatim.
    String,
    /// `true` or `false`.
    Bool,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 64-bit integer.
    I64,
}

/// One environment variable and the configuration path it sets.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const fn spec(
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type,
    }
}

/// Every recognised environment variable.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    spec("GOPLAY_ENGINE_SOCKET", &["engine_socket"], EnvVarType::String),
    spec("GOPLAY_IMAGE", &["image"], EnvVarType::String),
    // [toolchain]
    spec(
        "GOPLAY_TOOLCHAIN_GO_BINARY",
        &["toolchain", "go_binary"],
        EnvVarType::String,
    ),
    spec("GOPLAY_TOOLCHAIN_GOROOT", &["toolchain", "goroot"], EnvVarType::String),
    spec("GOPLAY_TOOLCHAIN_GOPATH", &["toolchain", "gopath"], EnvVarType::String),
    spec(
        "GOPLAY_TOOLCHAIN_CACHE_DIR",
        &["toolchain", "cache_dir"],
        EnvVarType::String,
    ),
    spec(
        "GOPLAY_TOOLCHAIN_SCRATCH_DIR",
        &["toolchain", "scratch_dir"],
        EnvVarType::String,
    ),
    spec("GOPLAY_TOOLCHAIN_GOOS", &["toolchain", "goos"], EnvVarType::String),
    spec("GOPLAY_TOOLCHAIN_GOARCH", &["toolchain", "goarch"], EnvVarType::String),
    spec(
        "GOPLAY_TOOLCHAIN_BUILD_TIMEOUT_SECS",
        &["toolchain", "build_timeout_secs"],
        EnvVarType::U64,
    ),
    // [modules]
    spec(
        "GOPLAY_MODULES_ALLOW_DOWNLOADS",
        &["modules", "allow_downloads"],
        EnvVarType::Bool,
    ),
    spec("GOPLAY_MODULES_PROXY", &["modules", "proxy"], EnvVarType::String),
    // [sandbox]
    spec(
        "GOPLAY_SANDBOX_SUBSTRATE",
        &["sandbox", "substrate"],
        EnvVarType::String,
    ),
    spec(
        "GOPLAY_SANDBOX_RUN_TIMEOUT_MS",
        &["sandbox", "run_timeout_ms"],
        EnvVarType::U64,
    ),
    spec(
        "GOPLAY_SANDBOX_MAX_OUTPUT_BYTES",
        &["sandbox", "max_output_bytes"],
        EnvVarType::U64,
    ),
    spec(
        "GOPLAY_SANDBOX_MEMORY_BYTES",
        &["sandbox", "memory_bytes"],
        EnvVarType::I64,
    ),
    spec(
        "GOPLAY_SANDBOX_PIDS_LIMIT",
        &["sandbox", "pids_limit"],
        EnvVarType::I64,
    ),
    spec(
        "GOPLAY_SANDBOX_NANO_CPUS",
        &["sandbox", "nano_cpus"],
        EnvVarType::I64,
    ),
    // [log]
    spec("GOPLAY_LOG_FORMAT", &["log", "format"], EnvVarType::String),
    spec("GOPLAY_LOG_FILTER", &["log", "filter"], EnvVarType::String),
];

/// Returns the environment variable names the loader reads.
///
/// Tests use this to clear every `GOPLAY_*` variable before running.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Read the TOML file at `path` and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// The file layer uses `--config` when it names an existing file, otherwise
/// the first existing discovery candidate.
///
/// # Errors
///
/// Returns `ConfigError` when a configuration file is malformed, a typed
/// environment variable does not parse, or the merged layers do not
/// deserialise.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            ConfigDiscovery::builder(APP_NAME)
                .env_var(CONFIG_PATH_ENV)
                .config_file_name("config.toml")
                .dotfile_name(".goplay.toml")
                .build()
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });
    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

/// Collect the variables named in [`ENV_VAR_SPECS`] into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when a bool or integer variable does
/// not parse.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |expected: &str, raw: &str| ConfigError::InvalidValue {
        field: String::from(spec.env_var),
        reason: format!("expected {expected}, got '{raw}'"),
    };

    let value = match spec.var_type {
        EnvVarType::String => Value::String(raw_value),
        EnvVarType::Bool => raw_value
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid("bool (true/false)", &raw_value))?,
        EnvVarType::U64 => raw_value
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("unsigned integer", &raw_value))?,
        EnvVarType::I64 => raw_value
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("integer", &raw_value))?,
    };
    Ok(value)
}

/// Insert `value` at `path`, creating intermediate objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(String::from(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(String::from(field), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert(String::from("engine_socket"), Value::String(socket.clone()));
    }

    if let Some(ref image) = cli.image {
        overrides.insert(String::from("image"), Value::String(image.clone()));
    }

    if let Some(substrate) = cli.substrate {
        let mut sandbox = Map::new();
        if let Ok(kind) = serde_json::to_value(substrate) {
            sandbox.insert(String::from("substrate"), kind);
        }
        overrides.insert(String::from("sandbox"), Value::Object(sandbox));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
