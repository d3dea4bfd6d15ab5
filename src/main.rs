//! `goplay` application entry point.
//!
//! Compiles and runs one Go program per invocation and prints the response as
//! JSON on stdout. It uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/goplay/config.toml` or path from `GOPLAY_CONFIG_PATH`)
//! 3. Environment variables (`GOPLAY_*`)
//! 4. Command-line arguments

use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use goplay::api::{Engine, Request};
use goplay::build::{BuildSettings, GoToolchain};
use goplay::config::{AppConfig, Cli, Commands, RunArgs, SubstrateKind, load_config};
use goplay::error::{ConfigError, FilesystemError, PlayError, Result as PlayResult};
use goplay::sandbox::container::{EngineConnector, SocketResolver};
use goplay::sandbox::fsimage::{self, FsImage};
use goplay::sandbox::{ContainerLimits, ContainerSubstrate, ProcessSubstrate, RunLimits, Substrate};
use goplay::telemetry;
use mockable::DefaultEnv;
use tracing::info;

const MAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::main");

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, installs
/// logging, then dispatches to the subcommand handler.
#[tokio::main]
async fn main() -> EyreResult<()> {
    let cli = Cli::parse();

    // The CLI is passed to extract --config, --engine-socket, --image and
    // --substrate.
    let config = load_config(&cli).map_err(Report::from)?;
    telemetry::initialise(&config.log).map_err(Report::from)?;

    run(&cli, &config).await
}

/// Execute the CLI command.
async fn run(cli: &Cli, config: &AppConfig) -> EyreResult<()> {
    match &cli.command {
        Commands::Run(args) => run_program(config, args).await,
        Commands::FsImage => {
            list_fs_image();
            Ok(())
        }
    }
}

/// Compile and run one program and print the JSON response.
#[expect(clippy::print_stdout, reason = "the response is the CLI's output")]
async fn run_program(config: &AppConfig, args: &RunArgs) -> EyreResult<()> {
    config.validate()?;
    let request = match args.file.as_deref() {
        Some(path) => Request::from_file(path, args.vet)?,
        None => Request::new(read_stdin()?, args.vet),
    };

    let env = DefaultEnv::new();
    let toolchain = Arc::new(GoToolchain::with_host_env(
        config.toolchain.go_binary.as_str(),
        &env,
        vec![],
    ));
    let settings = BuildSettings::from_app_config(config);
    let limits = RunLimits::from_sandbox_config(&config.sandbox);
    let substrate = build_substrate(config, &env).await?;
    info!(
        target: MAIN_TARGET,
        substrate = ?config.sandbox.substrate,
        with_vet = request.with_vet,
        "running program"
    );

    let engine = Engine::new(toolchain, settings, substrate, limits);
    let response = engine.compile_and_run(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn build_substrate(config: &AppConfig, env: &DefaultEnv) -> PlayResult<Box<dyn Substrate>> {
    match config.sandbox.substrate {
        SubstrateKind::Process => Ok(Box::new(ProcessSubstrate::new(
            config.toolchain.scratch_dir.clone(),
        ))),
        SubstrateKind::Container => {
            let goroot = config.toolchain.goroot.as_deref().ok_or_else(|| {
                PlayError::from(ConfigError::MissingRequired {
                    field: String::from("toolchain.goroot"),
                })
            })?;
            let resolver = SocketResolver::new(env);
            let configured = config.engine_socket.as_deref();
            let client = EngineConnector::connect_with_fallback(configured, &resolver)?;
            EngineConnector::verify(&client, &resolver.resolve(configured)).await?;

            let substrate = ContainerSubstrate::new(
                Arc::new(client),
                config.image.clone().unwrap_or_default(),
                ContainerLimits::from_sandbox_config(&config.sandbox),
                FsImage::from_goroot(goroot)?,
            )?;
            Ok(Box::new(substrate))
        }
    }
}

fn read_stdin() -> PlayResult<String> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(|error| PlayError::from(FilesystemError::from_io("<stdin>", &error)))?;
    Ok(body)
}

/// Print every path of the synthetic sandbox filesystem.
#[expect(clippy::print_stdout, reason = "the listing is the CLI's output")]
fn list_fs_image() {
    for path in fsimage::paths() {
        println!("{path}");
    }
}
