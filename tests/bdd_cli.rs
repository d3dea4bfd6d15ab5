//! Behavioural tests for the goplay CLI.
//!
//! These tests validate argument parsing with rstest-bdd; no program is run.

use clap::{CommandFactory, Parser};
use goplay::config::{Cli, Commands};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, scenario, then};

/// State shared across CLI test scenarios.
#[derive(Default, ScenarioState)]
struct CliState {
    /// Rendered help or version text.
    output: Slot<String>,
    /// The clap error, when parsing failed.
    error: Slot<String>,
    /// Source file selected by `run`, empty for standard input.
    file: Slot<String>,
    /// Whether `run --vet` was given.
    vet: Slot<bool>,
    /// Whether parsing succeeded.
    success: Slot<bool>,
}

#[fixture]
fn cli_state() -> CliState {
    CliState::default()
}

fn parse(cli_state: &CliState, args: &[&str]) {
    match Cli::try_parse_from(std::iter::once("goplay").chain(args.iter().copied())) {
        Ok(cli) => {
            if let Commands::Run(run) = cli.command {
                cli_state
                    .file
                    .set(run.file.map(String::from).unwrap_or_default());
                cli_state.vet.set(run.vet);
            }
            cli_state.success.set(true);
        }
        Err(e) => {
            cli_state.error.set(e.to_string());
            cli_state.success.set(false);
        }
    }
}

#[given("the CLI is invoked with --help")]
fn invoke_with_help(cli_state: &CliState) {
    let mut cmd = Cli::command();
    cli_state.output.set(cmd.render_help().to_string());
    cli_state.success.set(true);
}

#[given("the CLI is invoked with --version")]
fn invoke_with_version(cli_state: &CliState) {
    let cmd = Cli::command();
    let version = cmd.get_version().unwrap_or("unknown").to_owned();
    cli_state
        .output
        .set(format!("{} {version}", cmd.get_name()));
    cli_state.success.set(true);
}

#[given("the CLI is invoked with run")]
fn invoke_run(cli_state: &CliState) {
    parse(cli_state, &["run"]);
}

#[given("the CLI is invoked with run --vet hello.go")]
fn invoke_run_with_file(cli_state: &CliState) {
    parse(cli_state, &["run", "--vet", "hello.go"]);
}

#[given("the CLI is invoked with --substrate vm run")]
fn invoke_with_unknown_substrate(cli_state: &CliState) {
    parse(cli_state, &["--substrate", "vm", "run"]);
}

#[then("the invocation succeeds")]
fn invocation_succeeds(cli_state: &CliState) {
    assert_eq!(cli_state.success.get(), Some(true), "{:?}", cli_state.error.get());
}

#[then("the invocation fails")]
fn invocation_fails(cli_state: &CliState) {
    assert_eq!(cli_state.success.get(), Some(false));
}

#[then("the output contains {text}")]
#[expect(
    clippy::expect_used,
    reason = "test assertion - panic on missing state is intentional"
)]
fn output_contains(cli_state: &CliState, text: String) {
    let output = cli_state.output.get().expect("output should be set");
    assert!(output.contains(&text), "expected {text:?} in {output:?}");
}

#[then("the error contains {text}")]
#[expect(
    clippy::expect_used,
    reason = "test assertion - panic on missing state is intentional"
)]
fn error_contains(cli_state: &CliState, text: String) {
    let error = cli_state.error.get().expect("error should be set");
    assert!(error.contains(&text), "expected {text:?} in {error:?}");
}

#[then("no source file is selected")]
fn no_source_file(cli_state: &CliState) {
    assert_eq!(cli_state.file.get().as_deref(), Some(""));
}

#[then("the source file is {path}")]
fn source_file_is(cli_state: &CliState, path: String) {
    assert_eq!(cli_state.file.get(), Some(path));
}

#[then("vet is requested")]
fn vet_is_requested(cli_state: &CliState) {
    assert_eq!(cli_state.vet.get(), Some(true));
}

#[scenario(path = "tests/features/cli.feature", name = "Help lists the subcommands")]
fn help_lists_subcommands(cli_state: CliState) {
    let _ = cli_state;
}

#[scenario(path = "tests/features/cli.feature", name = "Version names the binary")]
fn version_names_the_binary(cli_state: CliState) {
    let _ = cli_state;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Run reads standard input when no file is given"
)]
fn run_reads_stdin_by_default(cli_state: CliState) {
    let _ = cli_state;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Run accepts a file and the vet flag"
)]
fn run_accepts_file_and_vet(cli_state: CliState) {
    let _ = cli_state;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Unknown substrates are rejected"
)]
fn unknown_substrates_are_rejected(cli_state: CliState) {
    let _ = cli_state;
}
