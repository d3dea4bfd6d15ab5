//! Command-line argument definitions for goplay.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use super::SubstrateKind;

/// Command-line interface for goplay.
#[derive(Debug, Parser)]
#[command(name = "goplay")]
#[command(
    author,
    version,
    about = "Compile, vet and run untrusted Go programs in a virtual-time sandbox"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Container image to use.
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Isolation substrate for the program.
    #[arg(long, global = true, value_enum)]
    pub substrate: Option<SubstrateKind>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile and run a Go program, printing the JSON response.
    Run(RunArgs),

    /// List the paths of the synthetic sandbox filesystem.
    FsImage,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Source file, or standard input when omitted. May use the
    /// `-- path --` multi-file convention.
    pub file: Option<Utf8PathBuf>,

    /// Also run `go vet` and report its findings.
    #[arg(long)]
    pub vet: bool,
}
