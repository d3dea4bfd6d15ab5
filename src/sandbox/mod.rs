//! Isolation substrates and the execution harness.
//!
//! A [`Substrate`] starts a compiled [`Artifact`] somewhere it cannot harm the
//! host and hands back a [`RunningProgram`]: an interleaved stream of stdout
//! and stderr chunks plus a [`ProgramControl`] handle. The [`Harness`] owns the
//! wall-clock deadline, the output limit and event assembly; substrates only
//! start, stop and clean up.
//!
//! Two substrates are provided:
//!
//! - [`ProcessSubstrate`] runs the binary as a local child process. It applies
//!   no containment and exists for development and tests.
//! - [`ContainerSubstrate`] runs the binary in a locked-down container through
//!   the Docker or Podman API.

pub mod container;
pub mod fsimage;
mod harness;
mod process;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;

use crate::build::Artifact;
use crate::config::SandboxConfig;
use crate::error::PlayError;
use crate::events::EventKind;

pub use container::{ContainerLimits, ContainerSubstrate};
pub use harness::{Harness, KillReason, RunReport, RunState};
pub use process::ProcessSubstrate;

const SANDBOX_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sandbox");

/// Boxed stream of output chunks from a running program.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<OutputChunk, PlayError>> + Send>>;

/// Boxed future returned by [`Substrate::launch`].
pub type LaunchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RunningProgram, PlayError>> + Send + 'a>>;

/// Boxed future returned by [`ProgramControl`] operations.
pub type ControlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlayError>> + Send + 'a>>;

/// Limits applied to one sandboxed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Wall-clock budget for the whole run.
    pub wall_time: Duration,
    /// Maximum combined stdout and stderr bytes.
    pub max_output_bytes: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            wall_time: Duration::from_secs(10),
            max_output_bytes: 100 * 1024 * 1024,
        }
    }
}

impl RunLimits {
    /// Build limits from the `[sandbox]` section.
    #[must_use]
    pub const fn from_sandbox_config(sandbox: &SandboxConfig) -> Self {
        Self {
            wall_time: Duration::from_millis(sandbox.run_timeout_ms),
            max_output_bytes: sandbox.max_output_bytes,
        }
    }
}

/// Bytes read from one of the program's output streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Stream the bytes were written to.
    pub kind: EventKind,
    /// Raw bytes, playback headers included.
    pub bytes: Vec<u8>,
}

impl OutputChunk {
    /// Create a chunk.
    #[must_use]
    pub fn new(kind: EventKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }
}

/// Control over a program started by a [`Substrate`].
pub trait ProgramControl: Send {
    /// Stop the program immediately.
    fn kill(&mut self) -> ControlFuture<'_, ()>;

    /// Wait for the program to exit and return its exit code.
    fn wait(&mut self) -> ControlFuture<'_, i64>;

    /// Release every resource the run holds. Called once, on every path.
    fn release(&mut self) -> ControlFuture<'_, ()>;
}

/// A launched program.
pub struct RunningProgram {
    /// Interleaved stdout and stderr chunks, ending when both streams close.
    pub output: OutputStream,
    /// Lifecycle handle.
    pub control: Box<dyn ProgramControl>,
}

impl std::fmt::Debug for RunningProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningProgram").finish_non_exhaustive()
    }
}

/// Behaviour required to run an artifact in isolation.
pub trait Substrate: Send + Sync {
    /// Start `artifact` and return its output stream and control handle.
    fn launch<'a>(&'a self, artifact: &'a Artifact, limits: &'a RunLimits) -> LaunchFuture<'a>;
}

impl<S: Substrate + ?Sized> Substrate for std::sync::Arc<S> {
    fn launch<'a>(&'a self, artifact: &'a Artifact, limits: &'a RunLimits) -> LaunchFuture<'a> {
        (**self).launch(artifact, limits)
    }
}

impl<S: Substrate + ?Sized> Substrate for Box<S> {
    fn launch<'a>(&'a self, artifact: &'a Artifact, limits: &'a RunLimits) -> LaunchFuture<'a> {
        (**self).launch(artifact, limits)
    }
}
