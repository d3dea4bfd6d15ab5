//! Request orchestration.
//!
//! [`Engine::compile_and_run`] takes one submitted program through the whole
//! pipeline: bundle parsing, compilation (with `go vet` alongside when asked
//! for), sandboxed execution and classification into a [`Response`].
//!
//! Problems with the submitted program are part of a successful response.
//! Only fatal run outcomes ([`ExecutionError`](crate::error::ExecutionError))
//! and infrastructure failures come back as `Err`.

pub mod classify;

use std::future::Future;
use std::sync::Arc;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::build::{BuildDriver, BuildSettings, CompileResult, Preparation, Toolchain, prepare};
use crate::bundle::SourceBundle;
use crate::clock::VirtualClock;
use crate::error::{FilesystemError, PlayError, Result as PlayResult};
use crate::events::Event;
use crate::sandbox::{Harness, RunLimits, Substrate};
use crate::vet::{VetDriver, VetResult};

const API_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::api");

/// Diagnostic returned for a body with no source text.
pub const EMPTY_PROGRAM: &str = "empty program";

/// One program submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    /// Program text, optionally split into files with `-- path --` lines.
    pub body: String,
    /// Also run `go vet` and report its findings.
    #[serde(default)]
    pub with_vet: bool,
}

impl Request {
    /// Create a request for `body`.
    #[must_use]
    pub fn new(body: impl Into<String>, with_vet: bool) -> Self {
        Self {
            body: body.into(),
            with_vet,
        }
    }

    /// Create a request whose body is the contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when the file or its directory cannot be
    /// read.
    pub fn from_file(path: &Utf8Path, with_vet: bool) -> PlayResult<Self> {
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().unwrap_or(path.as_str());
        let to_error =
            |error: std::io::Error| PlayError::from(FilesystemError::from_io(path.as_std_path(), &error));

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(to_error)?;
        let body = dir.read_to_string(file_name).map_err(to_error)?;
        Ok(Self::new(body, with_vet))
    }
}

/// Outcome of one submission.
///
/// Serializes with the playground wire names: `Errors`, `VetErrors`, `VetOK`
/// and `Events`. The vet fields are omitted when vet was not run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Errors")]
    errors: String,
    #[serde(rename = "VetErrors", default, skip_serializing_if = "Option::is_none")]
    vet_errors: Option<String>,
    #[serde(rename = "VetOK", default, skip_serializing_if = "Option::is_none")]
    vet_ok: Option<bool>,
    #[serde(rename = "Events", default)]
    events: Vec<Event>,
}

impl Response {
    /// A response carrying validation or compile diagnostics and no events.
    #[must_use]
    pub fn failed(errors: impl Into<String>) -> Self {
        Self {
            errors: errors.into(),
            ..Self::default()
        }
    }

    /// A response for a program that ran to completion.
    #[must_use]
    pub fn completed(events: Vec<Event>, vet: Option<VetResult>) -> Self {
        let (vet_errors, vet_ok) = vet.map_or((None, None), |result| {
            (Some(String::from(result.diagnostics())), Some(result.ok()))
        });
        Self {
            errors: String::new(),
            vet_errors,
            vet_ok,
            events,
        }
    }

    /// Validation or compile diagnostics; empty when the program built.
    #[must_use]
    pub fn errors(&self) -> &str {
        &self.errors
    }

    /// `go vet` findings, when vet ran.
    #[must_use]
    pub fn vet_errors(&self) -> Option<&str> {
        self.vet_errors.as_deref()
    }

    /// Whether vet found nothing, when vet ran.
    #[must_use]
    pub const fn vet_ok(&self) -> Option<bool> {
        self.vet_ok
    }

    /// Program output in playback order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

/// Compiles, vets and runs submitted programs.
pub struct Engine<T: Toolchain, S: Substrate> {
    builder: BuildDriver<T>,
    vetter: VetDriver<T>,
    substrate: S,
    limits: RunLimits,
}

impl<T: Toolchain, S: Substrate> std::fmt::Debug for Engine<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", self.builder.settings())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<T: Toolchain, S: Substrate> Engine<T, S> {
    /// Create an engine that builds with `toolchain` under `settings` and runs
    /// programs on `substrate` under `limits`.
    #[must_use]
    pub fn new(toolchain: Arc<T>, settings: BuildSettings, substrate: S, limits: RunLimits) -> Self {
        Self {
            builder: BuildDriver::new(Arc::clone(&toolchain), settings.clone()),
            vetter: VetDriver::new(toolchain, settings),
            substrate,
            limits,
        }
    }

    /// Return the limits applied to each run.
    #[must_use]
    pub const fn limits(&self) -> &RunLimits {
        &self.limits
    }

    /// Compile and run `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`](crate::error::ExecutionError) when the
    /// program times out or exceeds the output limit, and a toolchain,
    /// container, substrate or filesystem error when the engine itself cannot
    /// do its job.
    pub async fn compile_and_run(&self, request: &Request) -> PlayResult<Response> {
        self.compile_and_run_until(request, std::future::pending::<String>())
            .await
    }

    /// Compile and run `request`, killing the program if `cancel` resolves
    /// first. The string `cancel` yields is reported as the kill reason.
    ///
    /// # Errors
    ///
    /// See [`Self::compile_and_run`]. Cancellation is reported as
    /// `ExecutionError::Killed`.
    pub async fn compile_and_run_until<C>(
        &self,
        request: &Request,
        cancel: C,
    ) -> PlayResult<Response>
    where
        C: Future<Output = String> + Send,
    {
        let result = self.pipeline(request, cancel).await;
        if let Err(failure) = &result
            && failure.is_infrastructure()
        {
            error!(target: API_TARGET, error = %failure, "request failed");
        }
        result
    }

    async fn pipeline<C>(&self, request: &Request, cancel: C) -> PlayResult<Response>
    where
        C: Future<Output = String> + Send,
    {
        if request.body.trim().is_empty() {
            return Ok(Response::failed(EMPTY_PROGRAM));
        }

        let bundle = SourceBundle::parse(&request.body);
        let prepared = match prepare(&bundle, &self.builder.settings().modules) {
            Preparation::Rejected(diagnostics) => return Ok(Response::failed(diagnostics)),
            Preparation::Ready(prepared) => prepared,
        };

        let vet = async {
            if request.with_vet {
                Some(self.vetter.vet(&prepared).await)
            } else {
                None
            }
        };
        let (compiled, vet_result) = tokio::join!(self.builder.build(&prepared), vet);

        let artifact = match compiled? {
            CompileResult::Failure(diagnostics) => {
                debug!(target: API_TARGET, "compilation failed");
                return Ok(Response::failed(diagnostics));
            }
            CompileResult::Success(artifact) => artifact,
        };

        let harness = Harness::new(self.limits, VirtualClock::playground());
        let report = harness
            .execute_until(&self.substrate, &artifact, cancel)
            .await?;
        classify::classify_run(report, vet_result, &self.limits)
    }
}
