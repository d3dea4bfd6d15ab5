//! Scenario state for compile-and-run behavioural tests.

use goplay::api::Response;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Minimal program accepted by bundle preparation.
pub(crate) const MAIN_PROGRAM: &str =
    "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n";

/// Outcome of one submission.
#[derive(Debug, Clone)]
pub(crate) enum PlayOutcome {
    /// The pipeline produced a response.
    Response(Response),
    /// The run failed fatally; holds the rendered error.
    Failed(String),
}

#[derive(Default, ScenarioState)]
pub(crate) struct PlaygroundState {
    /// Submitted Go source.
    pub(crate) source: Slot<String>,
    /// Shell script the stand-in toolchain emits as the executable.
    pub(crate) script: Slot<String>,
    /// Diagnostics the stand-in `go build` reports instead of succeeding.
    pub(crate) build_error: Slot<String>,
    /// Findings the stand-in `go vet` reports.
    pub(crate) vet_findings: Slot<String>,
    pub(crate) with_vet: Slot<bool>,
    pub(crate) wall_time_ms: Slot<u64>,
    pub(crate) max_output_bytes: Slot<u64>,
    pub(crate) outcome: Slot<PlayOutcome>,
    /// `prog.go` as the stand-in `go build` received it.
    pub(crate) built_program: Slot<String>,
}

#[fixture]
pub(crate) fn playground_state() -> PlaygroundState {
    let state = PlaygroundState::default();
    state.source.set(String::from(MAIN_PROGRAM));
    state.script.set(String::from("exit 0"));
    state.with_vet.set(false);
    state.wall_time_ms.set(5_000);
    state.max_output_bytes.set(64 * 1024);
    state
}
