//! Behavioural tests for the compile-and-run pipeline.

mod bdd_playground_helpers;

use bdd_playground_helpers::{PlaygroundState, playground_state};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/playground.feature",
    name = "Standard output is returned as events"
)]
fn standard_output_is_returned(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "A failing exit status is appended to the output"
)]
fn failing_exit_status_is_appended(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Test functions run in test mode"
)]
fn test_functions_run_in_test_mode(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Programs without main or tests run an empty test suite"
)]
fn programs_without_entry_points_run_empty_suite(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Compile errors stop the run"
)]
fn compile_errors_stop_the_run(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Vet findings accompany the output"
)]
fn vet_findings_accompany_output(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Clean vet reports ok"
)]
fn clean_vet_reports_ok(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Library packages are rejected"
)]
fn library_packages_are_rejected(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Empty programs are rejected"
)]
fn empty_programs_are_rejected(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Runaway programs time out"
)]
fn runaway_programs_time_out(playground_state: PlaygroundState) {
    let _ = playground_state;
}

#[scenario(
    path = "tests/features/playground.feature",
    name = "Output floods are cut off"
)]
fn output_floods_are_cut_off(playground_state: PlaygroundState) {
    let _ = playground_state;
}
