//! Assertion steps for compile-and-run scenarios.

use goplay::api::Response;
use goplay::events::EventKind;
use rstest_bdd_macros::then;

use super::StepResult;
use super::state::{PlayOutcome, PlaygroundState};

fn response(playground_state: &PlaygroundState) -> StepResult<Response> {
    match playground_state.outcome.get() {
        Some(PlayOutcome::Response(response)) => Ok(response),
        Some(PlayOutcome::Failed(message)) => Err(format!("expected a response, got error: {message}")),
        None => Err(String::from("outcome should be set")),
    }
}

fn failure(playground_state: &PlaygroundState) -> StepResult<String> {
    match playground_state.outcome.get() {
        Some(PlayOutcome::Failed(message)) => Ok(message),
        Some(PlayOutcome::Response(response)) => {
            Err(format!("expected a failed run, got response: {response:?}"))
        }
        None => Err(String::from("outcome should be set")),
    }
}

fn combined_output(response: &Response) -> String {
    response
        .events()
        .iter()
        .map(|event| event.message.as_str())
        .collect()
}

#[then("the response has no errors")]
fn response_has_no_errors(playground_state: &PlaygroundState) -> StepResult<()> {
    let response = response(playground_state)?;
    if response.errors().is_empty() {
        Ok(())
    } else {
        Err(format!("unexpected errors: {}", response.errors()))
    }
}

#[then("the response errors contain {text}")]
fn response_errors_contain(playground_state: &PlaygroundState, text: String) -> StepResult<()> {
    let response = response(playground_state)?;
    if response.errors().contains(&text) {
        Ok(())
    } else {
        Err(format!("expected errors to contain {text:?}, got {:?}", response.errors()))
    }
}

#[then("stdout shows {text}")]
fn stdout_shows(playground_state: &PlaygroundState, text: String) -> StepResult<()> {
    let response = response(playground_state)?;
    let stdout: String = response
        .events()
        .iter()
        .filter(|event| event.kind == EventKind::Stdout)
        .map(|event| event.message.as_str())
        .collect();
    let expected = format!("{text}\n");
    if stdout == expected {
        Ok(())
    } else {
        Err(format!("expected stdout {expected:?}, got {stdout:?}"))
    }
}

#[then("the combined output starts with {text}")]
fn combined_output_starts_with(playground_state: &PlaygroundState, text: String) -> StepResult<()> {
    let output = combined_output(&response(playground_state)?);
    if output.starts_with(&text) {
        Ok(())
    } else {
        Err(format!("expected output to start with {text:?}, got {output:?}"))
    }
}

#[then("the combined output ends with exit status {code}")]
fn combined_output_ends_with_status(playground_state: &PlaygroundState, code: i64) -> StepResult<()> {
    let output = combined_output(&response(playground_state)?);
    let trailer = format!("\nexit status {code}\n");
    if output.ends_with(&trailer) {
        Ok(())
    } else {
        Err(format!("expected output to end with {trailer:?}, got {output:?}"))
    }
}

#[then("no events are returned")]
fn no_events_are_returned(playground_state: &PlaygroundState) -> StepResult<()> {
    let response = response(playground_state)?;
    if response.events().is_empty() {
        Ok(())
    } else {
        Err(format!("expected no events, got {:?}", response.events()))
    }
}

#[then("vet was not reported")]
fn vet_was_not_reported(playground_state: &PlaygroundState) -> StepResult<()> {
    let response = response(playground_state)?;
    match (response.vet_ok(), response.vet_errors()) {
        (None, None) => Ok(()),
        (ok, errors) => Err(format!("expected no vet fields, got {ok:?} / {errors:?}")),
    }
}

#[then("vet errors contain {text}")]
fn vet_errors_contain(playground_state: &PlaygroundState, text: String) -> StepResult<()> {
    let response = response(playground_state)?;
    if response.vet_ok() != Some(false) {
        return Err(format!("expected vet to fail, got {:?}", response.vet_ok()));
    }
    match response.vet_errors() {
        Some(errors) if errors.contains(&text) => Ok(()),
        other => Err(format!("expected vet errors to contain {text:?}, got {other:?}")),
    }
}

#[then("vet passes")]
fn vet_passes(playground_state: &PlaygroundState) -> StepResult<()> {
    let response = response(playground_state)?;
    if response.vet_ok() == Some(true) && response.vet_errors() == Some("") {
        Ok(())
    } else {
        Err(format!(
            "expected a clean vet, got {:?} / {:?}",
            response.vet_ok(),
            response.vet_errors()
        ))
    }
}

#[then("the run fails with {message}")]
fn run_fails_with(playground_state: &PlaygroundState, message: String) -> StepResult<()> {
    let actual = failure(playground_state)?;
    if actual == message {
        Ok(())
    } else {
        Err(format!("expected error {message:?}, got {actual:?}"))
    }
}

#[then("the run fails mentioning {text}")]
fn run_fails_mentioning(playground_state: &PlaygroundState, text: String) -> StepResult<()> {
    let actual = failure(playground_state)?;
    if actual.contains(&text) {
        Ok(())
    } else {
        Err(format!("expected error mentioning {text:?}, got {actual:?}"))
    }
}

#[then("the built program drives an empty test suite")]
fn built_program_drives_empty_suite(playground_state: &PlaygroundState) -> StepResult<()> {
    let source = playground_state
        .built_program
        .get()
        .ok_or_else(|| String::from("the toolchain should have been asked to build"))?;
    let expected = [
        "tests := []testing.InternalTest{\n\t}",
        "testing.Main(matchAll, tests, nil, examples)",
    ];
    match expected.iter().find(|needle| !source.contains(**needle)) {
        None => Ok(()),
        Some(missing) => Err(format!("expected {missing:?} in built program:\n{source}")),
    }
}
