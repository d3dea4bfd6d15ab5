//! Given/when steps for compile-and-run scenarios.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8Path;
use goplay::api::{Engine, Request};
use goplay::build::{
    BuildSettings, GoTool, OUTPUT_BINARY, ToolFuture, ToolInvocation, ToolOutput, Toolchain,
};
use goplay::error::{FilesystemError, PlayError};
use goplay::sandbox::{ProcessSubstrate, RunLimits};
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::{PlayOutcome, PlaygroundState};

const TEST_PROGRAM: &str = "package main\n\nimport \"testing\"\n\nfunc TestAnswer(t *testing.T) {\n\tif 6*7 != 42 {\n\t\tt.Fatal(\"arithmetic is broken\")\n\t}\n}\n";

/// Stand-in for `go`: `build` drops a shell script where the executable
/// belongs, `vet` replays canned findings.
struct ScriptedGo {
    script: String,
    build_error: Option<String>,
    vet_findings: Option<String>,
    built_program: Arc<Mutex<Option<String>>>,
}

impl ScriptedGo {
    fn build(&self, dir: &Utf8Path) -> Result<ToolOutput, PlayError> {
        if let Some(diagnostics) = &self.build_error {
            return Ok(ToolOutput::new(false, diagnostics.as_str()));
        }
        let program = dir.join("prog.go");
        let source = std::fs::read_to_string(&program)
            .map_err(|error| FilesystemError::from_io(program.as_std_path(), &error))?;
        if let Ok(mut slot) = self.built_program.lock() {
            *slot = Some(source);
        }
        let binary = dir.join(OUTPUT_BINARY);
        std::fs::write(&binary, format!("#!/bin/sh\n{}\n", self.script))
            .map_err(|error| FilesystemError::from_io(binary.as_std_path(), &error))?;
        Ok(ToolOutput::new(true, ""))
    }

    fn vet(&self) -> ToolOutput {
        self.vet_findings.as_ref().map_or_else(
            || ToolOutput::new(true, ""),
            |findings| ToolOutput::new(false, findings.as_str()),
        )
    }
}

impl Toolchain for ScriptedGo {
    fn run(&self, invocation: ToolInvocation) -> ToolFuture<'_> {
        Box::pin(async move {
            match invocation.tool() {
                GoTool::Build => self.build(invocation.dir()),
                GoTool::Vet => Ok(self.vet()),
            }
        })
    }
}

#[given("a program that prints {text}")]
fn given_program_prints(playground_state: &PlaygroundState, text: String) {
    playground_state
        .script
        .set(format!("printf '%s\\n' '{text}'"));
}

#[given("a program that writes {text} to stderr and exits with status {code}")]
fn given_program_fails(playground_state: &PlaygroundState, text: String, code: i64) {
    playground_state
        .script
        .set(format!("echo '{text}' >&2\nexit {code}"));
}

#[given("a program with a test function")]
fn given_test_program(playground_state: &PlaygroundState) {
    playground_state.source.set(String::from(TEST_PROGRAM));
    playground_state.script.set(String::from("echo \"$*\""));
}

#[given("a program with neither main nor tests")]
fn given_program_without_entry_points(playground_state: &PlaygroundState) {
    playground_state
        .source
        .set(String::from("package main\n\nfunc helper() int { return 1 }\n"));
    playground_state.script.set(String::from("echo \"$*\""));
}

#[given("a program that fails to compile")]
fn given_compile_failure(playground_state: &PlaygroundState) {
    playground_state
        .build_error
        .set(String::from("./prog.go:6:14: undefined: greeting\n"));
}

#[given("a library package")]
fn given_library_package(playground_state: &PlaygroundState) {
    playground_state
        .source
        .set(String::from("package lib\n\nfunc Helper() int { return 1 }\n"));
}

#[given("an empty program")]
fn given_empty_program(playground_state: &PlaygroundState) {
    playground_state.source.set(String::new());
}

#[given("a program that never exits")]
fn given_hung_program(playground_state: &PlaygroundState) {
    playground_state.script.set(String::from("exec sleep 30"));
    playground_state.wall_time_ms.set(200);
}

#[given("a program that floods its output")]
fn given_flooding_program(playground_state: &PlaygroundState) {
    playground_state.script.set(String::from("exec yes goplay"));
    playground_state.max_output_bytes.set(1024);
}

#[given("vet is enabled")]
fn given_vet_enabled(playground_state: &PlaygroundState) {
    playground_state.with_vet.set(true);
}

#[given("vet reports {finding}")]
fn given_vet_findings(playground_state: &PlaygroundState, finding: String) {
    playground_state.vet_findings.set(format!("{finding}\n"));
}

#[when("the program is compiled and run")]
fn when_compiled_and_run(playground_state: &PlaygroundState) -> StepResult<()> {
    let built_program = Arc::new(Mutex::new(None));
    let go = ScriptedGo {
        script: playground_state
            .script
            .get()
            .ok_or_else(|| String::from("script should be configured"))?,
        build_error: playground_state.build_error.get(),
        vet_findings: playground_state.vet_findings.get(),
        built_program: Arc::clone(&built_program),
    };
    let limits = RunLimits {
        wall_time: Duration::from_millis(playground_state.wall_time_ms.get().unwrap_or(5_000)),
        max_output_bytes: playground_state.max_output_bytes.get().unwrap_or(64 * 1024),
    };
    let engine = Engine::new(
        Arc::new(go),
        BuildSettings::default(),
        ProcessSubstrate::default(),
        limits,
    );
    let request = Request::new(
        playground_state.source.get().unwrap_or_default(),
        playground_state.with_vet.get().unwrap_or(false),
    );

    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    let outcome = match runtime.block_on(engine.compile_and_run(&request)) {
        Ok(response) => PlayOutcome::Response(response),
        Err(error) => PlayOutcome::Failed(error.to_string()),
    };
    playground_state.outcome.set(outcome);
    let built = built_program
        .lock()
        .map_err(|_| String::from("built program lock poisoned"))?
        .take();
    if let Some(source) = built {
        playground_state.built_program.set(source);
    }
    Ok(())
}
