//! Unit tests for the vet driver.

use mockall::mock;
use rstest::{fixture, rstest};

use super::*;
use crate::build::{ModulePolicy, Preparation, ToolFuture, ToolOutput, prepare};
use crate::bundle::SourceBundle;
use crate::error::{FilesystemError, ToolchainError};

mock! {
    #[derive(Debug)]
    Go {}

    impl Toolchain for Go {
        fn run(&self, invocation: ToolInvocation) -> ToolFuture<'_>;
    }
}

type RuntimeFixture = std::io::Result<tokio::runtime::Runtime>;
type TestResult = Result<(), Box<dyn std::error::Error>>;

const PRINTF_PROGRAM: &str =
    "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Printf(\"hi %v\")\n}\n";

#[fixture]
fn runtime() -> RuntimeFixture {
    tokio::runtime::Runtime::new()
}

fn prepared(src: &str) -> PreparedBuild {
    match prepare(&SourceBundle::single(src), &ModulePolicy::default()) {
        Preparation::Ready(build) => build,
        Preparation::Rejected(message) => panic!("unexpected rejection: {message}"),
    }
}

fn vet_driver(go: MockGo) -> VetDriver<MockGo> {
    VetDriver::new(Arc::new(go), BuildSettings::default())
}

#[rstest]
fn clean_vet_reports_ok(runtime: RuntimeFixture) -> TestResult {
    let rt = runtime?;
    let mut go = MockGo::new();
    go.expect_run()
        .withf(|invocation| invocation.tool() == GoTool::Vet && invocation.args() == ["."])
        .times(1)
        .returning(|_| Box::pin(async { Ok(ToolOutput::new(true, "")) }));

    let result = rt.block_on(vet_driver(go).vet(&prepared(PRINTF_PROGRAM)));

    assert!(result.ok());
    assert_eq!(result.diagnostics(), "");
    Ok(())
}

#[rstest]
fn findings_are_normalized(runtime: RuntimeFixture) -> TestResult {
    let rt = runtime?;
    let mut go = MockGo::new();
    go.expect_run().returning(|invocation| {
        let text = format!(
            "# play\n{}/prog.go:6:2: fmt.Printf format %v reads arg #1, but call has 0 args\n",
            invocation.dir()
        );
        Box::pin(async move { Ok(ToolOutput::new(false, text)) })
    });

    let result = rt.block_on(vet_driver(go).vet(&prepared(PRINTF_PROGRAM)));

    assert!(!result.ok());
    assert_eq!(
        result.diagnostics(),
        "prog.go:6:2: fmt.Printf format %v reads arg #1, but call has 0 args\n"
    );
    Ok(())
}

#[rstest]
#[case::timeout(ToolchainError::TimedOut { tool: String::from("vet"), seconds: 60 })]
#[case::spawn(ToolchainError::SpawnFailed { tool: String::from("vet"), message: String::from("no such file") })]
fn unavailable_vet_degrades_to_clean(
    runtime: RuntimeFixture,
    #[case] failure: ToolchainError,
) -> TestResult {
    let rt = runtime?;
    let mut go = MockGo::new();
    let shared = std::sync::Mutex::new(Some(failure));
    go.expect_run().returning(move |_| {
        let error = shared
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .map_or_else(
                || PlayError::from(FilesystemError::NotFound { path: "/".into() }),
                PlayError::from,
            );
        Box::pin(async move { Err(error) })
    });

    let result = rt.block_on(vet_driver(go).vet(&prepared(PRINTF_PROGRAM)));

    assert_eq!(result, VetResult::clean());
    Ok(())
}

#[rstest]
fn vet_result_constructors() {
    assert!(VetResult::default().ok());
    assert!(!VetResult::new("x").ok());
}
