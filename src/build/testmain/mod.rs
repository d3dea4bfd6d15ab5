//! `go test` emulation for single-file programs.
//!
//! A program without `func main` is turned into a test binary by appending a
//! generated `main` that hands the file's tests and runnable examples to
//! `testing.Main`. The rewrite keeps every original line in place, so
//! compiler positions still point at the submitted source.

use super::RunMode;
use super::scan::{FuncDecl, ScannedFile};

const TESTING_IMPORT: &str = "testing";
const TEST_PREFIX: &str = "Test";
const EXAMPLE_PREFIX: &str = "Example";
const OUTPUT_MARKER: &str = "output:";
const UNORDERED_MARKER: &str = "unordered output:";

/// A program rewritten to run as a test binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestProgram {
    source: String,
    mode: RunMode,
}

impl TestProgram {
    /// Return the rewritten source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Return how the resulting binary must be started.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }
}

/// An example function whose output is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnableExample<'a> {
    name: &'a str,
    output: String,
    unordered: bool,
}

impl RunnableExample<'_> {
    /// Return the function name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Return the expected output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Return whether output lines may appear in any order.
    #[must_use]
    pub const fn unordered(&self) -> bool {
        self.unordered
    }
}

/// Rewrite `src` into a test program, or return `None` when it must be run
/// as an ordinary program.
///
/// A file with a plain `func main` runs normally. So does a file with test
/// functions but no unaliased `"testing"` import: the compiler then reports
/// the missing import, which is the most useful diagnostic. Any other file
/// becomes a test binary, even one with nothing to run.
#[must_use]
pub fn synthesize(src: &str, file: &ScannedFile) -> Option<TestProgram> {
    if file.has_main() {
        return None;
    }

    let tests = test_names(file);
    let imports_testing = file.imports_unaliased(TESTING_IMPORT);
    if !tests.is_empty() && !imports_testing {
        return None;
    }

    let examples: Vec<&FuncDecl> = file
        .funcs()
        .iter()
        .filter(|func| is_example(func))
        .collect();
    let runnable: Vec<RunnableExample<'_>> = examples
        .iter()
        .filter_map(|func| runnable_example(func))
        .collect();

    let mode = if tests.is_empty() && !examples.is_empty() {
        RunMode::Example
    } else {
        RunMode::Test
    };

    let mut source = String::with_capacity(src.len() + 512);
    if imports_testing {
        source.push_str(src);
    } else {
        let offset = file.import_insertion_offset();
        let (head, tail) = src.split_at_checked(offset).unwrap_or((src, ""));
        source.push_str(head);
        source.push_str(";import \"testing\";");
        source.push_str(tail);
    }
    source.push_str(&render_main(&tests, &runnable));

    Some(TestProgram { source, mode })
}

/// Return whether `name` is `prefix` followed by nothing or by a rune that
/// is not lower case, so `Testify` is not a test but `Test_x` is.
#[must_use]
pub fn has_test_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_lowercase()))
}

fn test_names(file: &ScannedFile) -> Vec<&str> {
    file.funcs()
        .iter()
        .filter(|func| !func.is_method() && has_test_prefix(func.name(), TEST_PREFIX))
        .map(FuncDecl::name)
        .collect()
}

fn is_example(func: &FuncDecl) -> bool {
    !func.is_method()
        && !func.has_params()
        && !func.has_results()
        && has_test_prefix(func.name(), EXAMPLE_PREFIX)
}

fn runnable_example(func: &FuncDecl) -> Option<RunnableExample<'_>> {
    let (output, unordered) = example_output(func.last_comment()?)?;
    Some(RunnableExample {
        name: func.name(),
        output,
        unordered,
    })
}

/// Extract the expected output from an example's last comment group.
///
/// The marker is matched case-insensitively after leading whitespace. Spaces
/// after the marker and one following newline are dropped.
#[must_use]
pub fn example_output(comment: &str) -> Option<(String, bool)> {
    let text = comment.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let lowered = text.to_ascii_lowercase();
    let (unordered, marker_len) = if lowered.starts_with(UNORDERED_MARKER) {
        (true, UNORDERED_MARKER.len())
    } else if lowered.starts_with(OUTPUT_MARKER) {
        (false, OUTPUT_MARKER.len())
    } else {
        return None;
    };

    let after_marker = text.get(marker_len..)?.trim_start_matches(' ');
    let output = after_marker.strip_prefix('\n').unwrap_or(after_marker);
    Some((String::from(output), unordered))
}

fn render_main(tests: &[&str], examples: &[RunnableExample<'_>]) -> String {
    let mut main = String::from(
        "\nfunc main() {\n\tmatchAll := func(t string, pat string) (bool, error) { return true, nil }\n\ttests := []testing.InternalTest{\n",
    );
    for name in tests {
        main.push_str(&format!("\t\t{{\"{name}\", {name}}},\n"));
    }
    main.push_str("\t}\n\texamples := []testing.InternalExample{\n");
    for example in examples {
        main.push_str(&format!(
            "\t\t{{\"{name}\", {name}, {output}, {unordered}}},\n",
            name = example.name,
            output = go_quote(&example.output),
            unordered = example.unordered,
        ));
    }
    main.push_str("\t}\n\ttesting.Main(matchAll, tests, nil, examples)\n}\n");
    main
}

/// Quote `text` as a Go interpreted string literal.
#[must_use]
pub fn go_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\u{7}' => quoted.push_str("\\a"),
            '\u{8}' => quoted.push_str("\\b"),
            '\u{c}' => quoted.push_str("\\f"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{b}' => quoted.push_str("\\v"),
            c if c.is_control() => {
                let code = u32::from(c);
                if code < 0x80 {
                    quoted.push_str(&format!("\\x{code:02x}"));
                } else {
                    quoted.push_str(&format!("\\u{code:04x}"));
                }
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
