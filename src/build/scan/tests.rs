//! Unit tests for the Go source scanner.

use rstest::rstest;

use super::*;

fn scanned(src: &str) -> ScannedFile {
    scan(src).expect("source should scan")
}

fn func<'a>(file: &'a ScannedFile, name: &str) -> &'a FuncDecl {
    file.funcs()
        .iter()
        .find(|func| func.name() == name)
        .expect("function should be declared")
}

#[rstest]
#[case("package main\n", Some("main"))]
#[case("// Copyright\n\n/* doc */ package test\n", Some("test"))]
#[case("package main//comment\n", Some("main"))]
#[case("package main; func main() {}", Some("main"))]
#[case("func main() {}\n", None)]
#[case("package\n", None)]
#[case("", None)]
fn package_clause_is_found_without_scanning_the_body(
    #[case] src: &str,
    #[case] expected: Option<&str>,
) {
    let clause = package_clause(src);
    assert_eq!(clause.as_ref().map(PackageClause::name), expected);
}

#[rstest]
fn package_clause_ignores_broken_code_after_it() {
    let clause = package_clause("package test\n\nfunc main() { \"unterminated\n");
    assert_eq!(clause.map(|clause| String::from(clause.name())), Some(String::from("test")));
}

#[rstest]
fn imports_are_collected_from_every_form() {
    let file = scanned(
        "package main\n\nimport \"fmt\"\nimport (\n\tt \"testing\"\n\t. \"strings\"\n\t_ \"embed\"; \"os\"\n)\n\nfunc main() {}\n",
    );

    let specs: Vec<(Option<&str>, &str)> = file
        .imports()
        .iter()
        .map(|spec| (spec.name(), spec.path()))
        .collect();
    assert_eq!(
        specs,
        vec![
            (None, "fmt"),
            (Some("t"), "testing"),
            (Some("."), "strings"),
            (Some("_"), "embed"),
            (None, "os"),
        ]
    );
    assert!(!file.imports_unaliased("testing"));
    assert!(file.imports_unaliased("os"));
}

#[rstest]
#[case("package main\n\nfunc ExampleX() {}\n", "package main".len())]
#[case(
    "package main\n\nimport \"fmt\"\n\nfunc ExampleX() {}\n",
    "package main\n\nimport \"fmt\"".len()
)]
#[case(
    "package main\nimport (\n\t\"fmt\"\n)\nfunc ExampleX() {}\n",
    "package main\nimport (\n\t\"fmt\"\n)".len()
)]
fn import_insertion_follows_the_last_import(#[case] src: &str, #[case] offset: usize) {
    assert_eq!(scanned(src).import_insertion_offset(), offset);
}

#[rstest]
fn main_is_detected_but_main_methods_are_not() {
    let with_main = scanned("package main\n\nfunc main() {\n}\n");
    let with_method = scanned("package main\n\ntype T struct{}\n\nfunc (T) main() {}\n");

    assert!(with_main.has_main());
    assert!(!with_method.has_main());
    assert!(func(&with_method, "main").is_method());
}

#[rstest]
fn function_literals_are_not_declarations() {
    let file = scanned(
        "package main\n\nvar main = func() {}\n\nvar f = map[string]func(){\n\t\"x\": func() {},\n}\n",
    );
    assert!(file.funcs().is_empty());
}

#[rstest]
fn nested_functions_are_not_top_level() {
    let file = scanned(
        "package main\n\nfunc outer() {\n\tinner := func() {}\n\tinner()\n}\n\nfunc after() {}\n",
    );
    let names: Vec<&str> = file.funcs().iter().map(FuncDecl::name).collect();
    assert_eq!(names, vec!["outer", "after"]);
}

#[rstest]
fn signatures_record_params_and_results() {
    let file = scanned(
        "package main\n\nfunc A() {}\nfunc B(x int) {}\nfunc C() (int, error) { return 0, nil }\nfunc D[T any]() T { var t T; return t }\nfunc E() struct{} { return struct{}{} }\n",
    );

    assert!(!func(&file, "A").has_params());
    assert!(!func(&file, "A").has_results());
    assert!(func(&file, "B").has_params());
    assert!(func(&file, "C").has_results());
    assert!(func(&file, "D").has_results());
    assert!(func(&file, "E").has_results());
}

#[rstest]
fn braces_inside_literals_and_comments_do_not_confuse_bodies() {
    let file = scanned(
        "package main\n\nfunc a() {\n\ts := \"}\" + `{` + string('}')\n\t// }\n\t/* { */\n\t_ = s\n}\n\nfunc b() {}\n",
    );
    let names: Vec<&str> = file.funcs().iter().map(FuncDecl::name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[rstest]
fn last_comment_group_is_rendered_as_comment_text() {
    let file = scanned(
        "package main\n\nfunc ExampleX() {\n\t// first group\n\n\tprintln(1)\n\t// Output:   1\n\t// 2\n}\n",
    );
    assert_eq!(func(&file, "ExampleX").last_comment(), Some("Output:   1\n2\n"));
}

#[rstest]
fn block_comments_keep_inner_lines() {
    let file = scanned("package main\n\nfunc ExampleY() {\n\t/* Output:\n\tdone\n\t*/\n}\n");
    assert_eq!(func(&file, "ExampleY").last_comment(), Some(" Output:\n\tdone\n"));
}

#[rstest]
fn directives_are_dropped_from_comment_text() {
    let file = scanned("package main\n\nfunc F() {\n\t//go:noinline\n\t// Output: x\n}\n");
    assert_eq!(func(&file, "F").last_comment(), Some("Output: x\n"));
}

#[rstest]
fn bodies_without_comments_have_none() {
    let file = scanned("package main\n\nfunc F() { println() }\n");
    assert_eq!(func(&file, "F").last_comment(), None);
}

#[rstest]
#[case("package main\n\nvar s = \"open\n", "string")]
#[case("package main\n\n/* never closed", "comment")]
#[case("package main\n\nvar s = `raw", "raw string")]
fn unterminated_literals_fail(#[case] src: &str, #[case] what: &str) {
    match scan(src) {
        Err(ScanError::Unterminated { what: found, .. }) => assert_eq!(found, what),
        other => panic!("expected unterminated {what}, got {other:?}"),
    }
}

#[rstest]
fn missing_package_clause_fails() {
    assert_eq!(scan("func main() {}\n"), Err(ScanError::MissingPackageClause));
}

#[rstest]
fn unbalanced_body_fails() {
    assert!(matches!(
        scan("package main\n\nfunc main() {\n"),
        Err(ScanError::Malformed { .. })
    ));
}
