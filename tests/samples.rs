use std::env;
use std::path::PathBuf;

use minibrew::classpath::ClassPathLoader;
use minibrew::{ClassPath, Runtime, RuntimeError, RuntimeErrorKind, RuntimeOptions};

fn support() -> PathBuf {
    let env_var = env::var("CARGO_MANIFEST_DIR").unwrap();
    PathBuf::from(env_var).join("support")
}

fn sample_runtime(main_class: &str) -> Runtime<Vec<u8>> {
    let loader = ClassPathLoader::new(ClassPath::new(vec![support()]));
    Runtime::with_loader(loader, main_class, Vec::new())
}

fn run(main_class: &str) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut runtime = sample_runtime(main_class);
    runtime.start().unwrap();
    String::from_utf8(runtime.into_output()).unwrap()
}

fn run_err(main_class: &str) -> RuntimeError {
    let _ = env_logger::builder().is_test(true).try_init();
    sample_runtime(main_class).start().unwrap_err()
}

#[test]
fn nested_static_calls() {
    assert_eq!(run("samples.SimpleClass"), "42\n");
}

#[test]
fn internal_main_class_name() {
    assert_eq!(run("samples/SimpleClass"), "42\n");
}

#[test]
fn conditional_branch() {
    assert_eq!(run("samples.BranchClass"), "200\n");
}

#[test]
fn recursion() {
    assert_eq!(run("samples.RecursiveClass"), "120\n");
}

#[test]
fn loops_and_locals() {
    assert_eq!(run("samples.LoopClass"), "55\n-55\n");
}

#[test]
fn division_truncates_toward_zero() {
    assert_eq!(run("samples.RemainderClass"), "-1\n-3\n1\n");
}

#[test]
fn division_by_zero() {
    let err = run_err("samples.DivideByZero");
    assert_eq!(err.kind(), RuntimeErrorKind::Arithmetic);
}

#[test]
fn missing_dependency() {
    let err = run_err("samples.MissingDependency");
    assert!(matches!(err, RuntimeError::ClassNotFound(ref name) if name == "samples.Absent"));
}

#[test]
fn missing_main_class() {
    let err = run_err("samples.Nowhere");
    assert_eq!(err.kind(), RuntimeErrorKind::Resolution);
    assert_eq!(err.to_string(), "class not found: samples.Nowhere");
}

#[test]
fn call_depth_limit() {
    // main plus five factorial frames
    let options = RuntimeOptions { max_call_depth: 6 };
    let mut runtime = sample_runtime("samples.RecursiveClass").with_options(options);
    runtime.start().unwrap();
    assert_eq!(runtime.output(), b"120\n");

    let options = RuntimeOptions { max_call_depth: 5 };
    let mut runtime = sample_runtime("samples.RecursiveClass").with_options(options);
    let err = runtime.start().unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow(5)));
    assert!(runtime.output().is_empty());
}

#[test]
fn class_path_search_order() {
    let empty = tempfile::tempdir().unwrap();
    let loader = ClassPathLoader::new(ClassPath::new(vec![
        empty.path().to_path_buf(),
        support(),
    ]));
    let mut runtime = Runtime::with_loader(loader, "samples.SimpleClass", Vec::new());
    runtime.start().unwrap();
    assert_eq!(runtime.into_output(), b"42\n");
}
