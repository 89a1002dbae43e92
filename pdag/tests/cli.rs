// End-to-end tests for the `pdag` binary.
//
// Runs the built binary against the programs under demos/ and checks the
// emitted artifacts and exit codes:
// - 0 on success
// - 1 when the source has diagnostics
// - 2 when the source cannot be read

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn pdag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdag"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo(name: &str) -> PathBuf {
    project_root().join("demos").join(name)
}

fn run(args: &[&str], source: &Path) -> Output {
    Command::new(pdag_binary())
        .args(args)
        .arg(source)
        .output()
        .expect("failed to run pdag")
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

/// Write `source` to a scratch file unique to this test.
fn scratch(test: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pdag-cli-{}-{}.hpl", test, std::process::id()));
    std::fs::write(&path, source).expect("failed to write scratch source");
    path
}

// ── Emit targets ────────────────────────────────────────────────────────────

#[test]
fn emit_dag_is_the_default() {
    let out = run(&[], &demo("blur.hpl"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Node: blur_y"), "{text}");
    assert!(text.contains("Node: blur_x"), "{text}");
    assert!(text.contains("Edge: blur_x -> blur_y"), "{text}");
    assert!(text.contains("blur_y depends on: blur_x"), "{text}");
}

#[test]
fn emit_bounds_reports_stencil_growth() {
    let out = run(&["--emit", "bounds"], &demo("blur.hpl"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(
        text.contains("blur_y:\n  dim 0: required [0, 1535] computed [0, 1535]\n"),
        "{text}"
    );
    assert!(
        text.contains("  dim 1: required [-1, 2560] computed [-1, 2560]\n"),
        "{text}"
    );
}

#[test]
fn emit_features_is_json_per_stage() {
    let out = run(&["--emit", "features"], &demo("histogram.hpl"));
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    let stages: Vec<&str> = v
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|s| s["stage"].as_str())
        .collect();
    assert_eq!(stages.len(), 4);
    assert!(stages.contains(&"cdf.update(0)"));
    assert!(stages.contains(&"hist.update(0)"));
}

#[test]
fn emit_ast_needs_no_estimates() {
    let path = scratch("ast", "func f(x) = x\noutput f\n");
    let out = run(&["--emit", "ast"], &path);
    let _ = std::fs::remove_file(&path);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Program"));
}

#[test]
fn target_changes_vector_size() {
    let sse = run(&["--emit", "features", "--target", "sse"], &demo("blur.hpl"));
    let avx512 = run(&["--emit", "features", "--target", "avx512"], &demo("blur.hpl"));
    let size = |o: &Output| -> i64 {
        let v: serde_json::Value = serde_json::from_str(&stdout(o)).expect("valid JSON");
        v[0]["vector_size"].as_i64().expect("vector_size")
    };
    assert!(size(&sse) < size(&avx512));
}

#[test]
fn every_demo_analyzes() {
    for name in ["blur.hpl", "histogram.hpl", "unsharp.hpl"] {
        let out = run(&[], &demo(name));
        assert!(
            out.status.success(),
            "{name} failed.\nstderr: {}",
            stderr(&out)
        );
    }
}

// ── Failures ────────────────────────────────────────────────────────────────

#[test]
fn syntax_error_exits_with_one() {
    let path = scratch("syntax", "func f(x) = \n");
    let out = run(&[], &path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[E0001]"), "{}", stderr(&out));
}

#[test]
fn missing_estimate_exits_with_one() {
    let path = scratch("estimate", "func f(x) = x\noutput f\n");
    let out = run(&[], &path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[E0100]"), "{}", stderr(&out));
}

#[test]
fn unreadable_source_exits_with_two() {
    let out = run(&[], &project_root().join("demos/does_not_exist.hpl"));
    assert_eq!(out.status.code(), Some(2));
}
