// Snapshot tests: lock the lowered expression text and diagnostic wording.
//
// Uses the library API (parse → lower) and snapshots Display output inline.
// Run `cargo insta review` after intentional output changes to update them.

use pdag::diag::{codes, Diagnostic};
use pdag::ir::Pipeline;
use pdag::target::Target;

fn lower(source: &str) -> Pipeline {
    match pdag::driver::lower_source(source) {
        Ok((_, pipeline)) => pipeline,
        Err(diags) => panic!("unexpected diagnostics: {:?}", diags),
    }
}

/// Value of the pure definition of `func`.
fn value(source: &str, func: &str) -> String {
    let p = lower(source);
    p.funcs[func].definition.values[0].to_string()
}

fn error(source: &str) -> Diagnostic {
    match pdag::driver::analyze_source(source, &Target::default()) {
        Ok(_) => panic!("expected an error for:\n{source}"),
        Err(mut diags) => diags.remove(0),
    }
}

// ── Lowered values ──────────────────────────────────────────────────────────

#[test]
fn clamp_is_min_then_max() {
    insta::assert_snapshot!(value("func f(x) = clamp(x, 0, 9)", "f"), @"max(min(x, 9), 0)");
}

#[test]
fn select_keeps_condition() {
    insta::assert_snapshot!(
        value("func f(x) = select(x < 3, x, 0)", "f"),
        @"select((x < 3), x, 0)"
    );
}

#[test]
fn let_wraps_body() {
    insta::assert_snapshot!(
        value("func f(x) = let t = x * 2; t + t", "f"),
        @"(let t = (x * 2) in (t + t))"
    );
}

#[test]
fn narrow_input_is_promoted_by_float_literal() {
    insta::assert_snapshot!(
        value("input uint8 in(x)\nfunc f(x) = in(x) * 0.5", "f"),
        @"(float32(in(x)) * 0.5f)"
    );
}

#[test]
fn integer_literal_takes_input_type() {
    insta::assert_snapshot!(
        value("input uint16 in(x)\nfunc f(x) = in(x) + 1", "f"),
        @"(in(x) + (uint16)1)"
    );
}

// ── Diagnostic wording ──────────────────────────────────────────────────────

#[test]
fn missing_output_estimate_message() {
    let d = error("func f(x) = x\noutput f\n");
    assert_eq!(d.code, Some(codes::E0100));
    insta::assert_snapshot!(d.message, @"need an estimate on dimension 0 (`x`) of output `f`");
}

#[test]
fn duplicate_definition_message() {
    let d = error("func f(x) = x\nfunc f(x) = x + 1\n");
    assert_eq!(d.code, Some(codes::E0201));
    insta::assert_snapshot!(d.message, @"`f` is already defined");
}

#[test]
fn use_before_definition_message() {
    let d = error("func g(x) = f(x)\nfunc f(x) = x\n");
    assert_eq!(d.code, Some(codes::E0202));
    insta::assert_snapshot!(d.message, @"`f` is used before its definition");
}

#[test]
fn self_call_message() {
    let d = error("func f(x) = f(x - 1)\n");
    assert_eq!(d.code, Some(codes::E0209));
    insta::assert_snapshot!(d.message, @"pure definition of `f` calls itself");
}
