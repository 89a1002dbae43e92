// driver.rs — Source-to-graph orchestration
//
// Runs the phases in order (parse, lower, build the graph) and renders the
// artifacts the CLI can emit.
//
// Preconditions: none.
// Postconditions: on success every phase's artifact is available.
// Failure modes: the first phase that reports errors stops the run; its
//   diagnostics are returned.
// Side effects: debug logging of per-phase timing.

use std::fmt::Write;
use std::time::Instant;

use serde::Serialize;

use crate::ast::Program;
use crate::dag::FunctionDAG;
use crate::diag::{codes, Diagnostic};
use crate::features::PipelineFeatures;
use crate::ir::Pipeline;
use crate::target::Target;

/// Everything produced from one source file.
#[derive(Debug)]
pub struct Analysis {
    pub program: Program,
    pub pipeline: Pipeline,
    pub dag: FunctionDAG,
}

fn timed<T>(phase: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    log::debug!("{phase}: {:.3} ms", start.elapsed().as_secs_f64() * 1e3);
    out
}

/// Parse `source`, converting syntax errors to diagnostics.
pub fn parse_program(source: &str) -> Result<Program, Vec<Diagnostic>> {
    let result = timed("parse", || crate::parser::parse(source));
    if !result.errors.is_empty() {
        return Err(result
            .errors
            .iter()
            .map(|e| Diagnostic::error(codes::E0001, e.to_string()).with_span(*e.span()))
            .collect());
    }
    result.program.ok_or_else(|| {
        vec![Diagnostic::error(
            codes::E0001,
            "parse failed with no output",
        )]
    })
}

/// Parse and lower `source`.
pub fn lower_source(source: &str) -> Result<(Program, Pipeline), Vec<Diagnostic>> {
    let program = parse_program(source)?;
    log::debug!("parsed {} statements", program.statements.len());
    let lowered = timed("lower", || crate::lower::lower(&program));
    if lowered.has_errors() {
        return Err(lowered.diagnostics);
    }
    Ok((program, lowered.pipeline))
}

/// Parse, lower and build the function DAG for `source`.
pub fn analyze_source(source: &str, target: &Target) -> Result<Analysis, Vec<Diagnostic>> {
    let (program, pipeline) = lower_source(source)?;
    log::debug!(
        "lowered {} funcs, {} inputs, {} params; target {target}",
        pipeline.funcs.len(),
        pipeline.images.len(),
        pipeline.params.len()
    );
    let dag = timed("function DAG", || FunctionDAG::new(&pipeline, target)).map_err(|d| vec![d])?;
    Ok(Analysis {
        program,
        pipeline,
        dag,
    })
}

// ── Renderers ──

#[derive(Serialize)]
struct StageFeatures<'a> {
    stage: &'a str,
    vector_size: i64,
    features: &'a PipelineFeatures,
}

/// Per-stage features as a JSON array, consumers first.
pub fn features_json(dag: &FunctionDAG) -> serde_json::Result<String> {
    let stages: Vec<StageFeatures<'_>> = dag
        .nodes
        .iter()
        .flat_map(|n| n.stages.iter())
        .map(|s| StageFeatures {
            stage: &s.name,
            vector_size: s.vector_size,
            features: &s.features,
        })
        .collect();
    serde_json::to_string_pretty(&stages)
}

/// Bounds of every node when everything is computed at root.
pub fn root_bounds_report(dag: &FunctionDAG) -> String {
    let bounds = dag.bounds_at_root();
    let mut out = String::new();
    for (node, b) in dag.nodes.iter().zip(&bounds) {
        let _ = writeln!(out, "{}:", node.name());
        for d in 0..node.dimensions {
            let _ = writeln!(
                out,
                "  dim {d}: required {} computed {}",
                b.region_required(d),
                b.region_computed(d)
            );
        }
        for (s, stage) in node.stages.iter().enumerate() {
            for (i, l) in stage.loops.iter().enumerate() {
                let _ = writeln!(out, "  {} loop {}: {}", stage.name, l.var, b.loops(s, i));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUR: &str = "\
input uint8 in(x, y)
func bx(x, y) = in(x - 1, y) + in(x, y) + in(x + 1, y)
func by(x, y) = bx(x, y - 1) + bx(x, y) + bx(x, y + 1)
output by estimate(x = [0, 64], y = [0, 32])
";

    #[test]
    fn analyze_blur() {
        let a = analyze_source(BLUR, &Target::default()).unwrap();
        assert_eq!(a.program.statements.len(), 4);
        assert_eq!(a.dag.nodes.len(), 2);
        assert_eq!(a.dag.edges.len(), 1);
    }

    #[test]
    fn parse_errors_carry_code_and_span() {
        let errs = parse_program("func f(x) = \n").unwrap_err();
        assert!(!errs.is_empty());
        assert_eq!(errs[0].code, Some(codes::E0001));
        assert!(errs[0].span.is_some());
    }

    #[test]
    fn lowering_errors_stop_the_run() {
        let errs = analyze_source("func f(x) = nope", &Target::default()).unwrap_err();
        assert_eq!(errs[0].code, Some(codes::E0200));
    }

    #[test]
    fn graph_errors_are_returned() {
        let errs = analyze_source("func f(x) = x\noutput f", &Target::default()).unwrap_err();
        assert_eq!(errs[0].code, Some(codes::E0100));
    }

    #[test]
    fn root_bounds_grow_by_stencil() {
        let a = analyze_source(BLUR, &Target::default()).unwrap();
        let report = root_bounds_report(&a.dag);
        assert!(report.contains("by:\n  dim 0: required [0, 63] computed [0, 63]\n"), "{report}");
        assert!(report.contains("bx:\n  dim 0: required [0, 63] computed [0, 63]\n"), "{report}");
        assert!(report.contains("  dim 1: required [-1, 32] computed [-1, 32]\n"), "{report}");
    }

    #[test]
    fn features_serialize() {
        let a = analyze_source(BLUR, &Target::default()).unwrap();
        let json = features_json(&a.dag).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v.as_array().map(Vec::len), Some(2));
        assert_eq!(v[0]["stage"], "by");
    }
}
