// Integration tests for function DAG construction.
//
// Each scenario is a small .hpl program run through the library API
// (parse → lower → FunctionDAG::new). Assertions look at the graph shape,
// edge footprints, load Jacobians, and bounds computed at root.

use pdag::diag::codes;
use pdag::driver::analyze_source;
use pdag::features::{AccessType, ScalarType};
use pdag::jacobian::AccessPattern;
use pdag::span::Span;
use pdag::target::Target;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn dag(source: &str) -> pdag::dag::FunctionDAG {
    match analyze_source(source, &Target::default()) {
        Ok(a) => a.dag,
        Err(diags) => panic!("unexpected diagnostics: {:?}", diags),
    }
}

fn first_error(source: &str) -> pdag::diag::Diagnostic {
    match analyze_source(source, &Target::default()) {
        Ok(_) => panic!("expected an error for:\n{source}"),
        Err(mut diags) => diags.remove(0),
    }
}

// ── Edges and Jacobians ─────────────────────────────────────────────────────

#[test]
fn shifted_pointwise_loads_share_one_edge() {
    let d = dag("\
func f(x, y) = x + y
func g(x, y) = f(x, y) + f(x + 1, y)
output g estimate(x = [0, 100], y = [0, 50])
");
    assert_eq!(d.nodes.len(), 2);
    let edges = d.edges_between("f", "g");
    assert_eq!(edges.len(), 1);
    let e = edges[0];
    assert_eq!(e.calls, 2);
    assert!(e.all_bounds_affine);
    assert_eq!(e.load_jacobians.len(), 1);
    assert_eq!(e.load_jacobians[0].count(), 2);
    assert_eq!(
        e.load_jacobians[0].classify().patterns().collect::<Vec<_>>(),
        vec![AccessPattern::Pointwise]
    );

    // g's loops cover [0, 9] x [0, 4]; the +1 shift widens x by one.
    let mut required = [Span::empty(), Span::empty()];
    e.expand_footprint(
        &[Span::new(0, 9, true), Span::new(0, 4, true)],
        &mut required,
    );
    assert_eq!(required[0], Span::new(0, 10, true));
    assert_eq!(required[1], Span::new(0, 4, true));
}

#[test]
fn swapped_coordinates_are_a_transpose() {
    let d = dag("\
func f(x, y) = x * y
func g(x, y) = f(y, x)
output g estimate(x = [0, 16], y = [0, 8])
");
    let e = d.edges_between("f", "g")[0];
    let classes = e.load_jacobians[0].classify();
    assert!(classes.transpose && !classes.pointwise);
    let g = d.node_by_name("g").unwrap();
    assert!(!g.is_pointwise);
}

#[test]
fn transpose_load_counts_as_broadcast_and_slice() {
    let d = dag("\
func f(x, y) = x * y
func g(x, y) = f(y, x)
output g estimate(x = [0, 16], y = [0, 8])
");
    let g = d.node_by_name("g").unwrap();
    let feats = &g.stages[0].features;
    let count = |p: AccessPattern| feats.access_count(p, AccessType::LoadFunc, ScalarType::UInt32);
    assert_eq!(count(AccessPattern::Pointwise), 0);
    assert_eq!(count(AccessPattern::Transpose), 1);
    assert_eq!(count(AccessPattern::Broadcast), 1);
    assert_eq!(count(AccessPattern::Slice), 1);
}

#[test]
fn fixed_coordinate_is_a_slice() {
    let d = dag("\
func f(x, y) = x - y
func g(x, y) = f(x, 0)
output g estimate(x = [0, 16], y = [0, 8])
");
    let e = d.edges_between("f", "g")[0];
    let classes = e.load_jacobians[0].classify();
    assert!(classes.slice && !classes.pointwise && !classes.broadcast);

    // The fixed coordinate reads a single row regardless of the loop extent.
    let mut required = [Span::empty(), Span::empty()];
    e.expand_footprint(
        &[Span::new(0, 15, true), Span::new(0, 7, true)],
        &mut required,
    );
    assert_eq!(required[1], Span::new(0, 0, true));
}

#[test]
fn lower_dimensional_producer_is_a_broadcast() {
    let d = dag("\
func f(x) = x * 2
func g(x, y) = f(x) + y
output g estimate(x = [0, 16], y = [0, 8])
");
    let e = d.edges_between("f", "g")[0];
    assert_eq!(e.load_jacobians[0].producer_storage_dims(), 1);
    assert_eq!(e.load_jacobians[0].consumer_loop_dims(), 2);
    let classes = e.load_jacobians[0].classify();
    assert!(classes.broadcast && classes.slice && !classes.transpose);
}

#[test]
fn shadowed_let_loads_do_not_merge() {
    let d = dag("\
func f(x) = x
func g(x) = let t = x * 2; f(t) + (let t = x * 3; f(t))
output g estimate(x = [0, 16])
");
    let e = d.edges_between("f", "g")[0];
    assert_eq!(e.calls, 2);
    assert_eq!(e.load_jacobians.len(), 2);
    for j in &e.load_jacobians {
        assert_eq!(j.count(), 1);
    }
    assert!(e.load_jacobians.iter().any(|j| j.get(0, 0) == 2));
    assert!(e.load_jacobians.iter().any(|j| j.get(0, 0) == 3));
}

#[test]
fn update_stage_gets_its_own_edge() {
    let d = dag("\
input float32 in(x)
rdom r(0, 8)
func w(x) = in(x)
func h(x) = 0.0
update h(x) = h(x) + w(x + r)
output h estimate(x = [0, 32])
");
    let h = d.node_by_name("h").unwrap();
    assert_eq!(h.stages.len(), 2);
    let edges = d.edges_between("w", "h");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].consumer.index, 1);
    assert!(h.stages[0].incoming_edges.is_empty());
    assert_eq!(h.stages[1].incoming_edges.len(), 1);
}

// ── Dependencies ────────────────────────────────────────────────────────────

#[test]
fn dependencies_are_transitive() {
    let d = dag("\
func a(x) = x
func b(x) = a(x) + 1
func c(x) = b(x) * 2
output c estimate(x = [0, 10])
");
    let a = d.node_by_name("a").unwrap().id;
    let b = d.node_by_name("b").unwrap().id;
    let c = d.node_by_name("c").unwrap();
    assert!(c.stages[0].downstream_of(a));
    assert!(c.stages[0].downstream_of(b));
    assert!(!c.stages[0].downstream_of(c.id));
    assert_eq!(c.stages[0].dependencies.len(), 2);

    let a = d.node_by_name("a").unwrap();
    assert!(a.stages[0].dependencies.is_empty());
}

#[test]
fn stage_ids_are_dense() {
    let d = dag("\
rdom r(0, 4)
func f(x) = 0
update f(x) = f(x) + r
func g(x) = f(x)
output g estimate(x = [0, 10])
");
    assert_eq!(d.num_stages(), 3);
    let mut ids: Vec<usize> = d
        .nodes
        .iter()
        .flat_map(|n| n.stages.iter().map(|s| s.id.index()))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2]);
    for n in &d.nodes {
        for s in &n.stages {
            assert_eq!(s.max_id, 3);
        }
    }
}

// ── Bounds at root ──────────────────────────────────────────────────────────

#[test]
fn stencil_grows_required_region() {
    let d = dag("\
input uint16 in(x, y)
func bx(x, y) = in(x - 1, y) + in(x, y) + in(x + 1, y)
func by(x, y) = bx(x, y - 1) + bx(x, y) + bx(x, y + 1)
output by estimate(x = [0, 64], y = [0, 32])
");
    let bounds = d.bounds_at_root();
    let bx = d.nodes.iter().position(|n| n.name() == "bx").unwrap();
    let b = &bounds[bx];
    assert_eq!((b.region_required(0).min(), b.region_required(0).max()), (0, 63));
    assert_eq!((b.region_required(1).min(), b.region_required(1).max()), (-1, 32));
    assert_eq!(b.region_computed(1).extent(), 34);
    assert_eq!(b.loops(0, 1).extent(), 34);
}

#[test]
fn param_dependent_bounds_lose_constant_extent() {
    let d = dag("\
param int32 k = 3
func f(x) = x
func g(x) = f(x + k)
output g estimate(x = [0, 10])
");
    let e = d.edges_between("f", "g")[0];
    assert!(e.bounds[0].0.depends_on_estimate);
    let mut required = [Span::empty()];
    e.expand_footprint(&[Span::new(0, 9, true)], &mut required);
    assert_eq!(required[0], Span::new(3, 12, false));
}

#[test]
fn leading_constant_scale_is_affine() {
    let d = dag("\
func f(x) = x
func g(x) = f(2 * x)
output g estimate(x = [0, 10])
");
    let e = d.edges_between("f", "g")[0];
    assert!(e.all_bounds_affine);
    let (lo, hi) = &e.bounds[0];
    assert_eq!((lo.coeff, lo.constant), (2, 0));
    assert_eq!((hi.coeff, hi.constant), (2, 0));
    let mut required = [Span::empty()];
    e.expand_footprint(&[Span::new(0, 9, true)], &mut required);
    assert_eq!((required[0].min(), required[0].max()), (0, 18));
}

#[test]
fn constant_offsets_keep_constant_extent() {
    let d = dag("\
func f(x) = x
func g(x) = f(x + 3)
output g estimate(x = [0, 10])
");
    let e = d.edges_between("f", "g")[0];
    let mut required = [Span::empty()];
    e.expand_footprint(&[Span::new(0, 9, true)], &mut required);
    assert_eq!(required[0], Span::new(3, 12, true));
}

#[test]
fn reduction_over_constant_domain_computes_the_union() {
    let d = dag("\
input uint8 in(x)
rdom r(0, 256)
func hist(x) = 0
update hist(in(r)) = hist(in(r)) + 1
func out(x) = hist(x)
output out estimate(x = [0, 16])
");
    let bounds = d.bounds_at_root();
    let hist = d.nodes.iter().position(|n| n.name() == "hist").unwrap();
    let b = &bounds[hist];
    assert_eq!((b.region_required(0).min(), b.region_required(0).max()), (0, 15));
    assert_eq!((b.region_computed(0).min(), b.region_computed(0).max()), (0, 255));
}

// ── Node flags ──────────────────────────────────────────────────────────────

#[test]
fn wrapper_of_input_is_an_input_node() {
    let d = dag("\
input uint8 in(x)
wrapper in_w(x) = in(x)
func f(x) = in_w(x) + 1
output f estimate(x = [0, 8])
");
    let w = d.node_by_name("in_w").unwrap();
    assert!(w.is_wrapper && w.is_input);
    let f = d.node_by_name("f").unwrap();
    assert!(f.is_output && !f.is_input);
}

#[test]
fn repeat_edge_prefix_marks_boundary_condition() {
    let d = dag("\
input uint8 in(x)
func repeat_edge_in(x) = in(clamp(x, 0, 99))
func f(x) = repeat_edge_in(x - 1) + repeat_edge_in(x + 1)
output f estimate(x = [0, 100])
");
    assert!(d.node_by_name("repeat_edge_in").unwrap().is_boundary_condition);
    assert!(!d.node_by_name("f").unwrap().is_boundary_condition);
}

// ── User errors ─────────────────────────────────────────────────────────────

#[test]
fn output_without_estimate_is_rejected() {
    let d = first_error("func f(x) = x\noutput f\n");
    assert_eq!(d.code, Some(codes::E0100));
}

#[test]
fn empty_output_estimate_is_rejected() {
    for extent in ["0", "-4"] {
        let d = first_error(&format!(
            "func f(x) = x\noutput f estimate(x = [0, {extent}])\n"
        ));
        assert_eq!(d.code, Some(codes::E0104));
        assert!(d.message.contains("extent must be positive"), "{}", d.message);
    }
}

#[test]
fn split_schedule_is_rejected() {
    let d = first_error("\
func f(x) = x
schedule f split(x, xo, xi, 8)
output f estimate(x = [0, 64])
");
    assert_eq!(d.code, Some(codes::E0101));
}

#[test]
fn reorder_schedule_is_rejected() {
    let d = first_error("\
func f(x, y) = x + y
func g(x, y) = f(x, y)
schedule g reorder(y, x)
output g estimate(x = [0, 16], y = [0, 8])
");
    assert_eq!(d.code, Some(codes::E0101));
    assert!(d.message.contains("`g`"), "{}", d.message);
}

#[test]
fn data_dependent_update_region_is_unbounded() {
    let d = first_error("\
rdom r(0, 10)
func f(x) = x
update f(f(r)) = 1
func g(x) = f(x)
output g estimate(x = [0, 10])
");
    assert_eq!(d.code, Some(codes::E0103));
}

#[test]
fn param_without_estimate_is_rejected() {
    let d = first_error("\
param int32 k
func f(x) = x
func g(x) = f(x + k)
output g estimate(x = [0, 10])
");
    assert_eq!(d.code, Some(codes::E0105));
}
