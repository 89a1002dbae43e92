// dag.rs — Function dependency graph construction
//
// Builds one `Node` per function reachable from the pipeline outputs, one
// `Stage` per definition, and one `Edge` per (producer, consumer stage) pair,
// then derives per-node arena layouts, dense stage ids, transitive
// dependency sets and per-stage features.
//
// Preconditions: `pipeline` is lowered (every call names a function, image or
//   intrinsic; update definitions only use pure vars bare on their LHS).
// Postconditions: nodes are stored consumers-first, so every edge's producer
//   index is greater than its consumer's node index. `nodes` and `edges` are
//   never resized after `new` returns.
// Failure modes: user errors (missing estimates, scheduling directives,
//   unbounded regions, cycles) are returned as a `Diagnostic`; internal
//   inconsistencies panic.
// Side effects: debug logging of the finished graph.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::affine::BoundInfo;
use crate::arena::Bound;
use crate::bounds::{bounds_of_expr_in_scope, boxes_required, func_value_bounds};
use crate::bounds::{FuncValueBounds, Interval};
use crate::diag::{codes, Diagnostic};
use crate::edge::Edge;
use crate::featurize::featurize_definition;
use crate::id::{EdgeId, NodeId, StageId, StageRef};
use crate::ir::{free_vars, substitute, uses_params, walk, BinOp, CallKind};
use crate::ir::{Definition, Expr, Func, IrVisitor, Param, Pipeline, Type};
use crate::node::{DependencySet, Loop, Node, RegionComputedInfo, Stage};
use crate::scope::Scope;
use crate::simplify::simplify;
use crate::span::{Span, SymbolicInterval};
use crate::target::Target;

#[derive(Debug)]
pub struct FunctionDAG {
    /// Consumers first: `nodes[0]` is realized last.
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

// ── Parameter estimates ──────────────────────────────────────────────────

/// Replaces pipeline parameters by their estimates.
struct ParamEstimates<'p> {
    params: &'p [Param],
    map: HashMap<String, Expr>,
}

impl<'p> ParamEstimates<'p> {
    fn new(params: &'p [Param]) -> Self {
        let map = params
            .iter()
            .filter_map(|p| Some((p.name.clone(), p.estimate.clone()?)))
            .collect();
        ParamEstimates { params, map }
    }

    fn apply(&self, e: &Expr) -> Result<Expr, Diagnostic> {
        if !uses_params(e) {
            return Ok(e.clone());
        }
        for name in free_vars(e) {
            if self.params.iter().any(|p| p.name == name) && !self.map.contains_key(&name) {
                return Err(Diagnostic::error(
                    codes::E0105,
                    format!("missing estimate for parameter `{name}`"),
                )
                .with_hint(format!("declare it as `param <type> {name} = <value>`")));
            }
        }
        Ok(substitute(&self.map, e))
    }
}

// ── Realization order ────────────────────────────────────────────────────

/// Names of the functions `f` calls in any of its definitions.
fn called_funcs(f: &Func) -> BTreeSet<String> {
    struct Calls(BTreeSet<String>);
    impl IrVisitor for Calls {
        fn visit(&mut self, e: &Expr) {
            if let Expr::Call(c) = e {
                if c.kind == CallKind::Func {
                    self.0.insert(c.name.clone());
                }
            }
            walk(self, e);
        }
    }
    let mut v = Calls(BTreeSet::new());
    for def in f.stages() {
        for e in def.args.iter().chain(&def.values).chain(&def.predicate) {
            v.visit(e);
        }
    }
    v.0
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn visit_func<'p>(
    p: &'p Pipeline,
    f: &'p Func,
    state: &mut HashMap<&'p str, Visit>,
    order: &mut Vec<&'p Func>,
) -> Result<(), Diagnostic> {
    match state.get(f.name.as_str()) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            return Err(Diagnostic::error(
                codes::E0106,
                format!("dependency cycle through `{}`", f.name),
            )
            .with_hint("only a function's own update definitions may read it recursively"));
        }
        None => {}
    }
    state.insert(&f.name, Visit::InProgress);
    for callee in called_funcs(f) {
        if callee == f.name {
            continue;
        }
        if let Some(g) = p.funcs.get(&callee) {
            visit_func(p, g, state, order)?;
        }
    }
    state.insert(&f.name, Visit::Done);
    order.push(f);
    Ok(())
}

/// Every function reachable from the outputs, producers first.
fn realization_order(p: &Pipeline) -> Result<Vec<&Func>, Diagnostic> {
    let mut state = HashMap::new();
    let mut order = Vec::new();
    for out in &p.outputs {
        let Some(f) = p.funcs.get(out) else {
            return Err(Diagnostic::error(
                codes::E0204,
                format!("unknown output `{out}`"),
            ));
        };
        visit_func(p, f, &mut state, &mut order)?;
    }
    Ok(order)
}

// ── Per-stage expression checks ──────────────────────────────────────────

/// Narrowest type, call counts, and whether every load is at exactly the
/// pure args of the consumer.
struct CheckTypes<'a> {
    pure_args: &'a [String],
    narrowest: Option<Type>,
    calls: HashMap<String, usize>,
    is_pointwise: bool,
}

impl<'a> CheckTypes<'a> {
    fn new(pure_args: &'a [String]) -> Self {
        CheckTypes {
            pure_args,
            narrowest: None,
            calls: HashMap::new(),
            is_pointwise: true,
        }
    }

    fn check_type(&mut self, t: Type) {
        if t.bits <= 1 {
            return;
        }
        match self.narrowest {
            Some(n) if n.bits <= t.bits => {}
            _ => self.narrowest = Some(t),
        }
    }
}

impl IrVisitor for CheckTypes<'_> {
    fn visit(&mut self, e: &Expr) {
        match e {
            Expr::Int(_, t) | Expr::Float(_, t) => self.check_type(*t),
            Expr::Var(v) => self.check_type(v.ty),
            Expr::Cast(t, _) => {
                walk(self, e);
                self.check_type(*t);
            }
            Expr::Call(c) => {
                *self.calls.entry(c.name.clone()).or_default() += 1;
                walk(self, e);
                self.check_type(c.ty);
                if matches!(c.kind, CallKind::Func | CallKind::Image) {
                    self.is_pointwise &= c.args.len() == self.pure_args.len()
                        && c
                            .args
                            .iter()
                            .zip(self.pure_args)
                            .all(|(a, p)| a.as_var().is_some_and(|v| v.name == *p));
                }
            }
            _ => walk(self, e),
        }
    }
}

// ── Construction ─────────────────────────────────────────────────────────

struct Context<'p> {
    pipeline: &'p Pipeline,
    target: &'p Target,
    fvb: FuncValueBounds,
    estimates: ParamEstimates<'p>,
    index: HashMap<&'p str, NodeId>,
}

fn unbounded_region(func: &str, stage: &str, dim: usize) -> Diagnostic {
    Diagnostic::error(
        codes::E0103,
        format!("region computed of `{func}` is unbounded in dimension {dim} (stage `{stage}`)"),
    )
    .with_hint("an update's left-hand side must have computable bounds")
}

fn stage_name(func: &str, s: usize) -> String {
    if s == 0 {
        func.to_string()
    } else {
        format!("{func}.update({})", s - 1)
    }
}

/// Region computed of `f`, unioned over its stages and classified against
/// the region required placeholders.
fn classify_region_computed(
    f: &Func,
    region_required: &[SymbolicInterval],
    computed: Vec<Interval>,
    ctx: &Context<'_>,
) -> Result<(Vec<RegionComputedInfo>, bool), Diagnostic> {
    let mut all_common = true;
    let mut out = Vec::with_capacity(computed.len());
    for (j, iv) in computed.into_iter().enumerate() {
        let (Some(lo), Some(hi)) = (iv.min, iv.max) else {
            return Err(unbounded_region(&f.name, &f.name, j));
        };
        let depends_on_estimate = uses_params(&lo) || uses_params(&hi);
        let lo = simplify(&ctx.estimates.apply(&lo)?);
        let hi = simplify(&ctx.estimates.apply(&hi)?);
        let req = &region_required[j];
        let mut info = RegionComputedInfo {
            interval: Interval::new(lo.clone(), hi.clone()),
            depends_on_estimate,
            equals_required: false,
            equals_union_of_required_with_constants: false,
            c_min: 0,
            c_max: 0,
        };
        if lo == req.min && hi == req.max {
            info.equals_required = true;
        } else {
            let union = match (&lo, &hi) {
                (Expr::Bin(BinOp::Min, min_a, min_b), Expr::Bin(BinOp::Max, max_a, max_b))
                    if **min_a == req.min && **max_a == req.max =>
                {
                    min_b.as_const_int().zip(max_b.as_const_int())
                }
                _ => None,
            };
            match union {
                Some((c_min, c_max)) => {
                    info.equals_union_of_required_with_constants = true;
                    info.c_min = c_min;
                    info.c_max = c_max;
                }
                None => all_common = false,
            }
        }
        out.push(info);
    }
    Ok((out, all_common))
}

/// Loop nest of one stage, innermost first, skipping synthetic loops.
fn build_loops(
    f: &Func,
    def: &Definition,
    concrete: &Scope<Interval>,
    symbolic: &Scope<Interval>,
    region_computed: &[RegionComputedInfo],
) -> (Vec<Loop>, bool) {
    let mut loops = Vec::new();
    let mut all_common = true;
    for d in &def.schedule.dims {
        if !symbolic.contains(&d.var) {
            continue;
        }
        let Some(Interval {
            min: Some(min),
            max: Some(max),
        }) = concrete.get(&d.var).cloned()
        else {
            panic!("loop {} of {} has no bounds", d.var, f.name);
        };
        let pure_dim = f.args.iter().position(|a| *a == d.var);
        let mut l = Loop {
            var: d.var.clone(),
            min,
            max,
            pure: d.kind.is_pure(),
            rvar: d.kind.is_rvar(),
            pure_dim,
            equals_region_computed: false,
            region_computed_dim: 0,
            bounds_are_constant: false,
            c_min: 0,
            c_max: 0,
        };
        if let Some(j) = pure_dim {
            let rc = &region_computed[j].interval;
            if rc.min.as_ref() == Some(&l.min) && rc.max.as_ref() == Some(&l.max) {
                l.equals_region_computed = true;
                l.region_computed_dim = j;
            }
        }
        if !l.equals_region_computed {
            if let (Some(c_min), Some(c_max)) = (l.min.as_const_int(), l.max.as_const_int()) {
                l.bounds_are_constant = true;
                l.c_min = c_min;
                l.c_max = c_max;
            }
        }
        all_common &= l.bounds_are_constant || l.equals_region_computed;
        loops.push(l);
    }
    (loops, all_common)
}

/// Output estimates of `f`, one span per dimension.
fn output_estimates(f: &Func) -> Result<Vec<Span>, Diagnostic> {
    let mut spans = Vec::with_capacity(f.dimensions());
    for (i, arg) in f.args.iter().enumerate() {
        let Some(est) = f.estimates.iter().find(|e| e.var == *arg) else {
            return Err(Diagnostic::error(
                codes::E0100,
                format!("need an estimate on dimension {i} (`{arg}`) of output `{}`", f.name),
            )
            .with_hint(format!("add `estimate({arg} = [min, extent])` to the output")));
        };
        let (Some(min), Some(extent)) = (est.min.as_const_int(), est.extent.as_const_int())
        else {
            return Err(Diagnostic::error(
                codes::E0104,
                format!(
                    "estimate of `{}` is not constant: var {}, min {}, extent {}",
                    f.name, est.var, est.min, est.extent
                ),
            ));
        };
        if extent < 1 {
            return Err(Diagnostic::error(
                codes::E0104,
                format!(
                    "estimate of `{}` on `{}` has extent {extent}; extent must be positive",
                    f.name, est.var
                ),
            )
            .with_hint("estimates are written `[min, extent]`"));
        }
        spans.push(Span::new(min, min + extent - 1, false));
    }
    Ok(spans)
}

fn build_node(id: NodeId, f: &Func, ctx: &Context<'_>) -> Result<(Node, Vec<Edge>), Diagnostic> {
    let mut scope: Scope<Interval> = Scope::new();
    let mut region_required = Vec::with_capacity(f.dimensions());
    for a in &f.args {
        let si = SymbolicInterval::new(&f.name, a);
        scope.push(a.clone(), Interval::new(si.min.clone(), si.max.clone()));
        region_required.push(si);
    }

    let defs: Vec<&Definition> = f.stages().collect();

    // Reduction domains, both concrete (estimates applied) and symbolic.
    let mut stage_scopes = Vec::with_capacity(defs.len());
    for def in &defs {
        let mut concrete = Scope::with_parent(&scope);
        let mut symbolic = Scope::with_parent(&scope);
        for rv in &def.schedule.rvars {
            let last = rv.min.clone() + rv.extent.clone() - 1;
            let min = simplify(&ctx.estimates.apply(&rv.min)?);
            let max = simplify(&ctx.estimates.apply(&last)?);
            concrete.push(rv.var.clone(), Interval::new(min, max));
            let si = SymbolicInterval::new(&f.name, &rv.var);
            symbolic.push(rv.var.clone(), Interval::new(si.min, si.max));
        }
        stage_scopes.push((concrete, symbolic));
    }

    let mut computed: Vec<Interval> = Vec::with_capacity(f.dimensions());
    for (s, def) in defs.iter().enumerate() {
        assert_eq!(
            def.args.len(),
            f.dimensions(),
            "stage {s} of {} has the wrong number of args",
            f.name
        );
        for (j, a) in def.args.iter().enumerate() {
            let iv = bounds_of_expr_in_scope(a, &stage_scopes[s].0, &ctx.fvb);
            if !iv.is_bounded() {
                return Err(unbounded_region(&f.name, &stage_name(&f.name, s), j));
            }
            if s == 0 {
                computed.push(iv);
            } else {
                computed[j].include(&iv);
            }
        }
    }
    let (region_computed, region_computed_all_common_cases) =
        classify_region_computed(f, &region_required, computed, ctx)?;

    let is_output = ctx.pipeline.outputs.contains(&f.name);
    let estimated_region_required = if is_output {
        output_estimates(f)?
    } else {
        Vec::new()
    };

    let mut stages = Vec::with_capacity(defs.len());
    let mut edges = Vec::new();
    let mut bytes_per_point = 0;
    let mut vector_size = 0;
    let mut is_pointwise = !f.has_update_definition();
    let is_boundary_condition = is_pointwise && f.name.starts_with("repeat_edge");
    let mut any_incoming_edges = false;
    let output_type = f.value_types().first().copied();

    for (s, def) in defs.iter().enumerate() {
        let name = stage_name(&f.name, s);
        if def.schedule.is_scheduled() {
            return Err(Diagnostic::error(
                codes::E0101,
                format!("`{name}` has scheduling directive(s) applied to it"),
            )
            .with_hint("remove `split` and `reorder` directives; the analysis needs an unscheduled pipeline"));
        }
        let (concrete, symbolic) = &stage_scopes[s];
        let (loops, loop_nest_all_common_cases) =
            build_loops(f, def, concrete, symbolic, &region_computed);

        let mut exprs: Vec<Expr> = def.args.clone();
        exprs.extend(def.values.iter().cloned());
        exprs.extend(def.predicate.iter().cloned());

        let mut checker = CheckTypes::new(&f.args);
        if let Some(t) = output_type {
            checker.check_type(t);
        }
        for e in &exprs {
            checker.visit(e);
        }
        let narrowest = checker
            .narrowest
            .or(output_type)
            .unwrap_or(Type::int(32));
        let stage_vector_size = ctx.target.natural_vector_size(narrowest);
        vector_size = vector_size.max(stage_vector_size);
        if s == 0 {
            bytes_per_point = def.values.iter().map(|v| v.ty().bytes()).sum();
        }

        let consumer_loops: Vec<SymbolicInterval> = loops
            .iter()
            .map(|l| SymbolicInterval::new(&f.name, &l.var))
            .collect();
        let boxes = boxes_required(&exprs, symbolic, &ctx.fvb);
        for (producer_name, region) in boxes {
            if producer_name == f.name {
                continue;
            }
            let Some(&producer) = ctx.index.get(producer_name.as_str()) else {
                continue;
            };
            let mut bounds = Vec::with_capacity(region.bounds.len());
            let mut all_bounds_affine = true;
            for iv in region.bounds {
                let (Some(lo), Some(hi)) = (iv.min, iv.max) else {
                    return Err(Diagnostic::error(
                        codes::E0102,
                        format!("unbounded producer->consumer relationship: {producer_name} -> {name}"),
                    )
                    .with_hint(format!(
                        "the region of `{producer_name}` read by `{name}` cannot be bounded"
                    )));
                };
                let min_dependent = uses_params(&lo);
                let max_dependent = uses_params(&hi);
                let lo = simplify(&ctx.estimates.apply(&lo)?);
                let hi = simplify(&ctx.estimates.apply(&hi)?);
                let min = BoundInfo::new(lo, &consumer_loops, min_dependent);
                let max = BoundInfo::new(hi, &consumer_loops, max_dependent);
                all_bounds_affine &= min.affine && max.affine;
                bounds.push((min, max));
            }
            any_incoming_edges = true;
            is_pointwise &= checker.is_pointwise;
            let calls = checker.calls.get(&producer_name).copied().unwrap_or(0);
            edges.push(Edge {
                producer,
                consumer: StageRef::new(id, s),
                bounds,
                load_jacobians: Vec::new(),
                all_bounds_affine,
                calls,
                consumer_loops: consumer_loops.clone(),
            });
        }

        stages.push(Stage {
            name,
            index: s,
            loops,
            loop_nest_all_common_cases,
            vector_size: stage_vector_size,
            features: Default::default(),
            id: StageId(0),
            max_id: 0,
            incoming_edges: Vec::new(),
            dependencies: DependencySet::default(),
        });
    }

    let loop_counts: Vec<usize> = stages.iter().map(|s| s.loops.len()).collect();
    let is_wrapper = f.is_wrapper;
    let node = Node {
        id,
        func: f.clone(),
        dimensions: f.dimensions(),
        stages,
        region_required,
        region_computed,
        region_computed_all_common_cases,
        estimated_region_required,
        bytes_per_point,
        vector_size,
        outgoing_edges: Vec::new(),
        is_output,
        is_input: !is_output && !f.has_update_definition() && is_wrapper && !any_incoming_edges,
        is_pointwise,
        is_boundary_condition,
        is_wrapper,
        layout: crate::arena::Layout::new(f.dimensions(), &loop_counts),
    };
    Ok((node, edges))
}

impl FunctionDAG {
    /// Build the graph for `pipeline`'s outputs.
    pub fn new(pipeline: &Pipeline, target: &Target) -> Result<FunctionDAG, Diagnostic> {
        let order = realization_order(pipeline)?;
        let n = order.len();
        let index: HashMap<&str, NodeId> = order
            .iter()
            .rev()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), NodeId(i as u32)))
            .collect();
        let ctx = Context {
            pipeline,
            target,
            fvb: func_value_bounds(order.iter().copied()),
            estimates: ParamEstimates::new(&pipeline.params),
            index,
        };

        let mut nodes = Vec::with_capacity(n);
        let mut edges = Vec::new();
        for (i, f) in order.iter().rev().enumerate() {
            let (node, node_edges) = build_node(NodeId(i as u32), f, &ctx)?;
            nodes.push(node);
            edges.extend(node_edges);
        }

        let mut dag = FunctionDAG { nodes, edges };
        dag.assign_stage_ids();
        dag.wire_edges();
        dag.compute_dependencies();
        dag.featurize();

        log::debug!(
            "function DAG: {} nodes, {} stages, {} edges",
            dag.nodes.len(),
            dag.num_stages(),
            dag.edges.len()
        );
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("\n{dag}");
        }
        Ok(dag)
    }

    fn assign_stage_ids(&mut self) {
        let total = self.num_stages();
        let mut next = 0;
        for node in &mut self.nodes {
            for s in &mut node.stages {
                s.id = StageId(next);
                s.max_id = total;
                next += 1;
            }
        }
    }

    fn wire_edges(&mut self) {
        for (i, e) in self.edges.iter().enumerate() {
            let id = EdgeId(i as u32);
            self.nodes[e.producer.index()].outgoing_edges.push(id);
            self.nodes[e.consumer.node.index()].stages[e.consumer.index]
                .incoming_edges
                .push(id);
        }
    }

    /// Producers have higher indices, so walking from the back sees every
    /// producer's dependency set before its consumers need it.
    fn compute_dependencies(&mut self) {
        let n = self.nodes.len();
        for i in (0..n).rev() {
            for s in 0..self.nodes[i].stages.len() {
                let mut deps = DependencySet::new(n);
                for &eid in &self.nodes[i].stages[s].incoming_edges {
                    let producer = &self.nodes[self.edges[eid.index()].producer.index()];
                    deps.insert(producer.id);
                    for ps in &producer.stages {
                        deps.union_with(&ps.dependencies);
                    }
                }
                self.nodes[i].stages[s].dependencies = deps;
            }
        }
    }

    fn featurize(&mut self) {
        for i in 0..self.nodes.len() {
            for s in 0..self.nodes[i].stages.len() {
                let node = &self.nodes[i];
                let stage = &node.stages[s];
                let Some(def) = node.func.stages().nth(s) else {
                    continue;
                };
                let loop_names = stage.loop_names();
                let (features, loads) =
                    featurize_definition(&node.func.name, def, node.func.is_extern, &loop_names);
                let mut routed = Vec::with_capacity(loads.len());
                for load in loads {
                    let target = stage.incoming_edges.iter().copied().find(|eid| {
                        let e = &self.edges[eid.index()];
                        self.nodes[e.producer.index()].func.name == load.producer
                    });
                    if let Some(eid) = target {
                        routed.push((eid, load.jacobian));
                    }
                }
                self.nodes[i].stages[s].features = features;
                for (eid, j) in routed {
                    self.edges[eid.index()].add_load_jacobian(j);
                }
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn num_stages(&self) -> usize {
        self.nodes.iter().map(|n| n.stages.len()).sum()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub fn stage(&self, r: StageRef) -> &Stage {
        &self.nodes[r.node.index()].stages[r.index]
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.func.name == name)
    }

    /// Edges from `producer` into any stage of `consumer`.
    pub fn edges_between(&self, producer: &str, consumer: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| {
                self.node(e.producer).func.name == producer
                    && self.node(e.consumer.node).func.name == consumer
            })
            .collect()
    }

    /// Bounds of every node when everything is computed at root over the
    /// output estimates, indexed like `nodes`.
    ///
    /// Panics if a node ends up with an empty required region.
    pub fn bounds_at_root(&self) -> Vec<Bound<'_>> {
        let mut out: Vec<Bound<'_>> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut b = node.make_bound();
            {
                let mut required = b.required_spans_mut();
                required.fill(Span::empty());
                for (r, est) in required.iter_mut().zip(&node.estimated_region_required) {
                    r.union_with(est);
                }
                for &eid in &node.outgoing_edges {
                    let e = self.edge(eid);
                    let consumer = &out[e.consumer.node.index()];
                    e.expand_footprint(&consumer.stage_loops(e.consumer.index), &mut required);
                }
            }
            {
                let (required, mut computed) = b.required_and_computed_mut();
                node.required_to_computed(&required, &mut computed);
            }
            for s in 0..node.stages.len() {
                let (computed, mut loops) = b.computed_and_loops_mut(s);
                node.loop_nest_for_region(s, &computed, &mut loops);
            }
            b.validate();
            out.push(b);
        }
        out
    }
}

impl fmt::Display for FunctionDAG {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{node}")?;
            for s in &node.stages {
                if !s.incoming_edges.is_empty() {
                    let deps: Vec<String> = s
                        .dependencies
                        .iter()
                        .map(|n| self.node(n).func.name.clone())
                        .collect();
                    writeln!(f, "  {} depends on: {}", s.name, deps.join(", "))?;
                }
            }
        }
        for e in &self.edges {
            let producer = &self.node(e.producer).func.name;
            let consumer = &self.stage(e.consumer).name;
            writeln!(f, "Edge: {producer} -> {consumer}")?;
            e.write_details(f)?;
        }
        Ok(())
    }
}
