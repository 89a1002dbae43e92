// node.rs — Pipeline stage-groups and their stages
//
// A `Node` is one function of the pipeline; each of its definitions is a
// `Stage` with its own loop nest. Region and loop bounds are kept both
// symbolically (over the node's region placeholders) and pre-classified so
// that the common cases evaluate without substitution.
//
// Preconditions: nodes are built by `FunctionDAG::new`.
// Postconditions: `required_to_computed` and `loop_nest_for_region` write
//   one `Span` per dimension / loop.
// Failure modes: a bound that does not reduce to an integer panics.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::arena::{Bound, Layout};
use crate::bounds::Interval;
use crate::features::PipelineFeatures;
use crate::id::{EdgeId, NodeId, StageId};
use crate::ir::{substitute, Expr, Func};
use crate::simplify::simplify;
use crate::span::{Span, SymbolicInterval};

// ── Loops and stages ─────────────────────────────────────────────────────

/// One loop of a stage's nest, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub var: String,
    /// Bounds over the node's region placeholders.
    pub min: Expr,
    pub max: Expr,
    pub pure: bool,
    pub rvar: bool,
    /// Index of the pure argument this loop iterates, if any.
    pub pure_dim: Option<usize>,
    /// The loop spans exactly `region_computed[region_computed_dim]`.
    pub equals_region_computed: bool,
    pub region_computed_dim: usize,
    pub bounds_are_constant: bool,
    pub c_min: i64,
    pub c_max: i64,
}

/// Fixed-size bitset over node ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencySet {
    words: Vec<u64>,
}

impl DependencySet {
    pub fn new(num_nodes: usize) -> Self {
        DependencySet {
            words: vec![0; num_nodes.div_ceil(64)],
        }
    }

    pub fn insert(&mut self, n: NodeId) {
        let i = n.index();
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub fn contains(&self, n: NodeId) -> bool {
        let i = n.index();
        self.words
            .get(i / 64)
            .is_some_and(|w| w & (1 << (i % 64)) != 0)
    }

    pub fn union_with(&mut self, other: &DependencySet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64)
                .filter(move |b| w & (1u64 << b) != 0)
                .map(move |b| NodeId((wi * 64 + b) as u32))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    /// `f` for the pure definition, `f.update(N)` for updates.
    pub name: String,
    /// Position within the node: 0 is the pure definition.
    pub index: usize,
    pub loops: Vec<Loop>,
    pub loop_nest_all_common_cases: bool,
    pub vector_size: i64,
    pub features: PipelineFeatures,
    /// Dense id across all stages of the DAG.
    pub id: StageId,
    pub max_id: usize,
    pub incoming_edges: Vec<EdgeId>,
    /// Every node this stage transitively reads from.
    pub dependencies: DependencySet,
}

impl Stage {
    pub fn loop_names(&self) -> Vec<String> {
        self.loops.iter().map(|l| l.var.clone()).collect()
    }

    pub fn downstream_of(&self, n: NodeId) -> bool {
        self.dependencies.contains(n)
    }
}

// ── Nodes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegionComputedInfo {
    /// Region computed over the node's region-required placeholders.
    pub interval: Interval,
    pub depends_on_estimate: bool,
    pub equals_required: bool,
    /// `[min(required.min, c_min), max(required.max, c_max)]`.
    pub equals_union_of_required_with_constants: bool,
    pub c_min: i64,
    pub c_max: i64,
}

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub func: Func,
    pub dimensions: usize,
    pub stages: Vec<Stage>,
    pub region_required: Vec<SymbolicInterval>,
    pub region_computed: Vec<RegionComputedInfo>,
    pub region_computed_all_common_cases: bool,
    /// Output estimates, one per dimension; empty for non-outputs.
    pub estimated_region_required: Vec<Span>,
    pub bytes_per_point: i64,
    pub vector_size: i64,
    pub outgoing_edges: Vec<EdgeId>,
    pub is_output: bool,
    pub is_input: bool,
    pub is_pointwise: bool,
    pub is_boundary_condition: bool,
    pub is_wrapper: bool,
    pub layout: Layout,
}

fn eval_const(e: &Expr, map: &HashMap<String, Expr>, what: &str) -> i64 {
    let v = simplify(&substitute(map, e));
    match v.as_const_int() {
        Some(c) => c,
        None => panic!("{what} did not reduce to an integer: {e} -> {v}"),
    }
}

impl Node {
    pub fn name(&self) -> &str {
        &self.func.name
    }

    fn placeholder_map(&self, spans: &[Span]) -> HashMap<String, Expr> {
        let mut map = HashMap::with_capacity(2 * self.dimensions);
        for (sym, span) in self.region_required.iter().zip(spans) {
            map.insert(sym.min_name().to_string(), Expr::int(span.min()));
            map.insert(sym.max_name().to_string(), Expr::int(span.max()));
        }
        map
    }

    /// Region this node computes when `required` is asked of it.
    pub fn required_to_computed(&self, required: &[Span], computed: &mut [Span]) {
        let map = if self.region_computed_all_common_cases {
            HashMap::new()
        } else {
            self.placeholder_map(required)
        };
        for (i, comp) in self.region_computed.iter().enumerate() {
            computed[i] = if comp.equals_required {
                required[i]
            } else if comp.equals_union_of_required_with_constants {
                Span::new(
                    required[i].min().min(comp.c_min),
                    required[i].max().max(comp.c_max),
                    false,
                )
            } else {
                let (Some(lo), Some(hi)) = (&comp.interval.min, &comp.interval.max) else {
                    panic!("unbounded region computed for {}", self.func.name);
                };
                Span::new(
                    eval_const(lo, &map, "region computed"),
                    eval_const(hi, &map, "region computed"),
                    false,
                )
            };
        }
    }

    /// Loop bounds of `stage` when the node computes `computed`.
    pub fn loop_nest_for_region(&self, stage: usize, computed: &[Span], loops: &mut [Span]) {
        let s = &self.stages[stage];
        let map = if s.loop_nest_all_common_cases {
            HashMap::new()
        } else {
            self.placeholder_map(computed)
        };
        for (i, l) in s.loops.iter().enumerate() {
            loops[i] = if l.equals_region_computed {
                computed[l.region_computed_dim]
            } else if l.bounds_are_constant {
                Span::new(l.c_min, l.c_max, true)
            } else {
                Span::new(
                    eval_const(&l.min, &map, "loop bound"),
                    eval_const(&l.max, &map, "loop bound"),
                    false,
                )
            };
        }
    }

    /// Check out a bound tuple for this node.
    pub fn make_bound(&self) -> Bound<'_> {
        self.layout.make()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node: {} ({})", self.func.name, self.id)?;
        writeln!(f, "  Symbolic region required:")?;
        for r in &self.region_required {
            writeln!(f, "    {}, {}", r.min, r.max)?;
        }
        writeln!(f, "  Region computed:")?;
        for r in &self.region_computed {
            match (&r.interval.min, &r.interval.max) {
                (Some(lo), Some(hi)) => writeln!(f, "    {lo}, {hi}")?,
                _ => writeln!(f, "    unbounded")?,
            }
        }
        if !self.estimated_region_required.is_empty() {
            write!(f, "  Estimate:")?;
            for s in &self.estimated_region_required {
                write!(f, " {s}")?;
            }
            writeln!(f)?;
        }
        for s in &self.stages {
            writeln!(f, "  Stage {}: {}", s.index, s.name)?;
            for l in &s.loops {
                write!(f, "    {} {} {}", l.var, l.min, l.max)?;
                if l.equals_region_computed {
                    write!(f, " (= region computed {})", l.region_computed_dim)?;
                } else if l.bounds_are_constant {
                    write!(f, " (constant [{}, {}])", l.c_min, l.c_max)?;
                }
                writeln!(f)?;
            }
        }
        let flags = [
            ("output", self.is_output),
            ("input", self.is_input),
            ("pointwise", self.is_pointwise),
            ("boundary condition", self.is_boundary_condition),
            ("wrapper", self.is_wrapper),
        ];
        for (name, set) in flags {
            if set {
                writeln!(f, "  {name}")?;
            }
        }
        writeln!(f, "  bytes per point: {}", self.bytes_per_point)?;
        writeln!(f, "  vector size: {}", self.vector_size)
    }
}
