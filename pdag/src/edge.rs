// edge.rs — Producer to consumer-stage dependencies
//
// An edge records, per producer dimension, the min and max of the region the
// consumer stage reads, as `BoundInfo`s over the consumer's loop
// placeholders, plus the merged load Jacobians of every call site.

use std::collections::HashMap;
use std::fmt;

use crate::affine::BoundInfo;
use crate::id::{NodeId, StageRef};
use crate::ir::{substitute, Expr};
use crate::jacobian::LoadJacobian;
use crate::simplify::simplify;
use crate::span::{Span, SymbolicInterval};

#[derive(Debug, Clone)]
pub struct Edge {
    pub producer: NodeId,
    pub consumer: StageRef,
    /// `(min, max)` per producer dimension.
    pub bounds: Vec<(BoundInfo, BoundInfo)>,
    pub load_jacobians: Vec<LoadJacobian>,
    pub all_bounds_affine: bool,
    /// Number of calls to the producer in the consumer's definition.
    pub calls: usize,
    /// Placeholders of the consumer stage's loops, in loop order.
    pub consumer_loops: Vec<SymbolicInterval>,
}

impl Edge {
    /// Fold `j` into an identical Jacobian if there is one, else append it.
    pub fn add_load_jacobian(&mut self, j: LoadJacobian) {
        for existing in &mut self.load_jacobians {
            if existing.merge(&j) {
                return;
            }
        }
        self.load_jacobians.push(j);
    }

    /// Union into `producer_required` the region this edge reads when the
    /// consumer's loops span `consumer_loop`.
    ///
    /// Panics if a non-affine bound does not reduce to an integer.
    pub fn expand_footprint(&self, consumer_loop: &[Span], producer_required: &mut [Span]) {
        let mut s: HashMap<String, Expr> = HashMap::new();
        if !self.all_bounds_affine {
            for (sym, span) in self.consumer_loops.iter().zip(consumer_loop) {
                s.insert(sym.min_name().to_string(), Expr::int(span.min()));
                s.insert(sym.max_name().to_string(), Expr::int(span.max()));
            }
        }

        for (i, (lo, hi)) in self.bounds.iter().enumerate() {
            let mut bounds_are_constant = true;
            let mut get_bound = |b: &BoundInfo| -> i64 {
                bounds_are_constant &= !b.depends_on_estimate;
                if b.affine {
                    if b.coeff == 0 {
                        return b.constant;
                    }
                    let src = &consumer_loop[b.consumer_dim];
                    bounds_are_constant &= src.constant_extent();
                    b.eval_affine(src.min(), src.max())
                } else {
                    let substituted = substitute(&s, &b.expr);
                    let e = simplify(&substituted);
                    let Some(v) = e.as_const_int() else {
                        panic!(
                            "Should be constant: {} -> {} -> {}",
                            b.expr, substituted, e
                        );
                    };
                    bounds_are_constant = false;
                    v
                }
            };
            let a = get_bound(lo);
            let b = get_bound(hi);
            producer_required[i].union_with(&Span::new(a, b, bounds_are_constant));
        }
    }
}

impl Edge {
    /// Everything but the header line, shared with the graph dump.
    pub(crate) fn write_details(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  calls: {}", self.calls)?;
        writeln!(f, "  all_bounds_affine: {}", self.all_bounds_affine)?;
        writeln!(f, "  footprint:")?;
        for (i, (lo, hi)) in self.bounds.iter().enumerate() {
            writeln!(f, "    dim {i}: min = {lo}, max = {hi}")?;
        }
        writeln!(f, "  load jacobians:")?;
        for j in &self.load_jacobians {
            write!(f, "{j}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Edge: {} -> {}", self.producer, self.consumer)?;
        self.write_details(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jacobian::OptionalRational;

    fn loops() -> Vec<SymbolicInterval> {
        vec![
            SymbolicInterval::new("g", "x"),
            SymbolicInterval::new("g", "y"),
        ]
    }

    fn edge(bounds: Vec<(Expr, Expr)>) -> Edge {
        let loops = loops();
        let bounds: Vec<_> = bounds
            .into_iter()
            .map(|(lo, hi)| (BoundInfo::new(lo, &loops, false), BoundInfo::new(hi, &loops, false)))
            .collect();
        let all_bounds_affine = bounds.iter().all(|(a, b)| a.affine && b.affine);
        Edge {
            producer: NodeId(1),
            consumer: StageRef::new(NodeId(0), 0),
            bounds,
            load_jacobians: Vec::new(),
            all_bounds_affine,
            calls: 1,
            consumer_loops: loops,
        }
    }

    #[test]
    fn affine_stencil_footprint() {
        // f(x - 1) .. f(x + 1) over g's x, f(y) over g's y
        let e = edge(vec![
            (
                Expr::var("g.x.min") + Expr::int(-1),
                Expr::var("g.x.max") + 1,
            ),
            (Expr::var("g.y.min"), Expr::var("g.y.max")),
        ]);
        assert!(e.all_bounds_affine);
        let consumer = [Span::new(0, 9, true), Span::new(5, 5, true)];
        let mut required = [Span::empty(), Span::empty()];
        e.expand_footprint(&consumer, &mut required);
        assert_eq!(required[0], Span::new(-1, 10, true));
        assert_eq!(required[1], Span::new(5, 5, true));
    }

    #[test]
    fn footprint_unions_into_existing() {
        let e = edge(vec![(Expr::int(0), Expr::int(3))]);
        let mut required = [Span::new(2, 7, true)];
        e.expand_footprint(&[Span::new(0, 0, true), Span::new(0, 0, true)], &mut required);
        assert_eq!(required[0], Span::new(0, 7, true));
    }

    #[test]
    fn non_affine_bound_substitutes() {
        let e = edge(vec![(
            Expr::var("g.x.min") / 2,
            Expr::var("g.x.max") / 2,
        )]);
        assert!(!e.all_bounds_affine);
        let mut required = [Span::empty()];
        e.expand_footprint(&[Span::new(4, 11, true), Span::new(0, 0, true)], &mut required);
        assert_eq!(required[0], Span::new(2, 5, false));
    }

    #[test]
    fn non_constant_consumer_extent_propagates() {
        let e = edge(vec![(Expr::var("g.x.min"), Expr::var("g.x.max"))]);
        let mut required = [Span::empty()];
        e.expand_footprint(&[Span::new(0, 3, false), Span::new(0, 0, true)], &mut required);
        assert!(!required[0].constant_extent());
    }

    #[test]
    fn estimate_dependence_clears_constant_extent() {
        let loops = loops();
        let mut e = edge(vec![(Expr::int(0), Expr::int(0))]);
        e.bounds[0].1 = BoundInfo::new(Expr::int(99), &loops, true);
        let mut required = [Span::empty()];
        e.expand_footprint(&[Span::new(0, 0, true), Span::new(0, 0, true)], &mut required);
        assert_eq!((required[0].min(), required[0].max()), (0, 99));
        assert!(!required[0].constant_extent());
    }

    #[test]
    fn identical_jacobians_merge() {
        let mut e = edge(vec![(Expr::int(0), Expr::int(0))]);
        let mut j = LoadJacobian::new(1, 2, 1);
        j.set(0, 0, OptionalRational::one());
        e.add_load_jacobian(j.clone());
        e.add_load_jacobian(j.clone());
        e.add_load_jacobian(j);
        assert_eq!(e.load_jacobians.len(), 1);
        assert_eq!(e.load_jacobians[0].count(), 3);

        e.add_load_jacobian(LoadJacobian::new(1, 2, 1));
        assert_eq!(e.load_jacobians.len(), 2);
    }
}
