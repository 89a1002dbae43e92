// affine.rs — Affine classification of edge bounds
//
// Each producer dimension of an edge carries a min and a max bound expressed
// over the consumer's loop placeholders. When a bound is `coeff * v + c` for a
// single placeholder `v`, evaluating it for concrete loop bounds is plain
// integer arithmetic; otherwise callers fall back to substitution.

use std::fmt;

use crate::ir::{BinOp, Expr};
use crate::span::SymbolicInterval;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundInfo {
    /// The simplified bound.
    pub expr: Expr,
    /// `expr == coeff * loop[consumer_dim].{min|max} + constant`.
    pub affine: bool,
    pub coeff: i64,
    pub constant: i64,
    pub consumer_dim: usize,
    /// Binds to the max placeholder of the loop rather than the min.
    pub uses_max: bool,
    /// The bound referenced a pipeline parameter before its estimate was
    /// substituted.
    pub depends_on_estimate: bool,
}

impl BoundInfo {
    /// Classify `e` against the placeholders of the consumer's loops.
    ///
    /// Panics if `e` has an affine shape but its variable is not one of the
    /// consumer's loop placeholders.
    pub fn new(e: Expr, consumer_loops: &[SymbolicInterval], depends_on_estimate: bool) -> Self {
        let mut info = BoundInfo {
            expr: e,
            affine: false,
            coeff: 0,
            constant: 0,
            consumer_dim: 0,
            uses_max: false,
            depends_on_estimate,
        };

        if let Expr::Int(c, _) = info.expr {
            info.affine = true;
            info.constant = c;
            return info;
        }

        let Some((name, coeff, constant)) = match_affine(&info.expr) else {
            log::trace!("bound is non-affine: {}", info.expr);
            return info;
        };

        let found = consumer_loops.iter().enumerate().find_map(|(i, l)| {
            if l.min_name() == name {
                Some((i, false))
            } else if l.max_name() == name {
                Some((i, true))
            } else {
                None
            }
        });
        let Some((dim, uses_max)) = found else {
            panic!("could not find consumer loop variable: {name}");
        };

        info.affine = true;
        info.coeff = coeff;
        info.constant = constant;
        info.consumer_dim = dim;
        info.uses_max = uses_max;
        log::trace!(
            "bound is affine: {} == {} * {} + {}",
            info.expr,
            name,
            coeff,
            constant
        );
        info
    }

    /// Evaluate against concrete loop bounds `(min, max)` on the affine path.
    pub fn eval_affine(&self, loop_min: i64, loop_max: i64) -> i64 {
        if self.coeff == 0 {
            return self.constant;
        }
        let src = if self.uses_max { loop_max } else { loop_min };
        src * self.coeff + self.constant
    }
}

/// Matches `v`, `v*c`, `v + c` and `v*c + c`, returning `(v, coeff, constant)`.
fn match_affine(e: &Expr) -> Option<(&str, i64, i64)> {
    let (lhs, constant) = match e {
        Expr::Bin(BinOp::Add, a, b) => (a.as_ref(), b.as_const_int()?),
        _ => (e, 0),
    };
    let (v, coeff) = match lhs {
        Expr::Bin(BinOp::Mul, a, b) => (a.as_ref(), b.as_const_int()?),
        _ => (lhs, 1),
    };
    match v {
        Expr::Var(var) => Some((var.name.as_str(), coeff, constant)),
        _ => None,
    }
}

impl fmt::Display for BoundInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.affine {
            return write!(f, "{}", self.expr);
        }
        if self.coeff == 0 {
            return write!(f, "{}", self.constant);
        }
        let end = if self.uses_max { "max" } else { "min" };
        write!(
            f,
            "loop[{}].{} * {} + {}",
            self.consumer_dim, end, self.coeff, self.constant
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loops() -> Vec<SymbolicInterval> {
        vec![
            SymbolicInterval::new("g", "x"),
            SymbolicInterval::new("g", "y"),
        ]
    }

    #[test]
    fn literal_is_affine_with_zero_coeff() {
        let b = BoundInfo::new(Expr::int(5), &loops(), false);
        assert!(b.affine);
        assert_eq!((b.coeff, b.constant, b.consumer_dim), (0, 5, 0));
        assert_eq!(b.eval_affine(100, 200), 5);
    }

    #[test]
    fn scaled_offset_min() {
        let e = Expr::var("g.x.min") * 2 + 3;
        let b = BoundInfo::new(e, &loops(), false);
        assert!(b.affine);
        assert_eq!((b.coeff, b.constant, b.consumer_dim), (2, 3, 0));
        assert!(!b.uses_max);
        assert_eq!(b.eval_affine(10, 20), 23);
    }

    #[test]
    fn plain_max_and_offset() {
        let b = BoundInfo::new(Expr::var("g.y.max"), &loops(), false);
        assert!(b.affine && b.uses_max);
        assert_eq!((b.coeff, b.constant, b.consumer_dim), (1, 0, 1));

        let b = BoundInfo::new(Expr::var("g.y.max") + Expr::int(-1), &loops(), false);
        assert_eq!((b.coeff, b.constant), (1, -1));
        assert_eq!(b.eval_affine(0, 9), 8);
    }

    #[test]
    fn non_affine_shapes() {
        let b = BoundInfo::new(Expr::var("g.x.min") / 2, &loops(), false);
        assert!(!b.affine);
        let b = BoundInfo::new(Expr::min(Expr::var("g.x.min"), Expr::int(0)), &loops(), false);
        assert!(!b.affine);
        let b = BoundInfo::new(Expr::var("g.x.min") * Expr::var("g.y.min"), &loops(), false);
        assert!(!b.affine);
    }

    #[test]
    #[should_panic(expected = "could not find consumer loop variable")]
    fn unknown_placeholder_panics() {
        BoundInfo::new(Expr::var("h.z.min") + 1, &loops(), false);
    }
}
