// span.rs — Concrete and symbolic one-dimensional bounds
//
// `Span` is the concrete interval the search loop evaluates bounds into.
// `SymbolicInterval` names the unresolved min/max of a dimension.

use std::fmt;

use crate::ir::Expr;

/// A concrete closed integer interval `[min, max]`. `constant_extent` records
/// whether the extent is known not to vary with the enclosing loop nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    min: i64,
    max: i64,
    constant_extent: bool,
}

impl Span {
    pub fn new(min: i64, max: i64, constant_extent: bool) -> Self {
        Span {
            min,
            max,
            constant_extent,
        }
    }

    /// The identity for `union_with`: contains nothing.
    pub fn empty() -> Self {
        Span::new(i64::MAX, i64::MIN, true)
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Number of points; 0 for an inverted span such as `Span::empty()`.
    pub fn extent(&self) -> i64 {
        if self.max < self.min {
            return 0;
        }
        self.max.saturating_sub(self.min).saturating_add(1)
    }

    pub fn constant_extent(&self) -> bool {
        self.constant_extent
    }

    pub fn union_with(&mut self, other: &Span) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.constant_extent = self.constant_extent && other.constant_extent;
    }

    /// Keep the min, resize to `e` points.
    pub fn set_extent(&mut self, e: i64) {
        self.max = self.min + e - 1;
    }

    pub fn translate(&mut self, d: i64) {
        self.min += d;
        self.max += d;
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::new(0, -1, true)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)?;
        if self.constant_extent {
            write!(f, "c")?;
        }
        Ok(())
    }
}

/// The two placeholder variables `<prefix>.min` and `<prefix>.max` that stand
/// for a dimension's not-yet-known bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicInterval {
    pub min: Expr,
    pub max: Expr,
}

impl SymbolicInterval {
    pub fn new(func: &str, var: &str) -> Self {
        SymbolicInterval {
            min: Expr::var(format!("{func}.{var}.min")),
            max: Expr::var(format!("{func}.{var}.max")),
        }
    }

    pub fn min_name(&self) -> &str {
        match &self.min {
            Expr::Var(v) => &v.name,
            _ => unreachable!("symbolic interval bounds are variables"),
        }
    }

    pub fn max_name(&self) -> &str {
        match &self.max {
            Expr::Var(v) => &v.name,
            _ => unreachable!("symbolic interval bounds are variables"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_extends_and_ands_constness() {
        let mut a = Span::new(0, 9, true);
        a.union_with(&Span::new(5, 20, false));
        assert_eq!((a.min(), a.max()), (0, 20));
        assert!(!a.constant_extent());
        assert_eq!(a.extent(), 21);
    }

    #[test]
    fn empty_is_union_identity() {
        let mut e = Span::empty();
        let s = Span::new(-3, 4, true);
        e.union_with(&s);
        assert_eq!(e, s);
    }

    #[test]
    fn empty_span_has_no_extent() {
        assert_eq!(Span::empty().extent(), 0);
        assert_eq!(Span::default().extent(), 0);
        assert_eq!(Span::new(i64::MIN, i64::MAX, false).extent(), i64::MAX);
    }

    #[test]
    fn extent_and_translate() {
        let mut s = Span::new(10, 19, true);
        s.set_extent(4);
        assert_eq!(s.max(), 13);
        s.translate(-10);
        assert_eq!((s.min(), s.max()), (0, 3));
        assert_eq!(s.to_string(), "[0, 3]c");
    }

    #[test]
    fn placeholder_names() {
        let si = SymbolicInterval::new("blur", "x");
        assert_eq!(si.min_name(), "blur.x.min");
        assert_eq!(si.max_name(), "blur.x.max");
    }
}
