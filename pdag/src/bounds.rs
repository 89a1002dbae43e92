// bounds.rs — Symbolic interval analysis
//
// Computes symbolic bounds of expressions given intervals for their free
// variables, and the boxes of every function/image region an expression
// touches. Missing ends (`None`) mean unbounded in that direction.
//
// Preconditions: names in scope refer to integer-valued variables.
// Postconditions: every returned bound is a simplified expression.
// Failure modes: none; unknown quantities yield unbounded intervals.
// Side effects: none.

use std::collections::{BTreeMap, HashMap};

use crate::ir::{walk, BinOp, CallKind, Expr, Func, IrVisitor, Type};
use crate::scope::Scope;
use crate::simplify::simplify;

// ── Interval ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub min: Option<Expr>,
    pub max: Option<Expr>,
}

impl Interval {
    pub fn new(min: Expr, max: Expr) -> Self {
        Interval {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn everything() -> Self {
        Interval {
            min: None,
            max: None,
        }
    }

    pub fn single_point(e: Expr) -> Self {
        Interval::new(e.clone(), e)
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    pub fn is_single_point(&self) -> bool {
        matches!((&self.min, &self.max), (Some(a), Some(b)) if a == b)
    }

    /// Full range of `t`, if it is an integer type narrow enough to be a
    /// useful bound.
    pub fn type_range(t: Type) -> Self {
        if t.is_float() || (t.bits >= 32 && t.is_int()) || t.bits >= 64 {
            return Interval::everything();
        }
        match (t.min_value(), t.max_value()) {
            (Some(lo), Some(hi)) => Interval::new(Expr::Int(lo, t), Expr::Int(hi, t)),
            _ => Interval::everything(),
        }
    }

    /// Grow to cover `other` as well.
    pub fn include(&mut self, other: &Interval) {
        self.min = lift(&self.min, &other.min, |a, b| simplify(&Expr::min(a, b)));
        self.max = lift(&self.max, &other.max, |a, b| simplify(&Expr::max(a, b)));
    }

    pub fn union(a: &Interval, b: &Interval) -> Interval {
        let mut r = a.clone();
        r.include(b);
        r
    }

    pub fn simplified(&self) -> Interval {
        Interval {
            min: self.min.as_ref().map(simplify),
            max: self.max.as_ref().map(simplify),
        }
    }
}

fn lift(a: &Option<Expr>, b: &Option<Expr>, f: impl Fn(Expr, Expr) -> Expr) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a.clone(), b.clone())),
        _ => None,
    }
}

/// Per-dimension region of a function or image.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub bounds: Vec<Interval>,
}

pub type FuncValueBounds = HashMap<String, Interval>;

// ── Bounds of an expression ──────────────────────────────────────────────

fn bool_range() -> Interval {
    Interval::new(Expr::bool_lit(false), Expr::bool_lit(true))
}

fn point_op(a: &Interval, b: &Interval, op: BinOp) -> Option<Interval> {
    match (a, b) {
        (
            Interval {
                min: Some(x),
                max: Some(x2),
            },
            Interval {
                min: Some(y),
                max: Some(y2),
            },
        ) if x == x2 && y == y2 => Some(Interval::single_point(Expr::bin(
            op,
            x.clone(),
            y.clone(),
        ))),
        _ => None,
    }
}

fn scale(a: &Interval, c: &Expr, positive: bool, op: BinOp) -> Interval {
    let apply = |e: &Option<Expr>| e.as_ref().map(|e| Expr::bin(op, e.clone(), c.clone()));
    if positive {
        Interval {
            min: apply(&a.min),
            max: apply(&a.max),
        }
    } else {
        Interval {
            min: apply(&a.max),
            max: apply(&a.min),
        }
    }
}

fn corners(a: &Interval, b: &Interval, op: BinOp) -> Interval {
    let (Some(a0), Some(a1), Some(b0), Some(b1)) = (&a.min, &a.max, &b.min, &b.max) else {
        return Interval::everything();
    };
    let ps = [
        Expr::bin(op, a0.clone(), b0.clone()),
        Expr::bin(op, a0.clone(), b1.clone()),
        Expr::bin(op, a1.clone(), b0.clone()),
        Expr::bin(op, a1.clone(), b1.clone()),
    ];
    let lo = ps.iter().cloned().reduce(Expr::min);
    let hi = ps.into_iter().reduce(Expr::max);
    Interval { min: lo, max: hi }
}

fn cast_bounds(t: Type, from: Type, a: Interval) -> Interval {
    if a.is_single_point() {
        return Interval {
            min: a.min.map(|e| Expr::cast(t, e)),
            max: a.max.map(|e| Expr::cast(t, e)),
        };
    }
    let widening = match (from.min_value(), from.max_value(), t.min_value(), t.max_value()) {
        _ if t.is_float() => true,
        _ if from.is_float() => false,
        (Some(flo), Some(fhi), Some(tlo), Some(thi)) => tlo <= flo && fhi <= thi,
        _ => false,
    };
    if widening {
        Interval {
            min: a.min.map(|e| Expr::cast(t, e)),
            max: a.max.map(|e| Expr::cast(t, e)),
        }
    } else {
        Interval::type_range(t)
    }
}

/// Symbolic bounds of `e` when each variable in `scope` ranges over its
/// interval. Variables not in scope are treated as single points.
pub fn bounds_of_expr_in_scope(
    e: &Expr,
    scope: &Scope<Interval>,
    fvb: &FuncValueBounds,
) -> Interval {
    bounds_of(e, scope, fvb).simplified()
}

fn bounds_of(e: &Expr, scope: &Scope<Interval>, fvb: &FuncValueBounds) -> Interval {
    match e {
        Expr::Int(..) | Expr::Float(..) => Interval::single_point(e.clone()),
        Expr::Var(v) => scope
            .get(&v.name)
            .cloned()
            .unwrap_or_else(|| Interval::single_point(e.clone())),
        Expr::Cast(t, v) => cast_bounds(*t, v.ty(), bounds_of(v, scope, fvb)),
        Expr::Bin(op, a, b) => {
            let ia = bounds_of(a, scope, fvb);
            let ib = bounds_of(b, scope, fvb);
            if let Some(p) = point_op(&ia, &ib, *op) {
                return p;
            }
            bin_bounds(*op, ia, ib, a, b)
        }
        Expr::Not(_) => bool_range(),
        Expr::Select(_, t, f) => {
            Interval::union(&bounds_of(t, scope, fvb), &bounds_of(f, scope, fvb))
        }
        Expr::Let(name, value, body) => {
            let iv = bounds_of(value, scope, fvb);
            let mut inner = Scope::with_parent(scope);
            inner.push(name.clone(), iv);
            bounds_of(body, &inner, fvb)
        }
        Expr::Call(c) => match c.kind {
            CallKind::Intrinsic if c.name == "likely" && c.args.len() == 1 => {
                bounds_of(&c.args[0], scope, fvb)
            }
            CallKind::Intrinsic => {
                let all_points = c
                    .args
                    .iter()
                    .all(|a| bounds_of(a, scope, fvb).is_single_point());
                if all_points {
                    let args = c
                        .args
                        .iter()
                        .map(|a| bounds_of(a, scope, fvb).min.unwrap_or_else(|| a.clone()))
                        .collect();
                    Interval::single_point(Expr::call(c.name.clone(), c.ty, args, c.kind))
                } else {
                    Interval::type_range(c.ty)
                }
            }
            CallKind::Func => fvb
                .get(&c.name)
                .cloned()
                .unwrap_or_else(|| Interval::type_range(c.ty)),
            CallKind::Image => Interval::type_range(c.ty),
        },
    }
}

fn point_constant(e: &Expr, i: &Interval) -> Option<i64> {
    e.as_const_int().or_else(|| match (&i.min, &i.max) {
        (Some(lo), Some(hi)) if lo == hi => lo.as_const_int(),
        _ => None,
    })
}

fn bin_bounds(op: BinOp, a: Interval, b: Interval, a_expr: &Expr, b_expr: &Expr) -> Interval {
    let constant = point_constant(b_expr, &b);
    match op {
        BinOp::Add => Interval {
            min: lift(&a.min, &b.min, |x, y| x + y),
            max: lift(&a.max, &b.max, |x, y| x + y),
        },
        BinOp::Sub => Interval {
            min: lift(&a.min, &b.max, |x, y| x - y),
            max: lift(&a.max, &b.min, |x, y| x - y),
        },
        BinOp::Mul => match (point_constant(a_expr, &a), constant) {
            (_, Some(c)) => scale(&a, &Expr::Int(c, b_expr.ty()), c >= 0, BinOp::Mul),
            (Some(c), None) => scale(&b, &Expr::Int(c, a_expr.ty()), c >= 0, BinOp::Mul),
            (None, None) => corners(&a, &b, BinOp::Mul),
        },
        BinOp::Div => match constant {
            Some(0) => Interval::single_point(Expr::zero(b_expr.ty())),
            Some(c) => scale(&a, &Expr::Int(c, b_expr.ty()), c > 0, BinOp::Div),
            None => Interval::everything(),
        },
        BinOp::Mod => match constant {
            Some(c) if c != 0 && !b_expr.ty().is_float() => Interval::new(
                Expr::zero(b_expr.ty()),
                Expr::Int(c.abs() - 1, b_expr.ty()),
            ),
            _ => Interval::everything(),
        },
        BinOp::Min => Interval {
            min: lift(&a.min, &b.min, Expr::min),
            max: match (a.max, b.max) {
                (Some(x), Some(y)) => Some(Expr::min(x, y)),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            },
        },
        BinOp::Max => Interval {
            min: match (a.min, b.min) {
                (Some(x), Some(y)) => Some(Expr::max(x, y)),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            },
            max: lift(&a.max, &b.max, Expr::max),
        },
        _ => bool_range(),
    }
}

// ── Boxes required ───────────────────────────────────────────────────────

struct BoxesTouched<'a, 'p> {
    scope: Scope<'p, Interval>,
    fvb: &'a FuncValueBounds,
    boxes: BTreeMap<String, Region>,
}

impl IrVisitor for BoxesTouched<'_, '_> {
    fn visit(&mut self, e: &Expr) {
        match e {
            Expr::Let(name, value, body) => {
                self.visit(value);
                let iv = bounds_of(value, &self.scope, self.fvb);
                self.scope.push(name.clone(), iv);
                self.visit(body);
                self.scope.pop(name);
            }
            Expr::Call(c) if matches!(c.kind, CallKind::Func | CallKind::Image) => {
                walk(self, e);
                let bounds: Vec<Interval> = c
                    .args
                    .iter()
                    .map(|a| bounds_of(a, &self.scope, self.fvb).simplified())
                    .collect();
                match self.boxes.get_mut(&c.name) {
                    Some(region) => {
                        for (have, new) in region.bounds.iter_mut().zip(&bounds) {
                            have.include(new);
                        }
                    }
                    None => {
                        self.boxes.insert(c.name.clone(), Region { bounds });
                    }
                }
            }
            _ => walk(self, e),
        }
    }
}

/// Region of every function and image called by any of `exprs`.
pub fn boxes_required(
    exprs: &[Expr],
    scope: &Scope<Interval>,
    fvb: &FuncValueBounds,
) -> BTreeMap<String, Region> {
    let mut v = BoxesTouched {
        scope: Scope::with_parent(scope),
        fvb,
        boxes: BTreeMap::new(),
    };
    for e in exprs {
        v.visit(e);
    }
    v.boxes
}

/// Bounds on the values of every function in `order` (producers first).
/// Pure single-definition functions get the bounds of their value over all
/// coordinates; everything else falls back to the range of its type.
pub fn func_value_bounds<'a>(order: impl IntoIterator<Item = &'a Func>) -> FuncValueBounds {
    let mut fvb = FuncValueBounds::new();
    for f in order {
        let ty = f.definition.values.first().map(Expr::ty).unwrap_or(Type::int(32));
        let interval = if f.updates.is_empty() && !f.is_extern && f.definition.values.len() == 1 {
            let mut scope = Scope::new();
            for a in &f.args {
                scope.push(a.clone(), Interval::everything());
            }
            let b = bounds_of_expr_in_scope(&f.definition.values[0], &scope, &fvb);
            if b.is_bounded() {
                b
            } else {
                let mut r = Interval::type_range(ty);
                if b.min.is_some() {
                    r.min = b.min;
                }
                if b.max.is_some() {
                    r.max = b.max;
                }
                r
            }
        } else {
            Interval::type_range(ty)
        };
        fvb.insert(f.name.clone(), interval);
    }
    fvb
}
