// simplify.rs — Canonicalizing simplifier and common-subexpression elimination
//
// The simplifier folds constants and puts signed integer arithmetic into a
// canonical sum-of-terms form: `a*c0 + b*c1 + ... + k`, terms ordered by their
// printed form, the constant last. Bound expressions produced by `bounds`
// therefore come out as `v`, `v + c`, `v*c` or `v*c + c` whenever they are
// affine, which is what the affine classifier pattern-matches.
//
// Preconditions: expressions are well typed.
// Postconditions: `simplify` is idempotent on its own output.
// Failure modes: none; division and modulus by zero fold to zero.
// Side effects: none.

use std::collections::HashMap;

use crate::ir::{substitute, BinOp, Expr, FloatLit, Type};
use crate::scope::Scope;

// ── Entry points ─────────────────────────────────────────────────────────

pub fn simplify(e: &Expr) -> Expr {
    let e = e.map_children(simplify);
    simplify_node(e)
}

/// Evaluate `e` to an integer constant, if it simplifies to one.
pub fn eval_int(e: &Expr) -> Option<i64> {
    simplify(e).as_const_int()
}

fn simplify_node(e: Expr) -> Expr {
    match e {
        Expr::Cast(t, v) => simplify_cast(t, *v),
        Expr::Bin(op, a, b) => simplify_bin(op, *a, *b),
        Expr::Not(v) => match *v {
            Expr::Int(c, t) => Expr::Int((c == 0) as i64, t),
            Expr::Not(inner) => *inner,
            v => Expr::Not(Box::new(v)),
        },
        Expr::Select(c, t, f) => match c.as_const_int() {
            Some(0) => *f,
            Some(_) => *t,
            None if t == f => *t,
            None => Expr::Select(c, t, f),
        },
        Expr::Let(name, value, body) => {
            if matches!(*value, Expr::Int(..) | Expr::Float(..) | Expr::Var(_)) {
                let mut map = HashMap::new();
                map.insert(name, *value);
                simplify(&substitute(&map, &body))
            } else if !crate::ir::uses_var(&body, &name, &Scope::new()) {
                *body
            } else {
                Expr::Let(name, value, body)
            }
        }
        other => other,
    }
}

// ── Integer helpers ──────────────────────────────────────────────────────

/// Integer literal wrapped to the width of `t`.
fn make_int(v: i64, t: Type) -> Expr {
    let v = if t.bits >= 64 {
        v
    } else if t.is_int() {
        let shift = 64 - t.bits as u32;
        (v << shift) >> shift
    } else {
        v & ((1i64 << t.bits) - 1)
    };
    Expr::Int(v, t)
}

fn div_euclid(a: i64, b: i64) -> i64 {
    if b == 0 {
        0
    } else {
        a.wrapping_div_euclid(b)
    }
}

fn mod_euclid(a: i64, b: i64) -> i64 {
    if b == 0 {
        0
    } else {
        a.wrapping_rem_euclid(b)
    }
}

// ── Linear forms ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Term {
    key: String,
    atom: Expr,
    coeff: i64,
}

/// `sum(atom_i * coeff_i) + constant` over signed integers.
#[derive(Debug, Clone, Default)]
struct Linear {
    terms: Vec<Term>,
    constant: i64,
}

impl Linear {
    fn of(e: &Expr) -> Linear {
        match e {
            Expr::Int(v, _) => Linear {
                terms: Vec::new(),
                constant: *v,
            },
            Expr::Bin(BinOp::Add, a, b) => Linear::of(a).plus(Linear::of(b), 1),
            Expr::Bin(BinOp::Sub, a, b) => Linear::of(a).plus(Linear::of(b), -1),
            Expr::Bin(BinOp::Mul, a, b) => match (a.as_const_int(), b.as_const_int()) {
                (_, Some(c)) => Linear::of(a).scaled(c),
                (Some(c), _) => Linear::of(b).scaled(c),
                _ => Linear::atom(e),
            },
            _ => Linear::atom(e),
        }
    }

    fn atom(e: &Expr) -> Linear {
        Linear {
            terms: vec![Term {
                key: e.to_string(),
                atom: e.clone(),
                coeff: 1,
            }],
            constant: 0,
        }
    }

    fn plus(mut self, other: Linear, sign: i64) -> Linear {
        self.constant = self
            .constant
            .wrapping_add(other.constant.wrapping_mul(sign));
        for t in other.terms {
            let coeff = t.coeff.wrapping_mul(sign);
            match self.terms.iter_mut().find(|s| s.atom == t.atom) {
                Some(s) => s.coeff = s.coeff.wrapping_add(coeff),
                None => self.terms.push(Term { coeff, ..t }),
            }
        }
        self.terms.retain(|t| t.coeff != 0);
        self
    }

    fn scaled(mut self, c: i64) -> Linear {
        self.constant = self.constant.wrapping_mul(c);
        for t in &mut self.terms {
            t.coeff = t.coeff.wrapping_mul(c);
        }
        self.terms.retain(|t| t.coeff != 0);
        self
    }

    fn divisible_by(&self, c: i64) -> bool {
        c > 0 && self.constant % c == 0 && self.terms.iter().all(|t| t.coeff % c == 0)
    }

    fn rebuild(mut self, ty: Type) -> Expr {
        self.terms.sort_by(|a, b| a.key.cmp(&b.key));
        // Lead with a positive term when there is one, so that the rest can be
        // expressed as additions and subtractions.
        if let Some(i) = self.terms.iter().position(|t| t.coeff > 0) {
            let lead = self.terms.remove(i);
            self.terms.insert(0, lead);
        }
        let mut terms = self.terms.into_iter();
        let mut acc = match terms.next() {
            None => return make_int(self.constant, ty),
            Some(t) if t.coeff == 1 => t.atom,
            Some(t) => Expr::bin(BinOp::Mul, t.atom, make_int(t.coeff, ty)),
        };
        for t in terms {
            let (op, mag) = if t.coeff > 0 {
                (BinOp::Add, t.coeff)
            } else {
                (BinOp::Sub, t.coeff.wrapping_neg())
            };
            let term = if mag == 1 {
                t.atom
            } else {
                Expr::bin(BinOp::Mul, t.atom, make_int(mag, ty))
            };
            acc = Expr::bin(op, acc, term);
        }
        if self.constant != 0 {
            acc = Expr::bin(BinOp::Add, acc, make_int(self.constant, ty));
        }
        acc
    }

    /// `a - b` when it is a known constant.
    fn constant_difference(a: &Expr, b: &Expr) -> Option<i64> {
        let d = Linear::of(a).plus(Linear::of(b), -1);
        d.terms.is_empty().then_some(d.constant)
    }
}

// ── Node rules ───────────────────────────────────────────────────────────

fn simplify_cast(t: Type, v: Expr) -> Expr {
    if v.ty() == t {
        return v;
    }
    match v {
        Expr::Int(c, _) if t.is_float() => Expr::Float(FloatLit(c as f64), t),
        Expr::Int(c, _) if t.is_bool() => Expr::Int((c != 0) as i64, t),
        Expr::Int(c, _) => make_int(c, t),
        Expr::Float(c, _) if t.is_float() => Expr::Float(c, t),
        Expr::Float(c, _) if t.is_bool() => Expr::Int((c.0 != 0.0) as i64, t),
        Expr::Float(c, _) => make_int(c.0 as i64, t),
        v => Expr::cast(t, v),
    }
}

fn fold_int(op: BinOp, a: i64, b: i64, t: Type) -> Option<Expr> {
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => div_euclid(a, b),
        BinOp::Mod => mod_euclid(a, b),
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::EQ => return Some(Expr::bool_lit(a == b)),
        BinOp::NE => return Some(Expr::bool_lit(a != b)),
        BinOp::LT => return Some(Expr::bool_lit(a < b)),
        BinOp::LE => return Some(Expr::bool_lit(a <= b)),
        BinOp::GT => return Some(Expr::bool_lit(a > b)),
        BinOp::GE => return Some(Expr::bool_lit(a >= b)),
        BinOp::And => return Some(Expr::bool_lit(a != 0 && b != 0)),
        BinOp::Or => return Some(Expr::bool_lit(a != 0 || b != 0)),
    };
    Some(make_int(v, t))
}

fn fold_float(op: BinOp, a: f64, b: f64, t: Type) -> Option<Expr> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::EQ => return Some(Expr::bool_lit(a == b)),
        BinOp::NE => return Some(Expr::bool_lit(a != b)),
        BinOp::LT => return Some(Expr::bool_lit(a < b)),
        BinOp::LE => return Some(Expr::bool_lit(a <= b)),
        BinOp::GT => return Some(Expr::bool_lit(a > b)),
        BinOp::GE => return Some(Expr::bool_lit(a >= b)),
        BinOp::And | BinOp::Or => return None,
    };
    Some(Expr::Float(FloatLit(v), t))
}

fn is_commutative(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add | BinOp::Mul | BinOp::Min | BinOp::Max | BinOp::EQ | BinOp::NE
    )
}

fn simplify_bin(op: BinOp, a: Expr, b: Expr) -> Expr {
    let ty = a.ty();

    // Constant folding.
    match (&a, &b) {
        (Expr::Int(x, _), Expr::Int(y, _)) => {
            if let Some(e) = fold_int(op, *x, *y, ty) {
                return e;
            }
        }
        (Expr::Float(x, _), Expr::Float(y, _)) => {
            if let Some(e) = fold_float(op, x.0, y.0, ty) {
                return e;
            }
        }
        _ => {}
    }

    // Comparisons are kept in `<` / `<=` form.
    match op {
        BinOp::GT => return simplify_bin(BinOp::LT, b, a),
        BinOp::GE => return simplify_bin(BinOp::LE, b, a),
        _ => {}
    }

    let linear = ty.is_int();

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul if linear => {
            Linear::of(&Expr::bin(op, a, b)).rebuild(ty)
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            simplify_arith(op, a, b, ty)
        }
        BinOp::Min | BinOp::Max => simplify_min_max(op, a, b),
        BinOp::EQ | BinOp::NE | BinOp::LT | BinOp::LE => {
            if a == b {
                return Expr::bool_lit(matches!(op, BinOp::EQ | BinOp::LE));
            }
            if linear {
                if let Some(d) = Linear::constant_difference(&a, &b) {
                    return Expr::bool_lit(match op {
                        BinOp::EQ => d == 0,
                        BinOp::NE => d != 0,
                        BinOp::LT => d < 0,
                        _ => d <= 0,
                    });
                }
            }
            Expr::bin(op, a, b)
        }
        BinOp::And => match (a.as_const_int(), b.as_const_int()) {
            (Some(0), _) | (_, Some(0)) => Expr::bool_lit(false),
            (Some(_), _) => b,
            (_, Some(_)) => a,
            _ if a == b => a,
            _ => Expr::bin(op, a, b),
        },
        BinOp::Or => match (a.as_const_int(), b.as_const_int()) {
            (Some(0), _) => b,
            (_, Some(0)) => a,
            (Some(_), _) | (_, Some(_)) => Expr::bool_lit(true),
            _ if a == b => a,
            _ => Expr::bin(op, a, b),
        },
        BinOp::GT | BinOp::GE => unreachable!("rewritten above"),
    }
}

fn simplify_arith(op: BinOp, a: Expr, b: Expr, ty: Type) -> Expr {
    if is_commutative(op) && a.is_const() && !b.is_const() {
        return simplify_arith(op, b, a, ty);
    }
    let is_zero = |e: &Expr| matches!(e, Expr::Int(0, _)) || matches!(e, Expr::Float(f, _) if f.0 == 0.0);
    let is_one = |e: &Expr| matches!(e, Expr::Int(1, _)) || matches!(e, Expr::Float(f, _) if f.0 == 1.0);
    match op {
        BinOp::Add | BinOp::Sub if is_zero(&b) => a,
        BinOp::Mul | BinOp::Div if is_one(&b) => a,
        BinOp::Mul if is_zero(&b) && !ty.is_float() => b,
        BinOp::Mod if is_one(&b) && !ty.is_float() => Expr::zero(ty),
        BinOp::Div | BinOp::Mod if ty.is_int() => {
            let c = match b.as_const_int() {
                Some(c) => c,
                None => return Expr::bin(op, a, b),
            };
            let lin = Linear::of(&a);
            if !lin.divisible_by(c) {
                return Expr::bin(op, a, b);
            }
            if op == BinOp::Mod {
                return make_int(0, ty);
            }
            let Linear { terms, constant } = lin;
            Linear {
                terms: terms
                    .into_iter()
                    .map(|t| Term {
                        coeff: t.coeff / c,
                        ..t
                    })
                    .collect(),
                constant: constant / c,
            }
            .rebuild(ty)
        }
        _ => Expr::bin(op, a, b),
    }
}

fn simplify_min_max(op: BinOp, a: Expr, b: Expr) -> Expr {
    let is_min = op == BinOp::Min;
    if a == b {
        return a;
    }
    // min(min(x, y), x) -> min(x, y)
    if let Expr::Bin(inner, x, y) = &a {
        if *inner == op && (**x == b || **y == b) {
            return a;
        }
    }
    if let Expr::Bin(inner, x, y) = &b {
        if *inner == op && (**x == a || **y == a) {
            return b;
        }
    }
    if a.is_const() && !b.is_const() {
        return simplify_min_max(op, b, a);
    }
    if a.ty().is_int() {
        if let Some(d) = Linear::constant_difference(&a, &b) {
            return if (d <= 0) == is_min { a } else { b };
        }
    }
    // min(min(x, c0), c1) -> min(x, min(c0, c1))
    if let (Expr::Bin(inner, x, c0), Some(c1)) = (&a, b.as_const_int()) {
        if *inner == op {
            if let Some(c0) = c0.as_const_int() {
                let c = if is_min { c0.min(c1) } else { c0.max(c1) };
                return Expr::bin(op, (**x).clone(), make_int(c, b.ty()));
            }
        }
    }
    Expr::bin(op, a, b)
}

// ── Common-subexpression elimination ─────────────────────────────────────

fn is_leaf(e: &Expr) -> bool {
    matches!(e, Expr::Int(..) | Expr::Float(..) | Expr::Var(_))
}

/// Lift every non-trivial subexpression that occurs more than once into a
/// `let` named `cse$N`. Innermost shared subexpressions are bound first.
/// Subtrees under an existing `let` are left alone.
pub fn common_subexpression_elimination(e: &Expr) -> Expr {
    let mut counts: HashMap<Expr, usize> = HashMap::new();
    let mut order: Vec<Expr> = Vec::new();
    count_uses(e, &mut counts, &mut order);

    let shared: Vec<Expr> = order.into_iter().filter(|x| counts[x] >= 2).collect();
    if shared.is_empty() {
        return e.clone();
    }

    let mut names: HashMap<Expr, Expr> = HashMap::new();
    let mut bindings = Vec::with_capacity(shared.len());
    for (i, s) in shared.iter().enumerate() {
        let value = s.map_children(|c| replace_shared(c, &names));
        let name = format!("cse${i}");
        names.insert(s.clone(), Expr::typed_var(name.clone(), s.ty()));
        bindings.push((name, value));
    }

    let mut body = replace_shared(e, &names);
    for (name, value) in bindings.into_iter().rev() {
        body = Expr::let_in(name, value, body);
    }
    body
}

/// Count occurrences without descending into subtrees already seen, and
/// record first-visit completion (post-) order.
fn count_uses(e: &Expr, counts: &mut HashMap<Expr, usize>, order: &mut Vec<Expr>) {
    if is_leaf(e) || matches!(e, Expr::Let(..)) {
        return;
    }
    if let Some(n) = counts.get_mut(e) {
        *n += 1;
        return;
    }
    for c in e.children() {
        count_uses(c, counts, order);
    }
    counts.insert(e.clone(), 1);
    order.push(e.clone());
}

fn replace_shared(e: &Expr, names: &HashMap<Expr, Expr>) -> Expr {
    if let Some(v) = names.get(e) {
        return v.clone();
    }
    if matches!(e, Expr::Let(..)) {
        return e.clone();
    }
    e.map_children(|c| replace_shared(c, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallKind, Type};

    fn x() -> Expr {
        Expr::var("x")
    }

    fn y() -> Expr {
        Expr::var("y")
    }

    #[test]
    fn folds_constants() {
        assert_eq!(simplify(&(Expr::int(3) + Expr::int(4))), Expr::int(7));
        assert_eq!(simplify(&(Expr::int(-7) / Expr::int(2))), Expr::int(-4));
        assert_eq!(simplify(&(Expr::int(-7) % Expr::int(2))), Expr::int(1));
        assert_eq!(simplify(&(Expr::int(5) / Expr::int(0))), Expr::int(0));
    }

    #[test]
    fn canonical_affine_shapes() {
        assert_eq!(simplify(&(x() - 1)), x() + Expr::int(-1));
        assert_eq!(simplify(&(Expr::int(3) + x() * 2)), x() * 2 + 3);
        assert_eq!(simplify(&((x() + 1) * 2 - 2)), x() * 2);
        assert_eq!(simplify(&(x() + 1 - x())), Expr::int(1));
    }

    #[test]
    fn terms_ordered_by_name() {
        assert_eq!(simplify(&(y() + x())), x() + y());
        assert_eq!(simplify(&(y() - x())), y() - x());
    }

    #[test]
    fn min_max_of_offsets() {
        assert_eq!(simplify(&Expr::min(x(), x() + 1)), x());
        assert_eq!(simplify(&Expr::max(x() + Expr::int(-1), x() + 1)), x() + 1);
        assert_eq!(simplify(&Expr::min(Expr::int(0), x())), Expr::min(x(), Expr::int(0)));
        assert_eq!(
            simplify(&Expr::min(Expr::min(x(), Expr::int(5)), Expr::int(3))),
            Expr::min(x(), Expr::int(3))
        );
    }

    #[test]
    fn repeated_min_max_operands_collapse() {
        let a = x() * 2;
        let b = y() * 2;
        let nested = Expr::min(Expr::min(Expr::min(a.clone(), b.clone()), a.clone()), b.clone());
        assert_eq!(simplify(&nested), simplify(&Expr::min(a.clone(), b.clone())));
        let nested = Expr::max(a.clone(), Expr::max(b.clone(), a.clone()));
        assert_eq!(simplify(&nested), simplify(&Expr::max(b, a)));
    }

    #[test]
    fn exact_division() {
        assert_eq!(simplify(&((x() * 4 + 8) / 4)), x() + 2);
        assert_eq!(simplify(&(x() / 2)), x() / 2);
        assert_eq!(simplify(&((x() * 4 + 2) % 2)), Expr::int(0));
    }

    #[test]
    fn comparisons_normalized() {
        assert_eq!(
            simplify(&Expr::bin(BinOp::GT, x(), y())),
            Expr::bin(BinOp::LT, y(), x())
        );
        assert_eq!(
            simplify(&Expr::bin(BinOp::LT, x(), x() + 1)),
            Expr::bool_lit(true)
        );
    }

    #[test]
    fn select_and_let() {
        let s = Expr::select(Expr::bool_lit(true), x(), y());
        assert_eq!(simplify(&s), x());
        let l = Expr::let_in("t", Expr::int(2), Expr::var("t") * x());
        assert_eq!(simplify(&l), x() * 2);
        let unused = Expr::let_in("t", x() * y(), y());
        assert_eq!(simplify(&unused), y());
    }

    #[test]
    fn casts_wrap() {
        assert_eq!(
            simplify(&Expr::cast(Type::uint(8), Expr::int(300))),
            Expr::Int(44, Type::uint(8))
        );
        assert_eq!(
            simplify(&Expr::cast(Type::int(8), Expr::int(200))),
            Expr::Int(-56, Type::int(8))
        );
    }

    #[test]
    fn cse_lifts_repeated_call() {
        let call = Expr::call("f", Type::int(32), vec![x() + 1], CallKind::Func);
        let e = Expr::bin(BinOp::Mul, call.clone(), call.clone());
        let c = common_subexpression_elimination(&e);
        let v = Expr::var("cse$0");
        assert_eq!(c, Expr::let_in("cse$0", call, Expr::bin(BinOp::Mul, v.clone(), v)));
    }

    #[test]
    fn cse_leaves_unique_trees() {
        let e = x() * y() + (x() + 1);
        assert_eq!(common_subexpression_elimination(&e), e);
    }

    #[test]
    fn cse_binds_inner_first() {
        let inner = x() * y();
        let outer = Expr::min(inner.clone(), Expr::int(4));
        let e = outer.clone() + outer + inner * 3;
        let c = common_subexpression_elimination(&e);
        match &c {
            Expr::Let(n0, v0, body) => {
                assert_eq!(n0, "cse$0");
                assert_eq!(**v0, x() * y());
                let Expr::Let(n1, v1, _) = body.as_ref() else {
                    panic!("expected nested let, got {c}");
                };
                assert_eq!(n1, "cse$1");
                assert_eq!(**v1, Expr::min(Expr::var("cse$0"), Expr::int(4)));
            }
            other => panic!("expected let, got {other}"),
        }
    }
}
