// ir.rs — Expression IR and pipeline model
//
// A small Halide-style expression tree plus the function/definition model the
// graph builder consumes. Expressions are immutable values; every rewrite
// (substitution, simplification, CSE) produces a new tree.
//
// Preconditions: none.
// Postconditions: `Expr::ty()` is total for every well-formed expression.
// Failure modes: none (types and pure tree utilities only).
// Side effects: none.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;

use serde::Serialize;

use crate::scope::Scope;

// ── Types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeCode {
    Int,
    UInt,
    Float,
}

/// Scalar element type. `bool` is a 1-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Type {
    pub code: TypeCode,
    pub bits: u8,
}

impl Type {
    pub const fn int(bits: u8) -> Type {
        Type {
            code: TypeCode::Int,
            bits,
        }
    }

    pub const fn uint(bits: u8) -> Type {
        Type {
            code: TypeCode::UInt,
            bits,
        }
    }

    pub const fn float(bits: u8) -> Type {
        Type {
            code: TypeCode::Float,
            bits,
        }
    }

    pub const fn bool() -> Type {
        Type::uint(1)
    }

    pub fn is_bool(self) -> bool {
        self.code == TypeCode::UInt && self.bits == 1
    }

    pub fn is_float(self) -> bool {
        self.code == TypeCode::Float
    }

    pub fn is_int(self) -> bool {
        self.code == TypeCode::Int
    }

    pub fn is_uint(self) -> bool {
        self.code == TypeCode::UInt
    }

    /// Storage size in bytes (a bool occupies one byte).
    pub fn bytes(self) -> i64 {
        (self.bits as i64 + 7) / 8
    }

    /// Smallest representable value, when it fits in an `i64`.
    pub fn min_value(self) -> Option<i64> {
        match self.code {
            TypeCode::Int if self.bits <= 64 => Some(i64::MIN >> (64 - self.bits as u32)),
            TypeCode::UInt => Some(0),
            _ => None,
        }
    }

    /// Largest representable value, when it fits in an `i64`.
    pub fn max_value(self) -> Option<i64> {
        match self.code {
            TypeCode::Int if self.bits <= 64 => Some(i64::MAX >> (64 - self.bits as u32)),
            TypeCode::UInt if self.bits < 64 => Some((1i64 << self.bits) - 1),
            _ => None,
        }
    }

    /// Parse a type keyword (`int32`, `uint8`, `float64`, `bool`, ...).
    pub fn parse(name: &str) -> Option<Type> {
        if name == "bool" {
            return Some(Type::bool());
        }
        let (code, digits) = if let Some(d) = name.strip_prefix("uint") {
            (TypeCode::UInt, d)
        } else if let Some(d) = name.strip_prefix("int") {
            (TypeCode::Int, d)
        } else if let Some(d) = name.strip_prefix("float") {
            (TypeCode::Float, d)
        } else {
            return None;
        };
        let bits: u8 = digits.parse().ok()?;
        let valid = match code {
            TypeCode::Float => matches!(bits, 16 | 32 | 64),
            _ => matches!(bits, 8 | 16 | 32 | 64),
        };
        valid.then_some(Type { code, bits })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bool() {
            return write!(f, "bool");
        }
        match self.code {
            TypeCode::Int => write!(f, "int{}", self.bits),
            TypeCode::UInt => write!(f, "uint{}", self.bits),
            TypeCode::Float => write!(f, "float{}", self.bits),
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────────────

/// Float literal compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatLit(pub f64);

impl PartialEq for FloatLit {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatLit {}

impl std::hash::Hash for FloatLit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Loop variable, let binding, or a region placeholder.
    Plain,
    /// Scalar pipeline parameter.
    Param,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::EQ | BinOp::NE | BinOp::LT | BinOp::LE | BinOp::GT | BinOp::GE
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Min => "min",
            BinOp::Max => "max",
            BinOp::EQ => "==",
            BinOp::NE => "!=",
            BinOp::LT => "<",
            BinOp::LE => "<=",
            BinOp::GT => ">",
            BinOp::GE => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Call to another pipeline function (or to itself).
    Func,
    /// Load from an input image.
    Image,
    /// Math intrinsic or scheduling hint (`sqrt`, `likely`, ...).
    Intrinsic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    pub name: String,
    pub ty: Type,
    pub args: Vec<Expr>,
    pub kind: CallKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Int(i64, Type),
    Float(FloatLit, Type),
    Var(Var),
    Cast(Type, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
    Let(String, Box<Expr>, Box<Expr>),
    Call(Call),
}

impl Expr {
    /// `int32` literal.
    pub fn int(value: i64) -> Expr {
        Expr::Int(value, Type::int(32))
    }

    pub fn float(value: f64) -> Expr {
        Expr::Float(FloatLit(value), Type::float(32))
    }

    pub fn bool_lit(value: bool) -> Expr {
        Expr::Int(value as i64, Type::bool())
    }

    /// `int32` plain variable.
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::typed_var(name, Type::int(32))
    }

    pub fn typed_var(name: impl Into<String>, ty: Type) -> Expr {
        Expr::Var(Var {
            name: name.into(),
            ty,
            kind: VarKind::Plain,
        })
    }

    pub fn param(name: impl Into<String>, ty: Type) -> Expr {
        Expr::Var(Var {
            name: name.into(),
            ty,
            kind: VarKind::Param,
        })
    }

    pub fn bin(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::Bin(op, Box::new(a), Box::new(b))
    }

    pub fn min(a: Expr, b: Expr) -> Expr {
        Expr::bin(BinOp::Min, a, b)
    }

    pub fn max(a: Expr, b: Expr) -> Expr {
        Expr::bin(BinOp::Max, a, b)
    }

    pub fn cast(ty: Type, e: Expr) -> Expr {
        Expr::Cast(ty, Box::new(e))
    }

    pub fn select(c: Expr, t: Expr, f: Expr) -> Expr {
        Expr::Select(Box::new(c), Box::new(t), Box::new(f))
    }

    pub fn let_in(name: impl Into<String>, value: Expr, body: Expr) -> Expr {
        Expr::Let(name.into(), Box::new(value), Box::new(body))
    }

    pub fn call(name: impl Into<String>, ty: Type, args: Vec<Expr>, kind: CallKind) -> Expr {
        Expr::Call(Call {
            name: name.into(),
            ty,
            args,
            kind,
        })
    }

    /// Zero of the given type.
    pub fn zero(ty: Type) -> Expr {
        if ty.is_float() {
            Expr::Float(FloatLit(0.0), ty)
        } else {
            Expr::Int(0, ty)
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Expr::Int(_, t) | Expr::Float(_, t) | Expr::Cast(t, _) => *t,
            Expr::Var(v) => v.ty,
            Expr::Bin(op, a, _) => {
                if op.is_comparison() || op.is_logical() {
                    Type::bool()
                } else {
                    a.ty()
                }
            }
            Expr::Not(_) => Type::bool(),
            Expr::Select(_, t, _) => t.ty(),
            Expr::Let(_, _, body) => body.ty(),
            Expr::Call(c) => c.ty,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Expr::Int(v, _) => Some(*v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Int(..) | Expr::Float(..))
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Int(..) | Expr::Float(..) | Expr::Var(_) => Vec::new(),
            Expr::Cast(_, e) | Expr::Not(e) => vec![e],
            Expr::Bin(_, a, b) | Expr::Let(_, a, b) => vec![a, b],
            Expr::Select(c, t, f) => vec![c, t, f],
            Expr::Call(c) => c.args.iter().collect(),
        }
    }

    /// Rebuild this node with each direct child replaced by `f(child)`.
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        match self {
            Expr::Int(..) | Expr::Float(..) | Expr::Var(_) => self.clone(),
            Expr::Cast(t, e) => Expr::cast(*t, f(e)),
            Expr::Bin(op, a, b) => Expr::bin(*op, f(a), f(b)),
            Expr::Not(e) => Expr::Not(Box::new(f(e))),
            Expr::Select(c, t, e) => Expr::select(f(c), f(t), f(e)),
            Expr::Let(n, v, b) => Expr::let_in(n.clone(), f(v), f(b)),
            Expr::Call(c) => Expr::Call(Call {
                name: c.name.clone(),
                ty: c.ty,
                args: c.args.iter().map(f).collect(),
                kind: c.kind,
            }),
        }
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Expr {
        Expr::int(v)
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::bin($op, self, rhs)
            }
        }

        impl ops::$trait<i64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                let ty = self.ty();
                Expr::bin($op, self, Expr::Int(rhs, ty))
            }
        }
    };
}

impl_arith!(Add, add, BinOp::Add);
impl_arith!(Sub, sub, BinOp::Sub);
impl_arith!(Mul, mul, BinOp::Mul);
impl_arith!(Div, div, BinOp::Div);
impl_arith!(Rem, rem, BinOp::Mod);

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        match self {
            Expr::Int(v, t) => Expr::Int(v.wrapping_neg(), t),
            Expr::Float(v, t) => Expr::Float(FloatLit(-v.0), t),
            e => {
                let ty = e.ty();
                Expr::bin(BinOp::Sub, Expr::zero(ty), e)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v, t) => {
                if t.is_bool() {
                    write!(f, "{}", *v != 0)
                } else if *t == Type::int(32) {
                    write!(f, "{v}")
                } else {
                    write!(f, "({t}){v}")
                }
            }
            Expr::Float(v, t) => {
                if t.bits == 64 {
                    write!(f, "{:?}", v.0)
                } else {
                    write!(f, "{:?}f", v.0)
                }
            }
            Expr::Var(v) => write!(f, "{}", v.name),
            Expr::Cast(t, e) => write!(f, "{t}({e})"),
            Expr::Bin(op @ (BinOp::Min | BinOp::Max), a, b) => {
                write!(f, "{}({a}, {b})", op.symbol())
            }
            Expr::Bin(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::Select(c, t, e) => write!(f, "select({c}, {t}, {e})"),
            Expr::Let(n, v, b) => write!(f, "(let {n} = {v} in {b})"),
            Expr::Call(c) => {
                write!(f, "{}(", c.name)?;
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ── Visitor ──────────────────────────────────────────────────────────────

/// Read-only expression visitor. Override `visit` to intercept nodes and call
/// `walk` to continue into the children.
pub trait IrVisitor {
    fn visit(&mut self, e: &Expr) {
        walk(self, e);
    }
}

/// Visit every direct child of `e` in evaluation order.
pub fn walk<V: IrVisitor + ?Sized>(v: &mut V, e: &Expr) {
    match e {
        Expr::Int(..) | Expr::Float(..) | Expr::Var(_) => {}
        Expr::Cast(_, x) | Expr::Not(x) => v.visit(x),
        Expr::Bin(_, a, b) => {
            v.visit(a);
            v.visit(b);
        }
        Expr::Select(c, t, f) => {
            v.visit(c);
            v.visit(t);
            v.visit(f);
        }
        Expr::Let(_, value, body) => {
            v.visit(value);
            v.visit(body);
        }
        Expr::Call(c) => {
            for a in &c.args {
                v.visit(a);
            }
        }
    }
}

// ── Tree queries and rewrites ────────────────────────────────────────────

/// Replace free variables by name. Let bindings shadow the map.
pub fn substitute(map: &HashMap<String, Expr>, e: &Expr) -> Expr {
    if map.is_empty() {
        return e.clone();
    }
    match e {
        Expr::Var(v) => map.get(&v.name).cloned().unwrap_or_else(|| e.clone()),
        Expr::Let(name, value, body) if map.contains_key(name) => {
            let mut inner = map.clone();
            inner.remove(name);
            Expr::let_in(name.clone(), substitute(map, value), substitute(&inner, body))
        }
        _ => e.map_children(|c| substitute(map, c)),
    }
}

/// Does `e` reference the variable `name`, looking through the values bound
/// in `lets`?
pub fn uses_var(e: &Expr, name: &str, lets: &Scope<Expr>) -> bool {
    match e {
        Expr::Var(v) => {
            v.name == name
                || lets
                    .get(&v.name)
                    .is_some_and(|value| uses_var(value, name, lets))
        }
        Expr::Let(n, value, body) => {
            if uses_var(value, name, lets) {
                return true;
            }
            if n == name {
                return false;
            }
            let mut inner = Scope::with_parent(lets);
            inner.push(n.clone(), value.as_ref().clone());
            uses_var(body, name, &inner)
        }
        _ => e.children().into_iter().any(|c| uses_var(c, name, lets)),
    }
}

/// Free (unbound) variable names of `e`.
pub fn free_vars(e: &Expr) -> BTreeSet<String> {
    struct Collect {
        bound: Vec<String>,
        out: BTreeSet<String>,
    }
    impl IrVisitor for Collect {
        fn visit(&mut self, e: &Expr) {
            match e {
                Expr::Var(v) if !self.bound.contains(&v.name) => {
                    self.out.insert(v.name.clone());
                }
                Expr::Let(n, value, body) => {
                    self.visit(value);
                    self.bound.push(n.clone());
                    self.visit(body);
                    self.bound.pop();
                }
                _ => walk(self, e),
            }
        }
    }
    let mut c = Collect {
        bound: Vec::new(),
        out: BTreeSet::new(),
    };
    c.visit(e);
    c.out
}

/// Does `e` reference any pipeline parameter?
pub fn uses_params(e: &Expr) -> bool {
    struct Find(bool);
    impl IrVisitor for Find {
        fn visit(&mut self, e: &Expr) {
            if let Expr::Var(v) = e {
                self.0 |= v.kind == VarKind::Param;
            } else if !self.0 {
                walk(self, e);
            }
        }
    }
    let mut f = Find(false);
    f.visit(e);
    f.0
}

// ── Pipeline model ───────────────────────────────────────────────────────

/// Name of the synthetic outermost loop every stage carries.
pub const OUTERMOST: &str = "__outermost";

#[derive(Debug, Clone, PartialEq)]
pub struct ReductionVariable {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimKind {
    PureVar,
    PureRVar,
    ImpureRVar,
}

impl DimKind {
    pub fn is_pure(self) -> bool {
        matches!(self, DimKind::PureVar | DimKind::PureRVar)
    }

    pub fn is_rvar(self) -> bool {
        matches!(self, DimKind::PureRVar | DimKind::ImpureRVar)
    }
}

/// One loop dimension of a stage schedule, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Dim {
    pub var: String,
    pub kind: DimKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub old_var: String,
    pub outer: String,
    pub inner: String,
    pub factor: Expr,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageSchedule {
    pub rvars: Vec<ReductionVariable>,
    pub dims: Vec<Dim>,
    pub splits: Vec<Split>,
    /// `reorder` directives as written, innermost name first. Recorded but
    /// never applied to `dims`.
    pub reorders: Vec<Vec<String>>,
}

impl StageSchedule {
    /// Default loop order for a definition: reduction variables innermost,
    /// then the pure vars that appear bare on the LHS, then `__outermost`.
    pub fn default_for(args: &[Expr], pure_args: &[String], rvars: Vec<ReductionVariable>) -> Self {
        let mut dims = Vec::new();
        for rv in &rvars {
            let pure = !args
                .iter()
                .any(|a| a.as_var().is_none() && uses_var(a, &rv.var, &Scope::new()));
            dims.push(Dim {
                var: rv.var.clone(),
                kind: if pure {
                    DimKind::PureRVar
                } else {
                    DimKind::ImpureRVar
                },
            });
        }
        for (i, a) in args.iter().enumerate() {
            if let Some(v) = a.as_var() {
                if pure_args.get(i) == Some(&v.name) {
                    dims.push(Dim {
                        var: v.name.clone(),
                        kind: DimKind::PureVar,
                    });
                }
            }
        }
        dims.push(Dim {
            var: OUTERMOST.to_string(),
            kind: DimKind::PureVar,
        });
        StageSchedule {
            rvars,
            dims,
            splits: Vec::new(),
            reorders: Vec::new(),
        }
    }

    /// Record a reorder of the named dims. Returns the first name that is
    /// not a loop of this stage.
    pub fn reorder(&mut self, order: &[String]) -> Result<(), String> {
        for name in order {
            if name == OUTERMOST || !self.dims.iter().any(|d| &d.var == name) {
                return Err(name.clone());
            }
        }
        self.reorders.push(order.to_vec());
        Ok(())
    }

    /// True when any split or reorder directive was applied.
    pub fn is_scheduled(&self) -> bool {
        !self.splits.is_empty() || !self.reorders.is_empty()
    }
}

/// A pure definition or an update of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub args: Vec<Expr>,
    pub values: Vec<Expr>,
    pub predicate: Option<Expr>,
    pub schedule: StageSchedule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub args: Vec<String>,
    pub definition: Definition,
    pub updates: Vec<Definition>,
    pub estimates: Vec<Estimate>,
    /// Extern stage: the definition's values are a proxy for an opaque
    /// computation and are featurized without store accesses.
    pub is_extern: bool,
    pub is_wrapper: bool,
}

impl Func {
    pub fn pure(name: impl Into<String>, args: &[&str], value: Expr) -> Func {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let lhs: Vec<Expr> = args.iter().map(|a| Expr::var(a.as_str())).collect();
        let schedule = StageSchedule::default_for(&lhs, &args, Vec::new());
        Func {
            name: name.into(),
            args,
            definition: Definition {
                args: lhs,
                values: vec![value],
                predicate: None,
                schedule,
            },
            updates: Vec::new(),
            estimates: Vec::new(),
            is_extern: false,
            is_wrapper: false,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.args.len()
    }

    pub fn value_types(&self) -> Vec<Type> {
        self.definition.values.iter().map(Expr::ty).collect()
    }

    pub fn has_update_definition(&self) -> bool {
        !self.updates.is_empty()
    }

    /// Append an update with the default loop order.
    pub fn add_update(&mut self, args: Vec<Expr>, value: Expr, rvars: Vec<ReductionVariable>) {
        let schedule = StageSchedule::default_for(&args, &self.args, rvars);
        self.updates.push(Definition {
            args,
            values: vec![value],
            predicate: None,
            schedule,
        });
    }

    pub fn set_estimate(&mut self, var: &str, min: i64, extent: i64) {
        self.estimates.retain(|e| e.var != var);
        self.estimates.push(Estimate {
            var: var.to_string(),
            min: Expr::int(min),
            extent: Expr::int(extent),
        });
    }

    /// Call this function at `args`.
    pub fn at(&self, args: Vec<Expr>) -> Expr {
        let ty = self
            .definition
            .values
            .first()
            .map(Expr::ty)
            .unwrap_or(Type::int(32));
        Expr::call(self.name.clone(), ty, args, CallKind::Func)
    }

    /// Every definition in stage order: the pure one, then each update.
    pub fn stages(&self) -> impl Iterator<Item = &Definition> {
        std::iter::once(&self.definition).chain(self.updates.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageParam {
    pub name: String,
    pub ty: Type,
    pub dimensions: usize,
}

impl ImageParam {
    pub fn at(&self, args: Vec<Expr>) -> Expr {
        Expr::call(self.name.clone(), self.ty, args, CallKind::Image)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub estimate: Option<Expr>,
}

/// A lowered pipeline: all functions by name plus the requested outputs.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub funcs: HashMap<String, Func>,
    pub images: Vec<ImageParam>,
    pub params: Vec<Param>,
    pub outputs: Vec<String>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(&mut self, f: Func) {
        self.funcs.insert(f.name.clone(), f);
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    #[test]
    fn type_parse_and_display() {
        assert_eq!(Type::parse("uint8"), Some(Type::uint(8)));
        assert_eq!(Type::parse("float64"), Some(Type::float(64)));
        assert_eq!(Type::parse("bool"), Some(Type::bool()));
        assert_eq!(Type::parse("int7"), None);
        assert_eq!(Type::parse("vec4"), None);
        assert_eq!(Type::int(16).to_string(), "int16");
        assert_eq!(Type::bool().to_string(), "bool");
    }

    #[test]
    fn type_ranges() {
        assert_eq!(Type::uint(8).max_value(), Some(255));
        assert_eq!(Type::int(8).min_value(), Some(-128));
        assert_eq!(Type::int(32).max_value(), Some(i32::MAX as i64));
        assert_eq!(Type::uint(64).max_value(), None);
        assert_eq!(Type::float(32).min_value(), None);
        assert_eq!(Type::bool().bytes(), 1);
        assert_eq!(Type::float(64).bytes(), 8);
    }

    #[test]
    fn display_nests_parens() {
        let e = Expr::min(x() * 2 + 3, Expr::var("y"));
        assert_eq!(e.to_string(), "min(((x * 2) + 3), y)");
    }

    #[test]
    fn comparison_has_bool_type() {
        let e = Expr::bin(BinOp::LT, x(), Expr::int(3));
        assert!(e.ty().is_bool());
        assert_eq!((x() + 1).ty(), Type::int(32));
    }

    #[test]
    fn substitute_respects_shadowing() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), Expr::int(7));
        let e = Expr::let_in("x", x() + 1, x() * 2);
        let s = substitute(&map, &e);
        assert_eq!(s, Expr::let_in("x", Expr::int(7) + 1, x() * 2));
    }

    #[test]
    fn uses_var_looks_through_lets() {
        let mut lets = Scope::new();
        lets.push("t".to_string(), x() * 2);
        assert!(uses_var(&(Expr::var("t") + 1), "x", &lets));
        assert!(!uses_var(&(Expr::var("t") + 1), "y", &lets));
        assert!(uses_var(&Expr::let_in("u", x(), Expr::var("u")), "x", &Scope::new()));
    }

    #[test]
    fn free_vars_excludes_let_bound() {
        let e = Expr::let_in("t", x() + Expr::var("y"), Expr::var("t") * Expr::var("z"));
        let names: Vec<String> = free_vars(&e).into_iter().collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn param_detection() {
        assert!(uses_params(&(x() + Expr::param("w", Type::int(32)))));
        assert!(!uses_params(&(x() + 1)));
    }

    #[test]
    fn default_update_dims() {
        let rv = ReductionVariable {
            var: "r.x".into(),
            min: Expr::int(0),
            extent: Expr::int(10),
        };
        let args = vec![Expr::var("r.x"), Expr::var("y")];
        let pure = vec!["x".to_string(), "y".to_string()];
        let s = StageSchedule::default_for(&args, &pure, vec![rv]);
        let names: Vec<&str> = s.dims.iter().map(|d| d.var.as_str()).collect();
        assert_eq!(names, vec!["r.x", "y", OUTERMOST]);
        assert_eq!(s.dims[0].kind, DimKind::PureRVar);
    }

    #[test]
    fn reorder_is_recorded_not_applied() {
        let f = Func::pure("f", &["x", "y", "c"], Expr::int(0));
        let mut s = f.definition.schedule.clone();
        assert!(!s.is_scheduled());
        s.reorder(&["c".to_string(), "x".to_string()]).unwrap();
        let names: Vec<&str> = s.dims.iter().map(|d| d.var.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "c", OUTERMOST]);
        assert_eq!(s.reorders, vec![vec!["c".to_string(), "x".to_string()]]);
        assert!(s.is_scheduled());
        assert_eq!(s.reorder(&["w".to_string()]), Err("w".to_string()));
    }
}
