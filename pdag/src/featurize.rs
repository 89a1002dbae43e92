// featurize.rs — Operator histograms and load Jacobians for one stage
//
// Walks the simplified, CSE'd expressions of a definition, bumping the
// `[OpType][ScalarType]` histogram for every node it meets. Every load and
// store additionally gets a derivative matrix with respect to the stage's
// loop variables, which is classified into the access tables and, for loads
// from other functions, handed back to the caller for the matching edge.
//
// Preconditions: every free variable in a call argument is a loop variable
//   of the stage, a pipeline parameter, or an enclosing `let`.
// Postconditions: `features` holds the counts for the visited expressions.
// Failure modes: an unbound variable in a call argument panics.
// Side effects: none.

use std::collections::HashMap;

use crate::features::{AccessType, OpType, PipelineFeatures, ScalarType};
use crate::id::{SymId, SymbolTable};
use crate::ir::{walk, BinOp, CallKind, Definition, Expr, IrVisitor, Type, VarKind};
use crate::jacobian::{LoadJacobian, OptionalRational};
use crate::scope::Scope;
use crate::simplify::{common_subexpression_elimination, simplify};

/// A load from another function, with its derivative matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncLoad {
    pub producer: String,
    pub jacobian: LoadJacobian,
}

pub struct Featurizer<'a> {
    func: &'a str,
    loops: &'a [String],
    features: &'a mut PipelineFeatures,
    lets: Scope<'static, Expr>,
    symbols: SymbolTable,
    /// Derivative of a `let` value, keyed by (target loop var, let name).
    dlets: HashMap<(SymId, SymId), OptionalRational>,
    loads: Vec<FuncLoad>,
}

impl<'a> Featurizer<'a> {
    /// Featurizer for a stage of `func` whose loops are `loops`, innermost
    /// first.
    pub fn new(func: &'a str, loops: &'a [String], features: &'a mut PipelineFeatures) -> Self {
        Featurizer {
            func,
            loops,
            features,
            lets: Scope::new(),
            symbols: SymbolTable::new(),
            dlets: HashMap::new(),
            loads: Vec::new(),
        }
    }

    /// Loads from other functions seen so far, in visit order.
    pub fn into_loads(self) -> Vec<FuncLoad> {
        self.loads
    }

    fn bump(&mut self, op: OpType, ty: Type) {
        self.features.record_op(op, ScalarType::of(ty));
    }

    /// `d(e)/d(v)` for loop variable `v`.
    pub fn differentiate(&mut self, e: &Expr, v: &str) -> OptionalRational {
        if let Expr::Var(var) = e {
            if var.name == v {
                return OptionalRational::one();
            }
            if self.loops.iter().any(|l| *l == var.name) || var.kind == VarKind::Param {
                return OptionalRational::zero();
            }
            let Some(value) = self.lets.get(&var.name).cloned() else {
                panic!("unbound variable in call args: {}", var.name);
            };
            let key = (self.symbols.intern(v), self.symbols.intern(&var.name));
            if let Some(d) = self.dlets.get(&key) {
                return *d;
            }
            let d = self.differentiate(&value, v);
            self.dlets.insert(key, d);
            return d;
        }

        if !crate::ir::uses_var(e, v, &self.lets) {
            return OptionalRational::zero();
        }

        match e {
            Expr::Bin(BinOp::Add, a, b) => {
                let mut da = self.differentiate(a, v);
                da += self.differentiate(b, v);
                da
            }
            Expr::Bin(BinOp::Sub, a, b) => {
                let mut da = self.differentiate(a, v);
                let mut db = self.differentiate(b, v);
                db.numerator = -db.numerator;
                da += db;
                da
            }
            Expr::Bin(BinOp::Mul, a, b) => match b.as_const_int() {
                Some(c) => {
                    let mut da = self.differentiate(a, v);
                    da.numerator *= c;
                    da
                }
                None => OptionalRational::none(),
            },
            Expr::Bin(BinOp::Div, a, b) => match b.as_const_int() {
                Some(c) => {
                    let mut da = self.differentiate(a, v);
                    if da.numerator != 0 {
                        da.denominator *= c;
                    }
                    da
                }
                None => OptionalRational::none(),
            },
            Expr::Call(c) if c.kind == CallKind::Intrinsic && c.name == "likely" => {
                match c.args.first() {
                    Some(a) => self.differentiate(a, v),
                    None => OptionalRational::none(),
                }
            }
            _ => OptionalRational::none(),
        }
    }

    fn visit_memory_access(&mut self, name: &str, ty: Type, args: &[Expr], access: AccessType) {
        let mut jacobian = LoadJacobian::new(args.len(), self.loops.len(), 1);
        let loops = self.loops;
        for (i, a) in args.iter().enumerate() {
            for (j, l) in loops.iter().enumerate() {
                let d = self.differentiate(a, l);
                jacobian.set(i, j, d);
            }
        }
        let classes = jacobian.classify();
        log::trace!(
            "{} {:?} of {} is {:?}:\n{}",
            self.func,
            access,
            name,
            classes,
            jacobian
        );
        self.features
            .record_access(classes, access, ScalarType::of(ty));
        if access == AccessType::LoadFunc {
            self.loads.push(FuncLoad {
                producer: name.to_string(),
                jacobian,
            });
        }
    }

    /// Classify the store through a definition's left-hand side.
    pub fn visit_store_args(&mut self, ty: Type, args: &[Expr]) {
        let args: Vec<Expr> = args
            .iter()
            .map(|a| common_subexpression_elimination(&simplify(a)))
            .collect();
        let func = self.func;
        self.visit_memory_access(func, ty, &args, AccessType::Store);
    }

    /// Remove and return the cached derivatives of the `let` named `name`.
    fn take_let_derivatives(&mut self, name: &str) -> Vec<((SymId, SymId), OptionalRational)> {
        let Some(id) = self.symbols.get(name) else {
            return Vec::new();
        };
        let taken: Vec<_> = self
            .dlets
            .iter()
            .filter(|((_, l), _)| *l == id)
            .map(|(&k, &d)| (k, d))
            .collect();
        for (k, _) in &taken {
            self.dlets.remove(k);
        }
        taken
    }
}

fn bin_op_type(op: BinOp) -> OpType {
    match op {
        BinOp::Add => OpType::Add,
        BinOp::Sub => OpType::Sub,
        BinOp::Mul => OpType::Mul,
        BinOp::Div => OpType::Div,
        BinOp::Mod => OpType::Mod,
        BinOp::Min => OpType::Min,
        BinOp::Max => OpType::Max,
        BinOp::EQ => OpType::EQ,
        BinOp::NE => OpType::NE,
        BinOp::LT | BinOp::GT => OpType::LT,
        BinOp::LE | BinOp::GE => OpType::LE,
        BinOp::And => OpType::And,
        BinOp::Or => OpType::Or,
    }
}

impl IrVisitor for Featurizer<'_> {
    fn visit(&mut self, e: &Expr) {
        let ty = e.ty();
        self.features.mark_type(ScalarType::of(ty));
        match e {
            Expr::Int(..) | Expr::Float(..) => self.bump(OpType::Const, ty),
            Expr::Var(v) => {
                let op = match v.kind {
                    VarKind::Param => OpType::Param,
                    VarKind::Plain => OpType::Variable,
                };
                self.bump(op, ty);
            }
            Expr::Cast(_, value) => {
                self.bump(OpType::Cast, value.ty());
                walk(self, e);
            }
            Expr::Bin(op, ..) => {
                self.bump(bin_op_type(*op), ty);
                walk(self, e);
            }
            Expr::Not(_) => {
                self.bump(OpType::Not, ty);
                walk(self, e);
            }
            Expr::Select(..) => {
                self.bump(OpType::Select, ty);
                walk(self, e);
            }
            Expr::Let(name, value, body) => {
                self.bump(OpType::Let, value.ty());
                self.visit(value);
                // derivatives cached for an outer binding of `name` do not
                // hold inside the body
                let outer = self.take_let_derivatives(name);
                self.lets.push(name.clone(), value.as_ref().clone());
                self.visit(body);
                self.lets.pop(name);
                self.take_let_derivatives(name);
                self.dlets.extend(outer);
            }
            Expr::Call(c) => {
                walk(self, e);
                match c.kind {
                    CallKind::Func if c.name == self.func => {
                        self.visit_memory_access(&c.name, c.ty, &c.args, AccessType::LoadSelf);
                        self.bump(OpType::SelfCall, c.ty);
                    }
                    CallKind::Func => {
                        self.visit_memory_access(&c.name, c.ty, &c.args, AccessType::LoadFunc);
                        self.bump(OpType::FuncCall, c.ty);
                    }
                    CallKind::Image => {
                        self.visit_memory_access(&c.name, c.ty, &c.args, AccessType::LoadImage);
                        self.bump(OpType::ImageCall, c.ty);
                    }
                    CallKind::Intrinsic => self.bump(OpType::ExternCall, c.ty),
                }
            }
        }
    }
}

/// Features and function loads of one definition of `func`.
///
/// Each value contributes its store access and then its own expression; the
/// left-hand side arguments are visited last. For an extern stage only the
/// proxy values are visited.
pub fn featurize_definition(
    func: &str,
    def: &Definition,
    is_extern: bool,
    loops: &[String],
) -> (PipelineFeatures, Vec<FuncLoad>) {
    let mut features = PipelineFeatures::new();
    let mut f = Featurizer::new(func, loops, &mut features);
    if is_extern {
        for v in &def.values {
            f.visit(&common_subexpression_elimination(&simplify(v)));
        }
    } else {
        for v in &def.values {
            f.visit_store_args(v.ty(), &def.args);
            f.visit(&common_subexpression_elimination(&simplify(v)));
        }
        for a in &def.args {
            f.visit(&common_subexpression_elimination(&simplify(a)));
        }
    }
    let loads = f.into_loads();
    (features, loads)
}
