// lower.rs — AST to pipeline IR
//
// Resolves names, checks arities, applies Halide-style type coercion and
// builds the `ir::Pipeline` the graph builder consumes.
//
// Preconditions: `program` parsed without errors.
// Postconditions: every call in the pipeline names a function defined earlier
//   (or, inside an update, the function itself), an input image or an
//   intrinsic; index arguments are `int32`; update definitions use pure vars
//   only bare at their own position on the left-hand side.
// Failure modes: each malformed statement produces one diagnostic and is
//   skipped; lowering continues with the next statement.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::ast::{self, BinaryOp, ExprKind, FuncKind, SourceSpan, StatementKind, UnaryOp};
use crate::diag::{codes, Diagnostic};
use crate::ir::{
    free_vars, BinOp, CallKind, Definition, Estimate, Expr, Func, ImageParam, Param, Pipeline,
    ReductionVariable, Split, StageSchedule, Type,
};
use crate::simplify::simplify;

/// Result of lowering.
#[derive(Debug)]
pub struct LowerResult {
    pub pipeline: Pipeline,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

const RDOM_DIMS: [&str; 4] = ["x", "y", "z", "w"];

const MATH_INTRINSICS: [&str; 8] = ["sqrt", "sin", "cos", "exp", "log", "floor", "ceil", "round"];

// ── Public entry point ──────────────────────────────────────────────────────

/// Lower a parsed program to a pipeline.
pub fn lower(program: &ast::Program) -> LowerResult {
    let mut engine = LowerEngine {
        pipeline: Pipeline::new(),
        rdoms: HashMap::new(),
        declared: HashSet::new(),
        later_funcs: program
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::Func(f) => Some(f.name.name.clone()),
                _ => None,
            })
            .collect(),
        diagnostics: Vec::new(),
    };
    for stmt in &program.statements {
        if let Err(d) = engine.lower_statement(stmt) {
            engine.diagnostics.push(d);
        }
    }
    LowerResult {
        pipeline: engine.pipeline,
        diagnostics: engine.diagnostics,
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

struct LowerEngine {
    pipeline: Pipeline,
    /// Reduction domains by name.
    rdoms: HashMap<String, Vec<ReductionVariable>>,
    /// Every top-level name declared so far.
    declared: HashSet<String>,
    /// Function names declared anywhere in the program.
    later_funcs: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

/// Names visible while lowering one expression.
struct ExprCtx<'a> {
    /// Function being defined, if any.
    func: Option<&'a str>,
    pure_args: &'a [String],
    /// Inside an update: reduction variables and self-calls are allowed.
    in_update: bool,
    lets: Vec<(String, Type)>,
}

impl<'a> ExprCtx<'a> {
    fn constant() -> Self {
        ExprCtx {
            func: None,
            pure_args: &[],
            in_update: false,
            lets: Vec::new(),
        }
    }
}

fn err(code: crate::diag::DiagCode, span: SourceSpan, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(code, message).with_span(span)
}

impl LowerEngine {
    fn lower_statement(&mut self, stmt: &ast::Statement) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StatementKind::Input(s) => self.lower_input(s),
            StatementKind::Param(s) => self.lower_param(s),
            StatementKind::Rdom(s) => self.lower_rdom(s),
            StatementKind::Func(s) => self.lower_func(s),
            StatementKind::Update(s) => self.lower_update(s, stmt.span),
            StatementKind::Schedule(s) => self.lower_schedule(s),
            StatementKind::Output(s) => self.lower_output(s),
        }
    }

    fn declare(&mut self, name: &ast::Ident) -> Result<(), Diagnostic> {
        if !self.declared.insert(name.name.clone()) {
            return Err(err(
                codes::E0201,
                name.span,
                format!("`{}` is already defined", name.name),
            ));
        }
        Ok(())
    }

    fn parse_type(ty: &ast::Ident) -> Result<Type, Diagnostic> {
        Type::parse(&ty.name).ok_or_else(|| {
            err(codes::E0207, ty.span, format!("unknown type `{}`", ty.name))
                .with_hint("expected int8..int64, uint8..uint64, float16..float64 or bool")
        })
    }

    // ── Declarations ──

    fn lower_input(&mut self, s: &ast::InputStmt) -> Result<(), Diagnostic> {
        let ty = Self::parse_type(&s.ty)?;
        self.declare(&s.name)?;
        self.pipeline.images.push(ImageParam {
            name: s.name.name.clone(),
            ty,
            dimensions: s.dims.len(),
        });
        Ok(())
    }

    fn lower_param(&mut self, s: &ast::ParamStmt) -> Result<(), Diagnostic> {
        let ty = Self::parse_type(&s.ty)?;
        let estimate = match &s.estimate {
            Some(e) => {
                let v = self.lower_expr(e, &mut ExprCtx::constant())?;
                Some(simplify(&coerce(v, ty)))
            }
            None => None,
        };
        self.declare(&s.name)?;
        self.pipeline.params.push(Param {
            name: s.name.name.clone(),
            ty,
            estimate,
        });
        Ok(())
    }

    fn lower_rdom(&mut self, s: &ast::RdomStmt) -> Result<(), Diagnostic> {
        let mut rvars = Vec::with_capacity(s.dims.len());
        for ((min, extent), dim) in s.dims.iter().zip(RDOM_DIMS) {
            let min = self.lower_expr(min, &mut ExprCtx::constant())?;
            let extent = self.lower_expr(extent, &mut ExprCtx::constant())?;
            rvars.push(ReductionVariable {
                var: format!("{}.{dim}", s.name.name),
                min: simplify(&coerce(min, Type::int(32))),
                extent: simplify(&coerce(extent, Type::int(32))),
            });
        }
        self.declare(&s.name)?;
        self.rdoms.insert(s.name.name.clone(), rvars);
        Ok(())
    }

    fn lower_func(&mut self, s: &ast::FuncStmt) -> Result<(), Diagnostic> {
        let args: Vec<String> = s.args.iter().map(|a| a.name.clone()).collect();
        let mut seen = HashSet::new();
        for a in &s.args {
            if !seen.insert(a.name.as_str()) {
                return Err(err(
                    codes::E0203,
                    a.span,
                    format!("argument `{}` of `{}` appears twice", a.name, s.name.name),
                ));
            }
        }
        let mut ctx = ExprCtx {
            func: Some(s.name.name.as_str()),
            pure_args: &args,
            in_update: false,
            lets: Vec::new(),
        };
        let value = self.lower_expr(&s.value, &mut ctx)?;
        self.declare(&s.name)?;
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut func = Func::pure(s.name.name.clone(), &arg_refs, value);
        func.is_extern = s.kind == FuncKind::Extern;
        func.is_wrapper = s.kind == FuncKind::Wrapper;
        log::trace!("lowered {} = {}", func.name, func.definition.values[0]);
        self.pipeline.add_func(func);
        Ok(())
    }

    fn lower_update(&mut self, s: &ast::UpdateStmt, span: SourceSpan) -> Result<(), Diagnostic> {
        let Some(func) = self.pipeline.funcs.get(&s.name.name) else {
            return Err(err(
                codes::E0200,
                s.name.span,
                format!("update of unknown function `{}`", s.name.name),
            ));
        };
        let pure_args = func.args.clone();
        let value_type = func.value_types().first().copied().unwrap_or(Type::int(32));
        if s.args.len() != pure_args.len() {
            return Err(err(
                codes::E0206,
                span,
                format!(
                    "update of `{}` has {} argument(s), expected {}",
                    s.name.name,
                    s.args.len(),
                    pure_args.len()
                ),
            ));
        }

        let mut ctx = ExprCtx {
            func: Some(s.name.name.as_str()),
            pure_args: &pure_args,
            in_update: true,
            lets: Vec::new(),
        };
        let mut args = Vec::with_capacity(s.args.len());
        for a in &s.args {
            let e = self.lower_expr(a, &mut ctx)?;
            args.push(coerce(e, Type::int(32)));
        }
        let value = coerce(self.lower_expr(&s.value, &mut ctx)?, value_type);
        let predicate = match &s.predicate {
            Some(p) => Some(self.lower_expr(p, &mut ctx)?),
            None => None,
        };

        // Pure vars may only appear bare, at their own position.
        let mut used = HashSet::new();
        for e in args.iter().chain(std::iter::once(&value)).chain(&predicate) {
            used.extend(free_vars(e));
        }
        for (i, p) in pure_args.iter().enumerate() {
            if !used.contains(p) {
                continue;
            }
            if !matches!(args[i].as_var(), Some(v) if v.name == *p) {
                return Err(err(
                    codes::E0203,
                    span,
                    format!(
                        "pure var `{p}` is used in an update of `{}` but is not argument {i} of its left-hand side",
                        s.name.name
                    ),
                )
                .with_hint(format!("write `{p}` as argument {i} of the update")));
            }
        }

        // Every dimension of each reduction domain the update mentions.
        let mut rdom_order: Vec<&str> = Vec::new();
        for name in &used {
            if let Some((rdom, _)) = name.split_once('.') {
                if self.rdoms.contains_key(rdom) && !rdom_order.contains(&rdom) {
                    rdom_order.push(rdom);
                }
            }
        }
        rdom_order.sort_unstable();
        let rvars: Vec<ReductionVariable> = rdom_order
            .iter()
            .flat_map(|r| self.rdoms[*r].iter().cloned())
            .collect();

        let schedule = StageSchedule::default_for(&args, &pure_args, rvars);
        let def = Definition {
            args,
            values: vec![value],
            predicate,
            schedule,
        };
        if let Some(func) = self.pipeline.funcs.get_mut(&s.name.name) {
            func.updates.push(def);
        }
        Ok(())
    }

    // ── Schedules and outputs ──

    fn lower_schedule(&mut self, s: &ast::ScheduleStmt) -> Result<(), Diagnostic> {
        let t = &s.target;
        let Some(func) = self.pipeline.funcs.get_mut(&t.func.name) else {
            return Err(err(
                codes::E0205,
                t.func.span,
                format!("schedule of unknown function `{}`", t.func.name),
            ));
        };
        let def = match t.update {
            None => &mut func.definition,
            Some((n, span)) => {
                let count = func.updates.len();
                match usize::try_from(n).ok().and_then(|i| func.updates.get_mut(i)) {
                    Some(d) => d,
                    None => {
                        return Err(err(
                            codes::E0205,
                            span,
                            format!("`{}` has {count} update(s), no update({n})", t.func.name),
                        ))
                    }
                }
            }
        };
        for d in &s.directives {
            let names = || -> Result<Vec<String>, Diagnostic> {
                d.args
                    .iter()
                    .map(|a| match &a.kind {
                        ExprKind::Name(n) => Ok(n.clone()),
                        _ => Err(err(codes::E0205, a.span, "expected a loop variable name")),
                    })
                    .collect()
            };
            match d.name.name.as_str() {
                "reorder" => {
                    let order = names()?;
                    def.schedule.reorder(&order).map_err(|unknown| {
                        err(
                            codes::E0205,
                            d.span,
                            format!("`{unknown}` is not a loop of `{}`", t.func.name),
                        )
                    })?;
                }
                "split" => {
                    let (vars, factor) = match d.args.split_last() {
                        Some((factor, vars)) if vars.len() == 3 => (vars, factor),
                        _ => {
                            return Err(err(
                                codes::E0206,
                                d.span,
                                "split takes (old, outer, inner, factor)",
                            ))
                        }
                    };
                    let mut n = Vec::with_capacity(3);
                    for v in vars {
                        match &v.kind {
                            ExprKind::Name(name) => n.push(name.clone()),
                            _ => {
                                return Err(err(codes::E0205, v.span, "expected a loop variable name"))
                            }
                        }
                    }
                    let factor = match &factor.kind {
                        ExprKind::Int(v) => Expr::int(*v),
                        _ => return Err(err(codes::E0205, factor.span, "split factor must be an integer")),
                    };
                    def.schedule.splits.push(Split {
                        old_var: n[0].clone(),
                        outer: n[1].clone(),
                        inner: n[2].clone(),
                        factor,
                    });
                }
                other => {
                    return Err(err(
                        codes::E0208,
                        d.name.span,
                        format!("unknown scheduling directive `{other}`"),
                    )
                    .with_hint("supported directives: reorder, split"))
                }
            }
        }
        Ok(())
    }

    fn lower_output(&mut self, s: &ast::OutputStmt) -> Result<(), Diagnostic> {
        let Some(func) = self.pipeline.funcs.get(&s.name.name) else {
            return Err(err(
                codes::E0204,
                s.name.span,
                format!("unknown output `{}`", s.name.name),
            ));
        };
        if self.pipeline.outputs.contains(&s.name.name) {
            return Err(err(
                codes::E0201,
                s.name.span,
                format!("`{}` is already an output", s.name.name),
            ));
        }
        let args = func.args.clone();
        let mut estimates = Vec::with_capacity(s.estimates.len());
        for est in &s.estimates {
            if !args.contains(&est.var.name) {
                return Err(err(
                    codes::E0200,
                    est.var.span,
                    format!("`{}` has no dimension `{}`", s.name.name, est.var.name),
                ));
            }
            let min = self.lower_expr(&est.min, &mut ExprCtx::constant())?;
            let extent = self.lower_expr(&est.extent, &mut ExprCtx::constant())?;
            estimates.push(Estimate {
                var: est.var.name.clone(),
                min: simplify(&coerce(min, Type::int(32))),
                extent: simplify(&coerce(extent, Type::int(32))),
            });
        }
        if let Some(func) = self.pipeline.funcs.get_mut(&s.name.name) {
            func.estimates = estimates;
        }
        self.pipeline.outputs.push(s.name.name.clone());
        Ok(())
    }

    // ── Expressions ──

    fn lower_expr(&self, e: &ast::Expr, ctx: &mut ExprCtx<'_>) -> Result<Expr, Diagnostic> {
        match &e.kind {
            ExprKind::Int(v) => Ok(Expr::int(*v)),
            ExprKind::Float(v) => Ok(Expr::float(*v)),
            ExprKind::Name(n) => self.lower_name(n, e.span, ctx),
            ExprKind::Unary(UnaryOp::Neg, a) => Ok(-self.lower_expr(a, ctx)?),
            ExprKind::Unary(UnaryOp::Not, a) => {
                Ok(Expr::Not(Box::new(self.lower_expr(a, ctx)?)))
            }
            ExprKind::Binary(op, a, b) => {
                let a = self.lower_expr(a, ctx)?;
                let b = self.lower_expr(b, ctx)?;
                let (a, b) = match_types(a, b);
                let op = match op {
                    BinaryOp::Mul => BinOp::Mul,
                    BinaryOp::Div => BinOp::Div,
                    BinaryOp::Mod => BinOp::Mod,
                    BinaryOp::Add => BinOp::Add,
                    BinaryOp::Sub => BinOp::Sub,
                    BinaryOp::Lt => BinOp::LT,
                    BinaryOp::Le => BinOp::LE,
                    BinaryOp::Gt => BinOp::GT,
                    BinaryOp::Ge => BinOp::GE,
                    BinaryOp::Eq => BinOp::EQ,
                    BinaryOp::Ne => BinOp::NE,
                    BinaryOp::And => BinOp::And,
                    BinaryOp::Or => BinOp::Or,
                };
                Ok(Expr::bin(op, a, b))
            }
            ExprKind::Let(name, value, body) => {
                let value = self.lower_expr(value, ctx)?;
                ctx.lets.push((name.name.clone(), value.ty()));
                let body = self.lower_expr(body, ctx);
                ctx.lets.pop();
                Ok(Expr::let_in(name.name.clone(), value, body?))
            }
            ExprKind::Call(callee, args) => self.lower_call(callee, args, e.span, ctx),
        }
    }

    fn lower_name(&self, n: &str, span: SourceSpan, ctx: &ExprCtx<'_>) -> Result<Expr, Diagnostic> {
        if let Some((_, ty)) = ctx.lets.iter().rev().find(|(l, _)| l == n) {
            return Ok(Expr::typed_var(n, *ty));
        }
        if ctx.pure_args.iter().any(|a| a == n) {
            return Ok(Expr::var(n));
        }
        // `r` alone is `r.x`.
        let (rdom, dim) = n.split_once('.').unwrap_or((n, "x"));
        if let Some(rvars) = self.rdoms.get(rdom) {
            let full = format!("{rdom}.{dim}");
            if !rvars.iter().any(|rv| rv.var == full) {
                return Err(err(
                    codes::E0200,
                    span,
                    format!("reduction domain `{rdom}` has no dimension `{dim}`"),
                ));
            }
            if !ctx.in_update {
                return Err(err(
                    codes::E0200,
                    span,
                    format!("reduction variable `{full}` used outside an update"),
                ));
            }
            return Ok(Expr::var(full));
        }
        if let Some(p) = self.pipeline.param(n) {
            return Ok(Expr::param(n, p.ty));
        }
        Err(err(codes::E0200, span, format!("unknown name `{n}`")))
    }

    fn lower_args(&self, args: &[ast::Expr], ctx: &mut ExprCtx<'_>) -> Result<Vec<Expr>, Diagnostic> {
        args.iter().map(|a| self.lower_expr(a, ctx)).collect()
    }

    fn lower_call(
        &self,
        callee: &ast::Ident,
        args: &[ast::Expr],
        span: SourceSpan,
        ctx: &mut ExprCtx<'_>,
    ) -> Result<Expr, Diagnostic> {
        let name = callee.name.as_str();
        let arity = |expected: usize| -> Result<(), Diagnostic> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(err(
                    codes::E0206,
                    span,
                    format!("`{name}` takes {expected} argument(s), found {}", args.len()),
                ))
            }
        };

        if ctx.func == Some(name) && !ctx.in_update {
            return Err(err(
                codes::E0209,
                callee.span,
                format!("pure definition of `{name}` calls itself"),
            )
            .with_hint("recursive references belong in an `update`"));
        }
        // Pipeline functions, including a self-reference from an update.
        if let Some(f) = self.pipeline.funcs.get(name) {
            arity(f.dimensions())?;
            let args = self.lower_args(args, ctx)?;
            let args = args.into_iter().map(|a| coerce(a, Type::int(32))).collect();
            let ty = f.value_types().first().copied().unwrap_or(Type::int(32));
            return Ok(Expr::call(name, ty, args, CallKind::Func));
        }
        if self.later_funcs.contains(name) {
            return Err(err(
                codes::E0202,
                callee.span,
                format!("`{name}` is used before its definition"),
            ));
        }
        if let Some(img) = self.pipeline.images.iter().find(|i| i.name == name) {
            arity(img.dimensions)?;
            let args = self.lower_args(args, ctx)?;
            let args = args.into_iter().map(|a| coerce(a, Type::int(32))).collect();
            return Ok(img.at(args));
        }

        // Casts.
        if let Some(t) = Type::parse(name) {
            arity(1)?;
            let a = self.lower_args(args, ctx)?.remove(0);
            return Ok(if a.ty() == t { a } else { Expr::cast(t, a) });
        }

        match name {
            n if MATH_INTRINSICS.contains(&n) => {
                arity(1)?;
                let a = to_float(self.lower_args(args, ctx)?.remove(0));
                let ty = a.ty();
                Ok(Expr::call(n, ty, vec![a], CallKind::Intrinsic))
            }
            "pow" => {
                arity(2)?;
                let mut a = self.lower_args(args, ctx)?;
                let y = to_float(a.remove(1));
                let x = to_float(a.remove(0));
                let (x, y) = match_types(x, y);
                let ty = x.ty();
                Ok(Expr::call("pow", ty, vec![x, y], CallKind::Intrinsic))
            }
            "abs" | "likely" => {
                arity(1)?;
                let a = self.lower_args(args, ctx)?.remove(0);
                let ty = a.ty();
                Ok(Expr::call(name, ty, vec![a], CallKind::Intrinsic))
            }
            "min" | "max" => {
                arity(2)?;
                let mut a = self.lower_args(args, ctx)?;
                let y = a.remove(1);
                let (x, y) = match_types(a.remove(0), y);
                Ok(if name == "min" {
                    Expr::min(x, y)
                } else {
                    Expr::max(x, y)
                })
            }
            "clamp" => {
                arity(3)?;
                let mut a = self.lower_args(args, ctx)?;
                let hi = a.remove(2);
                let lo = a.remove(1);
                let x = a.remove(0);
                let ty = x.ty();
                let lo = coerce(lo, ty);
                let hi = coerce(hi, ty);
                Ok(Expr::max(Expr::min(x, hi), lo))
            }
            "select" => {
                arity(3)?;
                let mut a = self.lower_args(args, ctx)?;
                let f = a.remove(2);
                let t = a.remove(1);
                let c = a.remove(0);
                let (t, f) = match_types(t, f);
                Ok(Expr::select(c, t, f))
            }
            _ => Err(err(
                codes::E0200,
                callee.span,
                format!("unknown function, image or intrinsic `{name}`"),
            )),
        }
    }
}

// ── Type coercion ───────────────────────────────────────────────────────────

/// Convert `e` to `ty`, retyping literals in place.
fn coerce(e: Expr, ty: Type) -> Expr {
    if e.ty() == ty {
        return e;
    }
    match e {
        Expr::Int(v, _) if !ty.is_float() => Expr::Int(v, ty),
        Expr::Int(v, _) => Expr::Float(crate::ir::FloatLit(v as f64), ty),
        Expr::Float(v, _) if ty.is_float() => Expr::Float(v, ty),
        e => Expr::cast(ty, e),
    }
}

fn to_float(e: Expr) -> Expr {
    if e.ty().is_float() {
        e
    } else {
        coerce(e, Type::float(32))
    }
}

fn is_literal(e: &Expr) -> bool {
    matches!(e, Expr::Int(..) | Expr::Float(..))
}

/// Bring both operands of a binary operator to a common type: floats win
/// over integers, wider wins over narrower, signed wins over unsigned, and a
/// literal takes the type of the other operand.
fn match_types(a: Expr, b: Expr) -> (Expr, Expr) {
    let (ta, tb) = (a.ty(), b.ty());
    if ta == tb {
        return (a, b);
    }
    if is_literal(&b) && !(tb.is_float() && !ta.is_float()) {
        return (a, coerce(b, ta));
    }
    if is_literal(&a) && !(ta.is_float() && !tb.is_float()) {
        return (coerce(a, tb), b);
    }
    let target = if ta.is_float() != tb.is_float() {
        if ta.is_float() {
            ta
        } else {
            tb
        }
    } else {
        let bits = ta.bits.max(tb.bits);
        if ta.is_float() {
            Type::float(bits)
        } else if ta.is_int() || tb.is_int() {
            Type::int(bits)
        } else {
            Type::uint(bits)
        }
    };
    (coerce(a, target), coerce(b, target))
}

// ── Tests ───────────────────────────────────────────────────────────────────
