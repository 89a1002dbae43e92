// AST node types for .hpl pipeline descriptions.
//
// One node per statement form; expressions keep their source spans so that
// lowering can point diagnostics at the offending construct.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type SourceSpan = SimpleSpan;

// ── Root ──

/// A complete pipeline description: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: SourceSpan,
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: SourceSpan,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Input(InputStmt),
    Param(ParamStmt),
    Rdom(RdomStmt),
    Func(FuncStmt),
    Update(UpdateStmt),
    Schedule(ScheduleStmt),
    Output(OutputStmt),
}

// ── input_stmt: 'input' TYPE IDENT '(' idents ')' ──

#[derive(Debug, Clone, PartialEq)]
pub struct InputStmt {
    pub ty: Ident,
    pub name: Ident,
    pub dims: Vec<Ident>,
}

// ── param_stmt: 'param' TYPE IDENT ('=' expr)? ──

/// A scalar parameter. The optional value is its estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamStmt {
    pub ty: Ident,
    pub name: Ident,
    pub estimate: Option<Expr>,
}

// ── rdom_stmt: 'rdom' IDENT '(' min ',' extent (',' min ',' extent)* ')' ──

/// Reduction domain. Dimensions are named `x`, `y`, `z`, `w` in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RdomStmt {
    pub name: Ident,
    /// `(min, extent)` per dimension.
    pub dims: Vec<(Expr, Expr)>,
}

// ── func_stmt: ('extern' 'func' | 'func' | 'wrapper') IDENT '(' idents ')' '=' expr ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Plain,
    Extern,
    Wrapper,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncStmt {
    pub kind: FuncKind,
    pub name: Ident,
    pub args: Vec<Ident>,
    pub value: Expr,
}

// ── update_stmt: 'update' IDENT '(' exprs ')' '=' expr ('where' expr)? ──

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub name: Ident,
    pub args: Vec<Expr>,
    pub value: Expr,
    pub predicate: Option<Expr>,
}

// ── schedule_stmt: 'schedule' stage_ref directive+ ──

/// `f` or `f.update(N)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTarget {
    pub func: Ident,
    pub update: Option<(i64, SourceSpan)>,
    pub span: SourceSpan,
}

/// `name(args)`; arguments are interpreted by lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: Ident,
    pub args: Vec<Expr>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleStmt {
    pub target: StageTarget,
    pub directives: Vec<Directive>,
}

// ── output_stmt: 'output' IDENT ('estimate' '(' est (',' est)* ')')? ──

/// `var = [min, extent]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateSpec {
    pub var: Ident,
    pub min: Expr,
    pub extent: Expr,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputStmt {
    pub name: Ident,
    pub estimates: Vec<EstimateSpec>,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    /// Plain or dotted name (`x`, `r.x`).
    Name(String),
    Call(Ident, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `let name = value; body`
    Let(Ident, Box<Expr>, Box<Expr>),
}
