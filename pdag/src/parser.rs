// Parser for .hpl pipeline descriptions.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators; expressions use one precedence level per operator class.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a .hpl source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
    let span: SimpleSpan = (lhs.span.start()..rhs.span.end()).into();
    Expr {
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        span,
    }
}

fn unary(op: UnaryOp, op_span: SimpleSpan, operand: Expr) -> Expr {
    let span: SimpleSpan = (op_span.start()..operand.span.end()).into();
    Expr {
        kind: ExprKind::Unary(op, Box::new(operand)),
        span,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let ident_list = ident
        .clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Expressions ──

    let expr = recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let literal = select! {
            Token::Int(v) => ExprKind::Int(v),
            Token::Float(v) => ExprKind::Float(v),
        };

        let call = ident
            .clone()
            .then(args)
            .map(|(callee, args)| ExprKind::Call(callee, args));

        let name = ident
            .clone()
            .then(just(Token::Dot).ignore_then(ident.clone()).or_not())
            .map(|(head, field)| match field {
                Some(field) => ExprKind::Name(format!("{}.{}", head.name, field.name)),
                None => ExprKind::Name(head.name),
            });

        let let_in = just(Token::Let)
            .ignore_then(ident.clone())
            .then_ignore(just(Token::Assign))
            .then(expr.clone())
            .then_ignore(just(Token::Semi))
            .then(expr.clone())
            .map(|((name, value), body)| ExprKind::Let(name, Box::new(value), Box::new(body)));

        let atom = choice((literal, let_in, call, name))
            .map_with(|kind, e| Expr {
                kind,
                span: e.span(),
            })
            .or(expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)));

        let prefix = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
        ))
        .map_with(|op, e| (op, e.span()));

        let unary_expr = prefix
            .repeated()
            .foldr(atom, |(op, span), operand| unary(op, span, operand))
            .boxed();

        let product_op = choice((
            just(Token::Star).to(BinaryOp::Mul),
            just(Token::Slash).to(BinaryOp::Div),
            just(Token::Percent).to(BinaryOp::Mod),
        ));
        let product = unary_expr
            .clone()
            .foldl(product_op.then(unary_expr).repeated(), |l, (op, r)| {
                binary(l, op, r)
            })
            .boxed();

        let sum_op = choice((
            just(Token::Plus).to(BinaryOp::Add),
            just(Token::Minus).to(BinaryOp::Sub),
        ));
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |l, (op, r)| binary(l, op, r))
            .boxed();

        let cmp_op = choice((
            just(Token::Le).to(BinaryOp::Le),
            just(Token::Lt).to(BinaryOp::Lt),
            just(Token::Ge).to(BinaryOp::Ge),
            just(Token::Gt).to(BinaryOp::Gt),
            just(Token::EqEq).to(BinaryOp::Eq),
            just(Token::Ne).to(BinaryOp::Ne),
        ));
        let comparison = sum
            .clone()
            .foldl(cmp_op.then(sum).repeated(), |l, (op, r)| binary(l, op, r))
            .boxed();

        let and = comparison
            .clone()
            .foldl(
                just(Token::AndAnd).to(BinaryOp::And).then(comparison).repeated(),
                |l, (op, r)| binary(l, op, r),
            )
            .boxed();

        and.clone()
            .foldl(
                just(Token::OrOr).to(BinaryOp::Or).then(and).repeated(),
                |l, (op, r)| binary(l, op, r),
            )
            .boxed()
    });

    let expr_list = expr
        .clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Statements ──

    let input_stmt = just(Token::Input)
        .ignore_then(ident.clone())
        .then(ident.clone())
        .then(ident_list.clone())
        .map(|((ty, name), dims)| StatementKind::Input(InputStmt { ty, name, dims }));

    let param_stmt = just(Token::Param)
        .ignore_then(ident.clone())
        .then(ident.clone())
        .then(just(Token::Assign).ignore_then(expr.clone()).or_not())
        .map(|((ty, name), estimate)| {
            StatementKind::Param(ParamStmt {
                ty,
                name,
                estimate,
            })
        });

    let rdom_stmt = just(Token::Rdom)
        .ignore_then(ident.clone())
        .then(expr_list.clone())
        .try_map(|(name, bounds), span| {
            if bounds.is_empty() || bounds.len() % 2 != 0 || bounds.len() > 8 {
                return Err(Rich::custom(
                    span,
                    format!(
                        "rdom `{}` needs one to four (min, extent) pairs, found {} value(s)",
                        name.name,
                        bounds.len()
                    ),
                ));
            }
            let mut it = bounds.into_iter();
            let mut dims = Vec::new();
            while let (Some(min), Some(extent)) = (it.next(), it.next()) {
                dims.push((min, extent));
            }
            Ok(StatementKind::Rdom(RdomStmt { name, dims }))
        });

    let func_kind = choice((
        just(Token::Extern)
            .then(just(Token::Func))
            .to(FuncKind::Extern),
        just(Token::Func).to(FuncKind::Plain),
        just(Token::Wrapper).to(FuncKind::Wrapper),
    ));

    let func_stmt = func_kind
        .then(ident.clone())
        .then(ident_list.clone())
        .then_ignore(just(Token::Assign))
        .then(expr.clone())
        .map(|(((kind, name), args), value)| {
            StatementKind::Func(FuncStmt {
                kind,
                name,
                args,
                value,
            })
        });

    let update_stmt = just(Token::Update)
        .ignore_then(ident.clone())
        .then(expr_list.clone())
        .then_ignore(just(Token::Assign))
        .then(expr.clone())
        .then(just(Token::Where).ignore_then(expr.clone()).or_not())
        .map(|(((name, args), value), predicate)| {
            StatementKind::Update(UpdateStmt {
                name,
                args,
                value,
                predicate,
            })
        });

    // ── Schedule statement ──

    let update_index = just(Token::Dot)
        .ignore_then(just(Token::Update))
        .ignore_then(
            select! { Token::Int(n) = e => (n, e.span()) }
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        );

    let stage_target = ident
        .clone()
        .then(update_index.or_not())
        .map_with(|(func, update), e| StageTarget {
            func,
            update,
            span: e.span(),
        });

    let directive = ident
        .clone()
        .then(expr_list.clone())
        .map_with(|(name, args), e| Directive {
            name,
            args,
            span: e.span(),
        });

    let schedule_stmt = just(Token::Schedule)
        .ignore_then(stage_target)
        .then(directive.repeated().at_least(1).collect::<Vec<_>>())
        .map(|(target, directives)| StatementKind::Schedule(ScheduleStmt { target, directives }));

    // ── Output statement ──

    let estimate_spec = ident
        .clone()
        .then_ignore(just(Token::Assign))
        .then(
            expr.clone()
                .then_ignore(just(Token::Comma))
                .then(expr.clone())
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
        )
        .map_with(|(var, (min, extent)), e| EstimateSpec {
            var,
            min,
            extent,
            span: e.span(),
        });

    let output_stmt = just(Token::Output)
        .ignore_then(ident.clone())
        .then(
            just(Token::Estimate)
                .ignore_then(
                    estimate_spec
                        .separated_by(just(Token::Comma))
                        .at_least(1)
                        .collect::<Vec<_>>()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .or_not(),
        )
        .map(|(name, estimates)| {
            StatementKind::Output(OutputStmt {
                name,
                estimates: estimates.unwrap_or_default(),
            })
        });

    // ── Statement dispatch ──

    let statement = choice((
        input_stmt,
        param_stmt,
        rdom_stmt,
        func_stmt,
        update_stmt,
        schedule_stmt,
        output_stmt,
    ))
    .map_with(|kind, e| Statement {
        kind,
        span: e.span(),
    });

    // ── Program ──

    nl.clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |statements, e| Program {
            statements,
            span: e.span(),
        })
}

// ── Tests ──
