// Lexer for .hpl pipeline descriptions.
//
// Uses the `logos` crate for DFA-based lexing. Newlines are significant
// (statement terminators); `#` starts a comment that runs to end of line.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// .hpl token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source. Type names (`int32`, `float64`, ...) lex as identifiers and are
/// resolved during lowering.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("input")]
    Input,
    #[token("param")]
    Param,
    #[token("rdom")]
    Rdom,
    #[token("func")]
    Func,
    #[token("extern")]
    Extern,
    #[token("wrapper")]
    Wrapper,
    #[token("update")]
    Update,
    #[token("where")]
    Where,
    #[token("schedule")]
    Schedule,
    #[token("output")]
    Output,
    #[token("estimate")]
    Estimate,
    #[token("let")]
    Let,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // ── Literals ──
    //
    // Unsigned only: a leading `-` is the unary minus operator.
    /// Float literal with a fraction or exponent (e.g. `0.5`, `1e3`).
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    /// Integer literal.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Structure ──
    /// One or more newlines (statement terminator).
    #[regex(r"\n+")]
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Input => write!(f, "input"),
            Token::Param => write!(f, "param"),
            Token::Rdom => write!(f, "rdom"),
            Token::Func => write!(f, "func"),
            Token::Extern => write!(f, "extern"),
            Token::Wrapper => write!(f, "wrapper"),
            Token::Update => write!(f, "update"),
            Token::Where => write!(f, "where"),
            Token::Schedule => write!(f, "schedule"),
            Token::Output => write!(f, "output"),
            Token::Estimate => write!(f, "estimate"),
            Token::Let => write!(f, "let"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Assign => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex a .hpl source string into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters or out-of-range integers. Lexing is non-fatal.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords() {
        let tokens = lex_ok("input param rdom func extern wrapper update where schedule output estimate let");
        assert_eq!(
            tokens,
            vec![
                Token::Input,
                Token::Param,
                Token::Rdom,
                Token::Func,
                Token::Extern,
                Token::Wrapper,
                Token::Update,
                Token::Where,
                Token::Schedule,
                Token::Output,
                Token::Estimate,
                Token::Let,
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_ident() {
        assert_eq!(lex_ok("inputs letter"), vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn two_char_operators_win() {
        assert_eq!(
            lex_ok("<= < >= > == = != ! && ||"),
            vec![
                Token::Le,
                Token::Lt,
                Token::Ge,
                Token::Gt,
                Token::EqEq,
                Token::Assign,
                Token::Ne,
                Token::Bang,
                Token::AndAnd,
                Token::OrOr,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex_ok("42 0.5 1e3 7"),
            vec![
                Token::Int(42),
                Token::Float(0.5),
                Token::Float(1000.0),
                Token::Int(7),
            ]
        );
    }

    #[test]
    fn minus_is_an_operator() {
        assert_eq!(lex_ok("x-1"), vec![Token::Ident, Token::Minus, Token::Int(1)]);
    }

    #[test]
    fn dotted_rvar() {
        assert_eq!(lex_ok("r.x"), vec![Token::Ident, Token::Dot, Token::Ident]);
    }

    #[test]
    fn newlines_collapse_and_comments_skip() {
        let tokens = lex_ok("func # comment\n\n\noutput");
        assert_eq!(tokens, vec![Token::Func, Token::Newline, Token::Output]);
    }

    #[test]
    fn spans_correct() {
        let result = lex("func blur");
        assert_eq!(result.tokens[1].1, Span { start: 5, end: 9 });
    }

    #[test]
    fn error_recovery() {
        let result = lex("f(x) @ 1");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 5, end: 6 });
        assert_eq!(result.tokens.len(), 5);
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
    }
}
