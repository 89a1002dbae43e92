// diag.rs — Unified diagnostics model
//
// Provides the user-facing diagnostic type shared by the front end (parse,
// lower) and by FunctionDAG construction. Internal consistency violations are
// not diagnostics: they panic at the point of detection.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::SourceSpan;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`).
///
/// Codes are `&'static str` constants defined in the `codes` module. Once
/// assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // ── Front end ──
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error

    // ── Graph construction ──
    pub const E0100: DiagCode = DiagCode("E0100"); // missing output estimate
    pub const E0101: DiagCode = DiagCode("E0101"); // scheduling directive on input
    pub const E0102: DiagCode = DiagCode("E0102"); // unbounded producer -> consumer
    pub const E0103: DiagCode = DiagCode("E0103"); // unbounded region computed
    pub const E0104: DiagCode = DiagCode("E0104"); // non-constant or empty estimate
    pub const E0105: DiagCode = DiagCode("E0105"); // parameter without estimate
    pub const E0106: DiagCode = DiagCode("E0106"); // dependency cycle

    // ── Lowering ──
    pub const E0200: DiagCode = DiagCode("E0200"); // unknown name
    pub const E0201: DiagCode = DiagCode("E0201"); // duplicate definition
    pub const E0202: DiagCode = DiagCode("E0202"); // used before definition
    pub const E0203: DiagCode = DiagCode("E0203"); // malformed definition args
    pub const E0204: DiagCode = DiagCode("E0204"); // unknown output
    pub const E0205: DiagCode = DiagCode("E0205"); // bad schedule target
    pub const E0206: DiagCode = DiagCode("E0206"); // wrong arity
    pub const E0207: DiagCode = DiagCode("E0207"); // unknown type
    pub const E0208: DiagCode = DiagCode("E0208"); // unknown directive
    pub const E0209: DiagCode = DiagCode("E0209"); // self-call in pure definition
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A user-facing diagnostic emitted by the front end or graph construction.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// Source location, when the failing construct came from `.hpl` text.
    pub span: Option<SourceSpan>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, span, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span: None,
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for an error-level diagnostic carrying `code`.
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a source span.
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}
