//! Coded, severity-labeled diagnostics shared by every compilation phase.
//!
//! Phases never throw: each returns a (possibly partial) result alongside a
//! `DiagnosticCollection`. An `Error`-severity entry blocks the caller from
//! proceeding to the next phase; `Warning`/`Info`/`Hint` pass through.

use crate::span::{SourceLocation, Span};
use std::fmt;

/// How serious a diagnostic is. Only `Error` fails compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable, numbered diagnostic codes partitioned by the phase that raises
/// them: 1xxx lexer, 2xxx parser, 3xxx semantic (sub-partitioned by
/// concern), 4xxx compiler, 5xxx runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    // Lexer (1xxx)
    UnexpectedCharacter = 1001,
    UnterminatedString = 1002,
    InvalidNumber = 1003,
    InvalidEscapeSequence = 1004,
    UnterminatedComment = 1005,

    // Parser (2xxx)
    UnexpectedToken = 2001,
    ExpectedIdentifier = 2002,
    ExpectedExpression = 2003,
    ExpectedStatement = 2004,
    ExpectedLeftBrace = 2005,
    ExpectedRightBrace = 2006,
    ExpectedLeftParen = 2007,
    ExpectedRightParen = 2008,
    ExpectedString = 2009,
    InvalidSyntax = 2010,

    // Semantic - characters (30xx)
    UndefinedCharacter = 3001,
    DuplicateCharacterDefinition = 3002,
    UnusedCharacter = 3003,

    // Semantic - scenes (31xx)
    UndefinedScene = 3101,
    DuplicateSceneDefinition = 3102,
    UnusedScene = 3103,
    EmptyScene = 3104,
    UnreachableScene = 3105,

    // Semantic - variables (32xx)
    UndefinedVariable = 3201,
    UnusedVariable = 3202,
    VariableRedefinition = 3203,
    UninitializedVariable = 3204,

    // Semantic - control flow (33xx)
    DeadCode = 3301,
    InfiniteLoop = 3302,
    UnreachableCode = 3303,
    MissingReturn = 3304,
    InvalidGotoTarget = 3305,

    // Semantic - type (34xx)
    TypeMismatch = 3401,
    InvalidOperandTypes = 3402,
    InvalidConditionType = 3403,

    // Semantic - resources (35xx)
    UndefinedResource = 3501,
    InvalidResourcePath = 3502,

    // Semantic - choice (36xx)
    EmptyChoiceBlock = 3601,
    DuplicateChoiceText = 3602,
    ChoiceWithoutBranch = 3603,

    // Compiler (4xxx)
    CompilationFailed = 4001,
    TooManyConstants = 4002,
    TooManyVariables = 4003,
    JumpTargetOutOfRange = 4004,
    InvalidOpcode = 4005,

    // Runtime (5xxx)
    StackOverflow = 5001,
    StackUnderflow = 5002,
    DivisionByZero = 5003,
    InvalidInstruction = 5004,
    ResourceLoadFailed = 5005,
}

impl ErrorCode {
    /// Human-readable description, independent of any particular message
    /// text a call site attaches.
    pub fn description(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            UnexpectedCharacter => "Unexpected character",
            UnterminatedString => "Unterminated string literal",
            InvalidNumber => "Invalid number format",
            InvalidEscapeSequence => "Invalid escape sequence",
            UnterminatedComment => "Unterminated block comment",

            UnexpectedToken => "Unexpected token",
            ExpectedIdentifier => "Expected identifier",
            ExpectedExpression => "Expected expression",
            ExpectedStatement => "Expected statement",
            ExpectedLeftBrace => "Expected '{'",
            ExpectedRightBrace => "Expected '}'",
            ExpectedLeftParen => "Expected '('",
            ExpectedRightParen => "Expected ')'",
            ExpectedString => "Expected string",
            InvalidSyntax => "Invalid syntax",

            UndefinedCharacter => "Undefined character",
            DuplicateCharacterDefinition => "Duplicate character definition",
            UnusedCharacter => "Unused character",

            UndefinedScene => "Undefined scene",
            DuplicateSceneDefinition => "Duplicate scene definition",
            UnusedScene => "Unused scene",
            EmptyScene => "Empty scene",
            UnreachableScene => "Unreachable scene",

            UndefinedVariable => "Undefined variable",
            UnusedVariable => "Unused variable",
            VariableRedefinition => "Variable redefinition",
            UninitializedVariable => "Use of uninitialized variable",

            DeadCode => "Dead code detected",
            InfiniteLoop => "Possible infinite loop",
            UnreachableCode => "Unreachable code",
            MissingReturn => "Missing return statement",
            InvalidGotoTarget => "Invalid goto target",

            TypeMismatch => "Type mismatch",
            InvalidOperandTypes => "Invalid operand types",
            InvalidConditionType => "Invalid condition type",

            UndefinedResource => "Undefined resource",
            InvalidResourcePath => "Invalid resource path",

            EmptyChoiceBlock => "Empty choice block",
            DuplicateChoiceText => "Duplicate choice text",
            ChoiceWithoutBranch => "Choice without branch",

            CompilationFailed => "Compilation failed",
            TooManyConstants => "Too many constants",
            TooManyVariables => "Too many variables",
            JumpTargetOutOfRange => "Jump target out of range",
            InvalidOpcode => "Invalid opcode",

            StackOverflow => "Stack overflow",
            StackUnderflow => "Stack underflow",
            DivisionByZero => "Division by zero",
            InvalidInstruction => "Invalid instruction",
            ResourceLoadFailed => "Resource load failed",
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.code())
    }
}

/// A related source location attached to a diagnostic, e.g. "previously
/// defined here".
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedInfo {
    pub location: SourceLocation,
    pub message: String,
}

/// A single coded, severity-labeled compiler message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub source_snippet: Option<String>,
    pub related: Vec<RelatedInfo>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            code,
            severity,
            message: message.into(),
            span,
            source_snippet: None,
            related: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Error, message, span)
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Warning, message, span)
    }

    pub fn info(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Info, message, span)
    }

    pub fn hint(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Hint, message, span)
    }

    pub fn with_related(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source(mut self, snippet: impl Into<String>) -> Self {
        self.source_snippet = Some(snippet.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Renders as `severity[line:col]: message [Ecode]`, the exact
    /// user-visible form the CLI prints to stderr.
    pub fn format(&self) -> String {
        format!(
            "{}[{}:{}]: {} [{}]",
            self.severity, self.span.start.line, self.span.start.column, self.message, self.code
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// An ordered buffer of diagnostics accumulated across one or more phases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticCollection {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn add_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::error(code, message, span));
    }

    pub fn add_warning(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::warning(code, message, span));
    }

    pub fn add_info(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::info(code, message, span));
    }

    pub fn add_hint(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::hint(code, message, span));
    }

    pub fn extend(&mut self, other: DiagnosticCollection) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_warning)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_warning()).count()
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning()).collect()
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}

impl IntoIterator for DiagnosticCollection {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, col: u32) -> Span {
        Span::point(SourceLocation::new(line, col))
    }

    #[test]
    fn empty_collection_has_no_errors_or_warnings() {
        let diags = DiagnosticCollection::new();
        assert!(diags.is_empty());
        assert!(!diags.has_errors());
        assert!(!diags.has_warnings());
    }

    #[test]
    fn format_matches_cli_contract() {
        let d = Diagnostic::error(ErrorCode::UndefinedScene, "scene 'x' is not defined", loc(4, 9));
        assert_eq!(d.format(), "error[4:9]: scene 'x' is not defined [E3101]");
    }

    #[test]
    fn related_and_suggestions_chain() {
        let d = Diagnostic::error(ErrorCode::DuplicateCharacterDefinition, "dup", loc(1, 1))
            .with_related(SourceLocation::new(1, 1), "first defined here")
            .with_suggestion("rename one of the characters");
        assert_eq!(d.related.len(), 1);
        assert_eq!(d.suggestions.len(), 1);
    }

    #[test]
    fn collection_separates_errors_and_warnings() {
        let mut diags = DiagnosticCollection::new();
        diags.add_error(ErrorCode::UndefinedCharacter, "oops", loc(1, 1));
        diags.add_warning(ErrorCode::UnusedCharacter, "unused", loc(2, 1));
        assert!(diags.has_errors());
        assert!(diags.has_warnings());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.len(), 2);
    }
}
