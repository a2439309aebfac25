//! Source locations and spans.
//!
//! A `SourceLocation` is a 1-based (line, column) pair; a `Span` is a pair
//! of locations bracketing the text a diagnostic or AST node refers to.

use std::fmt;

/// A single position in source text. Lines and columns are 1-based, matching
/// the convention editors and `severity[line:col]` diagnostic output use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range of source text, inclusive of `start`, exclusive of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Span {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Span { start, end }
    }

    /// A zero-width span at a single location, used when a diagnostic has
    /// no meaningful end (e.g. an unexpected-character lex error).
    pub fn point(loc: SourceLocation) -> Self {
        Span { start: loc, end: loc }
    }

    /// True when `start` and `end` are the same location.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_span_is_empty() {
        let loc = SourceLocation::new(3, 7);
        assert!(Span::point(loc).is_empty());
    }

    #[test]
    fn display_formats_line_col() {
        let loc = SourceLocation::new(2, 5);
        assert_eq!(loc.to_string(), "2:5");
    }
}
