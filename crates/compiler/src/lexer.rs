//! Single-pass lexer: turns `.nms` source text into a token stream plus
//! a diagnostic collection. Lexing never aborts; an unterminated string,
//! unterminated block comment, or invalid escape yields an `Error` token
//! and a diagnostic, and scanning continues from there.

use nms_core::diagnostics::{Diagnostic, DiagnosticCollection};
use nms_core::span::{SourceLocation, Span};
use nms_core::token::{Literal, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    start: usize,
    current: usize,
    line: u32,
    column: u32,
    start_line: u32,
    start_column: u32,
    diagnostics: DiagnosticCollection,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            diagnostics: DiagnosticCollection::new(),
        }
    }

    /// Scans the whole source to completion. Returns the token stream
    /// (always `Eof`-terminated) alongside whatever diagnostics were
    /// raised; callers may proceed on warnings-only collections.
    pub fn tokenize(source: &str) -> (Vec<Token>, DiagnosticCollection) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::with_capacity(source.len() / 4);

        loop {
            let token = lexer.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            if token.kind != TokenKind::Newline {
                tokens.push(token);
            }
            if is_eof {
                break;
            }
        }

        (tokens, lexer.diagnostics)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            return false;
        }
        self.advance();
        true
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                _ => return,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    /// Block comments nest: `/* a /* b */ c */` is one comment.
    fn skip_block_comment(&mut self) {
        let mut depth = 1;
        while !self.is_at_end() && depth > 0 {
            if self.peek() == '/' && self.peek_next() == '*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                self.advance();
            }
        }
        if depth > 0 {
            self.error_diagnostic("unterminated block comment");
        }
    }

    fn lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn start_loc(&self) -> SourceLocation {
        SourceLocation::new(self.start_line, self.start_column)
    }

    fn here(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.lexeme(), Span::new(self.start_loc(), self.here()))
    }

    fn error_token(&mut self, message: &str) -> Token {
        self.error_diagnostic(message);
        Token::new(TokenKind::Error, message, Span::point(self.start_loc()))
    }

    fn error_diagnostic(&mut self, message: &str) {
        use nms_core::diagnostics::ErrorCode;
        let code = if message.contains("comment") {
            ErrorCode::UnterminatedComment
        } else if message.contains("Unterminated string") || message.contains("unterminated string")
        {
            ErrorCode::UnterminatedString
        } else if message.contains("escape") {
            ErrorCode::InvalidEscapeSequence
        } else if message.contains("number") || message.contains("color") {
            ErrorCode::InvalidNumber
        } else {
            ErrorCode::UnexpectedCharacter
        };
        self.diagnostics
            .add(Diagnostic::error(code, message, Span::point(self.start_loc())));
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();

        if c == '\n' {
            return self.make_token(TokenKind::Newline);
        }

        if c == '/' {
            if self.matches('/') {
                self.skip_line_comment();
                return self.scan_token();
            }
            if self.matches('*') {
                self.skip_block_comment();
                return self.scan_token();
            }
            return self.make_token(TokenKind::Slash);
        }

        if c.is_ascii_digit() {
            return self.scan_number();
        }

        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier();
        }

        if c == '"' {
            return self.scan_string();
        }

        if c == '#' {
            if self.peek().is_ascii_hexdigit() {
                return self.scan_color_literal();
            }
            return self.make_token(TokenKind::Hash);
        }

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ':' => self.make_token(TokenKind::Colon),
            ';' => self.make_token(TokenKind::Semicolon),
            '.' => self.make_token(TokenKind::Dot),
            '+' => self.make_token(TokenKind::Plus),
            '*' => self.make_token(TokenKind::Star),
            '%' => self.make_token(TokenKind::Percent),
            '-' => {
                if self.matches('>') {
                    self.make_token(TokenKind::Arrow)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            '=' => {
                if self.matches('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            '!' => {
                if self.matches('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    self.error_token("unexpected character '!'")
                }
            }
            '<' => {
                if self.matches('=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.matches('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            other => self.error_token(&format!("unexpected character '{other}'")),
        }
    }

    fn scan_string(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\n' {
                return self.error_token("unterminated string (newline in string literal)");
            }

            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    return self.error_token("unterminated string (escape at end)");
                }
                let escaped = self.advance();
                match escaped {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    _ => return self.error_token("invalid escape sequence"),
                }
            } else {
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return self.error_token("unterminated string");
        }

        self.advance(); // closing quote
        Token::new(TokenKind::String, value, Span::new(self.start_loc(), self.here()))
    }

    fn scan_number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = self.lexeme();
        if is_float {
            match lexeme.parse::<f64>() {
                Ok(value) => self.make_token(TokenKind::Float).with_literal(Literal::Float(value)),
                Err(_) => self.error_token("invalid float literal"),
            }
        } else {
            match lexeme.parse::<i64>() {
                Ok(value) => self.make_token(TokenKind::Integer).with_literal(Literal::Int(value)),
                Err(_) => self.error_token("invalid integer literal"),
            }
        }
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        let lexeme = self.lexeme();
        let kind = TokenKind::keyword_lookup(&lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, lexeme, Span::new(self.start_loc(), self.here()))
    }

    /// `#` has already been consumed; only lengths 3, 4, 6, and 8 hex
    /// digits are accepted (`#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`).
    fn scan_color_literal(&mut self) -> Token {
        while self.peek().is_ascii_hexdigit() {
            self.advance();
        }
        let lexeme = self.lexeme();
        let hex_len = lexeme.len() - 1;
        if !matches!(hex_len, 3 | 4 | 6 | 8) {
            return self.error_token("invalid color literal format");
        }
        Token::new(TokenKind::String, lexeme, Span::new(self.start_loc(), self.here()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn last_token_is_always_eof() {
        let (tokens, _) = Lexer::tokenize("scene foo {}");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn keywords_and_identifiers_disambiguate() {
        assert_eq!(
            kinds("scene hero"),
            vec![TokenKind::Scene, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn nested_block_comments_are_consumed_as_one() {
        let (tokens, diags) = Lexer::tokenize("/* outer /* inner */ still-comment */ scene");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Scene);
    }

    #[test]
    fn unterminated_string_emits_error_and_diagnostic() {
        let (tokens, diags) = Lexer::tokenize("\"never closes");
        assert!(diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }

    #[test]
    fn invalid_escape_sequence_is_reported() {
        let (_, diags) = Lexer::tokenize("\"bad \\q escape\"");
        assert!(diags.has_errors());
    }

    #[test]
    fn integer_and_float_literals_round_trip_value() {
        let (tokens, _) = Lexer::tokenize("42 3.5");
        assert_eq!(tokens[0].literal, Some(Literal::Int(42)));
        assert_eq!(tokens[1].literal, Some(Literal::Float(3.5)));
    }

    #[test]
    fn color_literal_accepts_only_valid_lengths() {
        let (tokens, diags) = Lexer::tokenize("#fff #ff00ff #12");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert!(diags.has_errors());
    }

    #[test]
    fn operators_disambiguate_on_one_char_lookahead() {
        assert_eq!(
            kinds("= == < <= -> -"),
            vec![
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Arrow,
                TokenKind::Minus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_comment_runs_to_newline_only() {
        let (tokens, _) = Lexer::tokenize("scene // a comment\nfoo");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Scene, TokenKind::Identifier, TokenKind::Eof]
        );
    }
}
