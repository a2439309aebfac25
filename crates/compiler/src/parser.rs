//! Recursive-descent parser with precedence climbing for expressions and
//! statement-level panic-mode recovery. A parse error never aborts the
//! whole parse: the parser reports a diagnostic, resynchronizes at the
//! next statement-starting keyword or a closing brace, and continues to
//! end-of-file.

use nms_core::diagnostics::{Diagnostic, DiagnosticCollection, ErrorCode};
use nms_core::span::{SourceLocation, Span};
use nms_core::token::{Literal, Token, TokenKind};

use crate::ast::{
    BinaryOp, CharacterDecl, ChoiceOption, ChoiceStmt, Expression, GotoStmt, HideStmt, IfStmt,
    MediaType, PlayStmt, Position, Program, SceneDecl, SetStmt, ShowStmt, ShowTarget, Statement,
    StopStmt, TransitionStmt, UnaryOp, WaitStmt,
};
use crate::ast::{Literal as AstLiteral, SayStmt};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: DiagnosticCollection,
}

/// Token kinds that begin a new statement; `synchronize` fast-forwards to
/// the next one of these (or end-of-file) after an error.
const STATEMENT_STARTS: &[TokenKind] = &[
    TokenKind::Character,
    TokenKind::Scene,
    TokenKind::Show,
    TokenKind::Hide,
    TokenKind::Say,
    TokenKind::Choice,
    TokenKind::If,
    TokenKind::Goto,
    TokenKind::Wait,
    TokenKind::Play,
    TokenKind::Stop,
    TokenKind::Set,
    TokenKind::Transition,
];

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            diagnostics: DiagnosticCollection::new(),
        }
    }

    pub fn parse(source: &str) -> (Program, DiagnosticCollection) {
        let (tokens, mut diagnostics) = crate::lexer::Lexer::tokenize(source);
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        diagnostics.extend(parser.diagnostics);
        (program, diagnostics)
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::new();

        while !self.is_at_end() {
            if self.match_kind(TokenKind::Character) {
                program.characters.push(self.parse_character_decl());
            } else if self.match_kind(TokenKind::Scene) {
                program.scenes.push(self.parse_scene_decl());
            } else if let Some(stmt) = self.parse_statement() {
                program.global_statements.push(stmt);
            } else if !self.is_at_end() {
                // parse_statement() consumed nothing and produced nothing:
                // force progress so the loop can't spin forever.
                self.advance();
            }
        }

        program
    }

    // --- token navigation ---

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, code: ErrorCode, message: &str) -> Token {
        if self.check(kind) {
            self.advance().clone()
        } else {
            self.error(code, message);
            self.peek().clone()
        }
    }

    fn error(&mut self, code: ErrorCode, message: &str) {
        let span = Span::point(self.peek().span.start);
        self.diagnostics
            .add(Diagnostic::error(code, message, span));
    }

    /// Consumes tokens until the next statement-starting keyword, a
    /// closing brace, or end-of-file, so the parser can keep going after
    /// a syntax error instead of aborting the whole parse.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.check(TokenKind::RightBrace) || STATEMENT_STARTS.contains(&self.peek().kind) {
                return;
            }
            self.advance();
        }
    }

    // --- declarations ---

    fn parse_character_decl(&mut self) -> CharacterDecl {
        let loc = self.previous().span.start;
        let id_tok = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected character identifier");
        let mut decl = CharacterDecl {
            id: id_tok.lexeme,
            display_name: String::new(),
            color: String::new(),
            default_sprite: None,
            span: Span::new(loc, self.peek().span.start),
        };

        if self.match_kind(TokenKind::LeftParen) {
            loop {
                let prop = self.consume(
                    TokenKind::Identifier,
                    ErrorCode::ExpectedIdentifier,
                    "expected property name",
                );
                self.consume(TokenKind::Equal, ErrorCode::UnexpectedToken, "expected '=' after property name");

                match prop.lexeme.as_str() {
                    "name" => {
                        let value = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected string for name");
                        decl.display_name = value.lexeme;
                    }
                    "color" => {
                        let value = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected color string");
                        decl.color = value.lexeme;
                    }
                    "sprite" => {
                        let value = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected sprite string");
                        decl.default_sprite = Some(value.lexeme);
                    }
                    other => {
                        self.error(ErrorCode::InvalidSyntax, &format!("unknown character property '{other}'"));
                        if !self.is_at_end() {
                            self.advance();
                        }
                    }
                }

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RightParen, ErrorCode::ExpectedRightParen, "expected ')' after character properties");
        }

        decl.span = Span::new(loc, self.previous().span.end);
        decl
    }

    fn parse_scene_decl(&mut self) -> SceneDecl {
        let loc = self.previous().span.start;
        let name = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected scene name").lexeme;
        self.consume(TokenKind::LeftBrace, ErrorCode::ExpectedLeftBrace, "expected '{' before scene body");
        let body = self.parse_statement_list();
        self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after scene body");

        SceneDecl {
            name,
            body,
            span: Span::new(loc, self.previous().span.end),
        }
    }

    fn parse_statement_list(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None if self.pos == before => {
                    self.error(ErrorCode::ExpectedStatement, "unexpected token in statement list");
                    self.advance();
                }
                None => {}
            }
        }
        statements
    }

    // --- statements ---

    fn parse_statement(&mut self) -> Option<Statement> {
        if self.check(TokenKind::RightBrace) || self.is_at_end() {
            return None;
        }

        let before = self.pos;
        let result = if self.match_kind(TokenKind::Show) {
            Some(self.parse_show_stmt())
        } else if self.match_kind(TokenKind::Hide) {
            Some(self.parse_hide_stmt())
        } else if self.match_kind(TokenKind::Say) {
            Some(self.parse_say_stmt())
        } else if self.match_kind(TokenKind::Choice) {
            Some(self.parse_choice_stmt())
        } else if self.match_kind(TokenKind::If) {
            self.parse_if_stmt()
        } else if self.match_kind(TokenKind::Goto) {
            Some(self.parse_goto_stmt())
        } else if self.match_kind(TokenKind::Wait) {
            Some(self.parse_wait_stmt())
        } else if self.match_kind(TokenKind::Play) {
            self.parse_play_stmt()
        } else if self.match_kind(TokenKind::Stop) {
            self.parse_stop_stmt()
        } else if self.match_kind(TokenKind::Set) {
            Some(self.parse_set_stmt())
        } else if self.match_kind(TokenKind::Transition) {
            Some(self.parse_transition_stmt())
        } else if self.match_kind(TokenKind::LeftBrace) {
            Some(self.parse_block())
        } else if self.check(TokenKind::Identifier)
            && matches!(self.peek_at(1).map(|t| t.kind), Some(TokenKind::String))
        {
            // Dialogue shorthand: `Identifier "text"` === `say Identifier "text"`.
            let speaker = self.advance().clone();
            let text = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected string after speaker");
            Some(Statement::Say(SayStmt {
                speaker: Some(speaker.lexeme),
                text: text.lexeme,
                span: Span::new(speaker.span.start, text.span.end),
            }))
        } else {
            let loc = self.peek().span.start;
            self.parse_expression().map(|expr| Statement::ExpressionStmt {
                span: Span::new(loc, expr.span().end),
                expr,
            })
        };

        if result.is_none() && self.pos == before {
            self.error(ErrorCode::ExpectedStatement, "expected statement");
            self.synchronize();
        }

        result
    }

    fn parse_show_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;

        let stmt = if self.match_kind(TokenKind::Background) {
            let resource = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected background resource");
            ShowStmt {
                target: ShowTarget::Background,
                identifier: String::new(),
                resource: Some(resource.lexeme),
                position: None,
                custom_x: None,
                custom_y: None,
                transition: None,
                duration: None,
                span: Span::new(loc, loc),
            }
        } else {
            let id = self.consume(
                TokenKind::Identifier,
                ErrorCode::ExpectedIdentifier,
                "expected character/sprite identifier",
            );
            let mut stmt = ShowStmt {
                target: ShowTarget::Character,
                identifier: id.lexeme,
                resource: None,
                position: None,
                custom_x: None,
                custom_y: None,
                transition: None,
                duration: None,
                span: Span::new(loc, loc),
            };

            if self.check(TokenKind::String) {
                stmt.resource = Some(self.advance().clone().lexeme);
                stmt.target = ShowTarget::Sprite;
            }

            if self.match_kind(TokenKind::At) {
                stmt.position = Some(self.parse_position());
                if stmt.position == Some(Position::Custom) {
                    let x = self.consume(TokenKind::Float, ErrorCode::ExpectedExpression, "expected X coordinate");
                    stmt.custom_x = x.literal.and_then(as_f32);
                    self.consume(TokenKind::Comma, ErrorCode::UnexpectedToken, "expected ',' between coordinates");
                    let y = self.consume(TokenKind::Float, ErrorCode::ExpectedExpression, "expected Y coordinate");
                    stmt.custom_y = y.literal.and_then(as_f32);
                }
            }

            stmt
        };

        let mut stmt = stmt;
        self.parse_optional_transition(&mut stmt.transition, &mut stmt.duration);
        stmt.span = Span::new(loc, self.previous().span.end);
        Statement::Show(stmt)
    }

    fn parse_hide_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let id = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected identifier to hide");
        let mut transition = None;
        let mut duration = None;
        self.parse_optional_transition(&mut transition, &mut duration);

        Statement::Hide(HideStmt {
            identifier: id.lexeme,
            transition,
            duration,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_optional_transition(&mut self, transition: &mut Option<String>, duration: &mut Option<f32>) {
        if self.match_kind(TokenKind::Transition) {
            let kind = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected transition type");
            *transition = Some(kind.lexeme);
            if self.check(TokenKind::Float) || self.check(TokenKind::Integer) {
                *duration = self.advance().clone().literal.and_then(as_f32);
            }
        }
    }

    fn parse_say_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let speaker = if self.check(TokenKind::Identifier) {
            Some(self.advance().clone().lexeme)
        } else {
            None
        };
        let text = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected dialogue text");
        Statement::Say(SayStmt {
            speaker,
            text: text.lexeme,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_choice_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        self.consume(TokenKind::LeftBrace, ErrorCode::ExpectedLeftBrace, "expected '{' before choice options");

        let mut options = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let opt_loc = self.peek().span.start;
            let text = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected choice text").lexeme;

            let condition = if self.match_kind(TokenKind::If) {
                self.parse_expression()
            } else {
                None
            };

            self.consume(TokenKind::Arrow, ErrorCode::UnexpectedToken, "expected '->' after choice text");

            let mut goto_target = None;
            let mut body = Vec::new();
            if self.match_kind(TokenKind::Goto) {
                goto_target = Some(
                    self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected goto target")
                        .lexeme,
                );
            } else if self.check(TokenKind::LeftBrace) {
                self.advance();
                body = self.parse_statement_list();
                self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after choice body");
            } else if let Some(stmt) = self.parse_statement() {
                body.push(stmt);
            }

            options.push(ChoiceOption {
                text,
                condition,
                body,
                goto_target,
                span: Span::new(opt_loc, self.previous().span.end),
            });
        }

        self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after choice block");

        if options.is_empty() {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::EmptyChoiceBlock,
                "choice block has no options",
                Span::point(loc),
            ));
        }

        Statement::Choice(ChoiceStmt {
            options,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_if_stmt(&mut self) -> Option<Statement> {
        let loc = self.previous().span.start;
        let condition = self.parse_expression()?;

        self.consume(TokenKind::LeftBrace, ErrorCode::ExpectedLeftBrace, "expected '{' before if body");
        let then_branch = self.parse_statement_list();
        self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after if body");

        let mut else_branch = Vec::new();
        if self.match_kind(TokenKind::Else) {
            if self.match_kind(TokenKind::If) {
                if let Some(nested) = self.parse_if_stmt() {
                    else_branch.push(nested);
                }
            } else {
                self.consume(TokenKind::LeftBrace, ErrorCode::ExpectedLeftBrace, "expected '{' before else body");
                else_branch = self.parse_statement_list();
                self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after else body");
            }
        }

        Some(Statement::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span: Span::new(loc, self.previous().span.end),
        }))
    }

    fn parse_goto_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let target = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected goto target").lexeme;
        Statement::Goto(GotoStmt {
            target,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_wait_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let duration = if self.check(TokenKind::Float) || self.check(TokenKind::Integer) {
            self.advance().clone().literal.and_then(as_f32).unwrap_or(0.0)
        } else {
            self.error(ErrorCode::ExpectedExpression, "expected duration after 'wait'");
            0.0
        };
        Statement::Wait(WaitStmt {
            duration,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_play_stmt(&mut self) -> Option<Statement> {
        let loc = self.previous().span.start;
        let media = if self.match_kind(TokenKind::Sound) {
            MediaType::Sound
        } else if self.match_kind(TokenKind::Music) {
            MediaType::Music
        } else {
            self.error(ErrorCode::UnexpectedToken, "expected 'sound' or 'music' after 'play'");
            return None;
        };

        let resource = self.consume(TokenKind::String, ErrorCode::ExpectedString, "expected resource path").lexeme;

        let volume = if self.check(TokenKind::Float) || self.check(TokenKind::Integer) {
            self.advance().clone().literal.and_then(as_f32)
        } else {
            None
        };

        let looped = if self.check(TokenKind::Identifier) && self.peek().lexeme == "loop" {
            self.advance();
            Some(true)
        } else {
            None
        };

        Some(Statement::Play(PlayStmt {
            media,
            resource,
            volume,
            looped,
            span: Span::new(loc, self.previous().span.end),
        }))
    }

    fn parse_stop_stmt(&mut self) -> Option<Statement> {
        let loc = self.previous().span.start;
        let media = if self.match_kind(TokenKind::Sound) {
            MediaType::Sound
        } else if self.match_kind(TokenKind::Music) {
            MediaType::Music
        } else {
            self.error(ErrorCode::UnexpectedToken, "expected 'sound' or 'music' after 'stop'");
            return None;
        };

        let fade_out = if self.match_kind(TokenKind::Fade) {
            if self.check(TokenKind::Float) || self.check(TokenKind::Integer) {
                self.advance().clone().literal.and_then(as_f32)
            } else {
                None
            }
        } else {
            None
        };

        Some(Statement::Stop(StopStmt {
            media,
            fade_out,
            span: Span::new(loc, self.previous().span.end),
        }))
    }

    fn parse_set_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let is_flag = self.check(TokenKind::Identifier) && self.peek().lexeme == "flag" && {
            matches!(self.peek_at(1).map(|t| t.kind), Some(TokenKind::Identifier))
        };
        if is_flag {
            self.advance();
        }

        let variable = self.consume(TokenKind::Identifier, ErrorCode::ExpectedIdentifier, "expected variable name").lexeme;
        self.consume(TokenKind::Equal, ErrorCode::UnexpectedToken, "expected '=' after variable name");
        let value = self
            .parse_expression()
            .unwrap_or_else(|| placeholder_expr(self.peek().span.start));

        Statement::Set(SetStmt {
            variable,
            value,
            is_flag,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_transition_stmt(&mut self) -> Statement {
        let loc = self.previous().span.start;

        let kind = if self.match_kind(TokenKind::Fade) {
            "fade".to_string()
        } else if self.check(TokenKind::Identifier) {
            self.advance().clone().lexeme
        } else {
            self.error(ErrorCode::ExpectedIdentifier, "expected transition type (fade, dissolve, slide, etc.)");
            "fade".to_string()
        };

        let duration = if self.check(TokenKind::Float) || self.check(TokenKind::Integer) {
            self.advance().clone().literal.and_then(as_f32).unwrap_or(0.0)
        } else {
            self.error(ErrorCode::ExpectedExpression, "expected duration after transition type");
            0.0
        };

        let color = if self.check(TokenKind::String) {
            Some(self.advance().clone().lexeme)
        } else {
            None
        };

        Statement::Transition(TransitionStmt {
            kind,
            duration,
            color,
            span: Span::new(loc, self.previous().span.end),
        })
    }

    fn parse_block(&mut self) -> Statement {
        let loc = self.previous().span.start;
        let statements = self.parse_statement_list();
        self.consume(TokenKind::RightBrace, ErrorCode::ExpectedRightBrace, "expected '}' after block");
        Statement::Block {
            statements,
            span: Span::new(loc, self.previous().span.end),
        }
    }

    fn parse_position(&mut self) -> Position {
        if self.check(TokenKind::Identifier) {
            let pos = match self.peek().lexeme.as_str() {
                "left" => Some(Position::Left),
                "center" => Some(Position::Center),
                "right" => Some(Position::Right),
                "custom" => Some(Position::Custom),
                _ => None,
            };
            if let Some(pos) = pos {
                self.advance();
                return pos;
            }
        }
        self.error(ErrorCode::InvalidSyntax, "expected position (left, center, right, or custom)");
        Position::Center
    }

    // --- expressions ---

    fn parse_expression(&mut self) -> Option<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expression> {
        let mut expr = self.parse_and()?;
        while self.match_kind(TokenKind::Or) {
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }
        Some(expr)
    }

    fn parse_and(&mut self) -> Option<Expression> {
        let mut expr = self.parse_equality()?;
        while self.match_kind(TokenKind::And) {
            let right = self.parse_equality()?;
            expr = binary(expr, BinaryOp::And, right);
        }
        Some(expr)
    }

    fn parse_equality(&mut self) -> Option<Expression> {
        let mut expr = self.parse_comparison()?;
        while self.match_any(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let op = if self.previous().kind == TokenKind::EqualEqual {
                BinaryOp::Eq
            } else {
                BinaryOp::Ne
            };
            let right = self.parse_comparison()?;
            expr = binary(expr, op, right);
        }
        Some(expr)
    }

    fn parse_comparison(&mut self) -> Option<Expression> {
        let mut expr = self.parse_term()?;
        while self.match_any(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = match self.previous().kind {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::Le,
                TokenKind::Greater => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            };
            let right = self.parse_term()?;
            expr = binary(expr, op, right);
        }
        Some(expr)
    }

    fn parse_term(&mut self) -> Option<Expression> {
        let mut expr = self.parse_factor()?;
        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = if self.previous().kind == TokenKind::Plus {
                BinaryOp::Add
            } else {
                BinaryOp::Sub
            };
            let right = self.parse_factor()?;
            expr = binary(expr, op, right);
        }
        Some(expr)
    }

    fn parse_factor(&mut self) -> Option<Expression> {
        let mut expr = self.parse_unary()?;
        while self.match_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = match self.previous().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }
        Some(expr)
    }

    fn parse_unary(&mut self) -> Option<Expression> {
        if self.match_any(&[TokenKind::Not, TokenKind::Minus]) {
            let loc = self.previous().span.start;
            let op = if self.previous().kind == TokenKind::Not {
                UnaryOp::Not
            } else {
                UnaryOp::Neg
            };
            let operand = self.parse_unary()?;
            let span = Span::new(loc, operand.span().end);
            return Some(Expression::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Option<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_kind(TokenKind::LeftParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    loop {
                        if let Some(arg) = self.parse_expression() {
                            args.push(arg);
                        }
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = self
                    .consume(TokenKind::RightParen, ErrorCode::ExpectedRightParen, "expected ')' after arguments")
                    .span
                    .end;

                let callee = match &expr {
                    Expression::Identifier { name, .. } => name.clone(),
                    _ => String::new(),
                };
                let span = Span::new(expr.span().start, end);
                expr = Expression::Call { callee, args, span };
            } else if self.match_kind(TokenKind::Dot) {
                let name_tok = self.consume(
                    TokenKind::Identifier,
                    ErrorCode::ExpectedIdentifier,
                    "expected property name after '.'",
                );
                let span = Span::new(expr.span().start, name_tok.span.end);
                expr = Expression::Property {
                    object: Box::new(expr),
                    name: name_tok.lexeme,
                    span,
                };
            } else {
                break;
            }
        }

        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expression> {
        let loc = self.peek().span.start;

        if self.match_kind(TokenKind::True) {
            return Some(literal_expr(AstLiteral::Bool(true), loc, self.previous().span.end));
        }
        if self.match_kind(TokenKind::False) {
            return Some(literal_expr(AstLiteral::Bool(false), loc, self.previous().span.end));
        }
        if self.match_kind(TokenKind::Integer) {
            let value = match self.previous().literal {
                Some(Literal::Int(v)) => v,
                _ => 0,
            };
            return Some(literal_expr(AstLiteral::Int(value), loc, self.previous().span.end));
        }
        if self.match_kind(TokenKind::Float) {
            let value = match self.previous().literal {
                Some(Literal::Float(v)) => v,
                _ => 0.0,
            };
            return Some(literal_expr(AstLiteral::Float(value), loc, self.previous().span.end));
        }
        if self.match_kind(TokenKind::String) {
            let text = self.previous().lexeme.clone();
            return Some(literal_expr(AstLiteral::String(text), loc, self.previous().span.end));
        }
        if self.match_kind(TokenKind::Identifier) {
            let name = self.previous().lexeme.clone();
            return Some(Expression::Identifier {
                name,
                span: Span::new(loc, self.previous().span.end),
            });
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.parse_expression();
            self.consume(TokenKind::RightParen, ErrorCode::ExpectedRightParen, "expected ')' after expression");
            return expr;
        }

        self.error(ErrorCode::ExpectedExpression, "expected expression");
        if !self.is_at_end() {
            self.advance();
        }
        None
    }
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    let span = Span::new(left.span().start, right.span().end);
    Expression::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
        span,
    }
}

fn literal_expr(value: AstLiteral, start: SourceLocation, end: SourceLocation) -> Expression {
    Expression::Literal {
        value,
        span: Span::new(start, end),
    }
}

fn placeholder_expr(at: SourceLocation) -> Expression {
    Expression::Literal {
        value: AstLiteral::Null,
        span: Span::point(at),
    }
}

fn as_f32(literal: Literal) -> Option<f32> {
    match literal {
        Literal::Int(v) => Some(v as f32),
        Literal::Float(v) => Some(v as f32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_order_matches_textual_order() {
        let (program, diags) = Parser::parse(
            r##"
            character Hero(name="Alex", color="#FFCC00")
            scene intro { Hero "Hi." }
            "##,
        );
        assert!(!diags.has_errors());
        assert_eq!(program.characters.len(), 1);
        assert_eq!(program.scenes.len(), 1);
        assert_eq!(program.scenes[0].body.len(), 1);
        match &program.scenes[0].body[0] {
            Statement::Say(say) => {
                assert_eq!(say.speaker.as_deref(), Some("Hero"));
                assert_eq!(say.text, "Hi.");
            }
            other => panic!("expected Say, got {other:?}"),
        }
    }

    #[test]
    fn panic_mode_recovery_still_yields_a_statement_after_error() {
        let (program, diags) = Parser::parse(
            r#"
            scene start {
                set = =
                wait 1.0
            }
            "#,
        );
        assert!(diags.has_errors());
        assert!(!program.scenes[0].body.is_empty());
    }

    #[test]
    fn choice_block_preserves_option_order() {
        let (program, _) = Parser::parse(
            r#"
            scene start {
                choice {
                    "L" -> goto left
                    "R" -> goto right
                }
            }
            "#,
        );
        match &program.scenes[0].body[0] {
            Statement::Choice(choice) => {
                assert_eq!(choice.options[0].text, "L");
                assert_eq!(choice.options[1].text, "R");
            }
            other => panic!("expected Choice, got {other:?}"),
        }
    }

    #[test]
    fn expression_precedence_climbs_correctly() {
        let (program, _) = Parser::parse("set x = 1 + 2 * 3");
        match &program.global_statements[0] {
            Statement::Set(set) => match &set.value {
                Expression::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(**right, Expression::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("expected top-level Add, got {other:?}"),
            },
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn empty_choice_block_is_reported() {
        let (_, diags) = Parser::parse("scene s { choice { } }");
        assert!(diags.has_errors());
    }
}
