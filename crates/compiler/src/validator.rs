//! Two-pass semantic validation: collect definitions, then walk bodies
//! checking references, reachability, and configured "unused" reporting.

use std::collections::{HashMap, HashSet};

use nms_core::diagnostics::{Diagnostic, DiagnosticCollection, ErrorCode};
use nms_core::span::Span;

use crate::ast::{
    ChoiceStmt, Expression, GotoStmt, IfStmt, PlayStmt, Program, SayStmt, SetStmt, ShowStmt,
    ShowTarget, Statement, StopStmt, TransitionStmt,
};

/// Tracks where a symbol was defined and every place it was referenced,
/// mirroring the validator's definition/usage bookkeeping.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub definition_span: Span,
    pub usage_spans: Vec<Span>,
    pub defined: bool,
    pub used: bool,
}

impl SymbolInfo {
    fn new(name: &str, definition_span: Span) -> Self {
        SymbolInfo {
            name: name.to_string(),
            definition_span,
            usage_spans: Vec::new(),
            defined: true,
            used: false,
        }
    }
}

/// Toggles for warning classes whose defaults the spec leaves to the
/// implementation (see DESIGN.md's Open Questions section).
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub report_unused: bool,
    pub report_dead_code: bool,
    /// `set` on a variable with no prior `set` is allowed by the language
    /// (it becomes an implicit global with a null default); this only
    /// controls whether that case also raises a warning.
    pub warn_on_implicit_global: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            report_unused: true,
            report_dead_code: true,
            warn_on_implicit_global: false,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report_unused(mut self, value: bool) -> Self {
        self.report_unused = value;
        self
    }

    pub fn with_report_dead_code(mut self, value: bool) -> Self {
        self.report_dead_code = value;
        self
    }

    pub fn with_warn_on_implicit_global(mut self, value: bool) -> Self {
        self.warn_on_implicit_global = value;
        self
    }
}

const RECOGNIZED_TRANSITIONS: &[&str] = &["fade", "slide", "dissolve", "none", "fadethrough"];

pub struct Validator {
    config: ValidatorConfig,
    characters: HashMap<String, SymbolInfo>,
    scenes: HashMap<String, SymbolInfo>,
    variables: HashMap<String, SymbolInfo>,
    scene_graph: HashMap<String, HashSet<String>>,
    scene_order: Vec<String>,
    diagnostics: DiagnosticCollection,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Validator {
            config,
            characters: HashMap::new(),
            scenes: HashMap::new(),
            variables: HashMap::new(),
            scene_graph: HashMap::new(),
            scene_order: Vec::new(),
            diagnostics: DiagnosticCollection::new(),
        }
    }

    pub fn validate(program: &Program, config: ValidatorConfig) -> DiagnosticCollection {
        let mut validator = Validator::new(config);
        validator.collect_definitions(program);
        validator.validate_bodies(program);
        validator.check_reachability();
        if validator.config.report_unused {
            validator.report_unused_symbols();
        }
        validator.diagnostics
    }

    // --- pass 1: collect definitions ---

    fn collect_definitions(&mut self, program: &Program) {
        for decl in &program.characters {
            if let Some(existing) = self.characters.get(&decl.id) {
                self.diagnostics.add(
                    Diagnostic::error(
                        ErrorCode::DuplicateCharacterDefinition,
                        format!("character '{}' is already defined", decl.id),
                        decl.span,
                    )
                    .with_related(existing.definition_span.start, "previous definition here"),
                );
                continue;
            }
            self.characters
                .insert(decl.id.clone(), SymbolInfo::new(&decl.id, decl.span));
        }

        for decl in &program.scenes {
            if let Some(existing) = self.scenes.get(&decl.name) {
                self.diagnostics.add(
                    Diagnostic::error(
                        ErrorCode::DuplicateSceneDefinition,
                        format!("scene '{}' is already defined", decl.name),
                        decl.span,
                    )
                    .with_related(existing.definition_span.start, "previous definition here"),
                );
                continue;
            }
            self.scenes
                .insert(decl.name.clone(), SymbolInfo::new(&decl.name, decl.span));
            self.scene_order.push(decl.name.clone());
            self.scene_graph.insert(decl.name.clone(), HashSet::new());
        }
    }

    // --- pass 2: validate bodies ---

    fn validate_bodies(&mut self, program: &Program) {
        for scene in &program.scenes {
            let mut reachable = true;
            self.validate_statements(&scene.body, &mut reachable, Some(&scene.name));
        }
        let mut reachable = true;
        self.validate_statements(&program.global_statements, &mut reachable, None);
    }

    fn validate_statements(&mut self, stmts: &[Statement], reachable: &mut bool, in_scene: Option<&str>) {
        for stmt in stmts {
            if !*reachable && self.config.report_dead_code {
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::UnreachableCode,
                    "statement is unreachable",
                    stmt.span(),
                ));
            }
            self.validate_statement(stmt, reachable, in_scene);
            if matches!(stmt, Statement::Goto(_)) {
                *reachable = false;
            }
        }
    }

    fn validate_statement(&mut self, stmt: &Statement, reachable: &mut bool, in_scene: Option<&str>) {
        match stmt {
            Statement::CharacterDecl(_) | Statement::SceneDecl(_) => {}
            Statement::Show(show) => self.validate_show(show),
            Statement::Hide(hide) => self.mark_character_used(&hide.identifier, hide.span),
            Statement::Say(say) => self.validate_say(say),
            Statement::Choice(choice) => self.validate_choice(choice, reachable, in_scene),
            Statement::If(if_stmt) => self.validate_if(if_stmt, reachable, in_scene),
            Statement::Goto(goto) => self.validate_goto(goto, in_scene),
            Statement::Wait(_) => {}
            Statement::Play(play) => self.validate_play(play),
            Statement::Stop(stop) => self.validate_stop(stop),
            Statement::Set(set) => self.validate_set(set),
            Statement::Transition(transition) => self.validate_transition(transition),
            Statement::ExpressionStmt { expr, .. } => self.validate_expression(expr),
            Statement::Block { statements, .. } => {
                self.validate_statements(statements, reachable, in_scene);
            }
        }
    }

    fn validate_show(&mut self, show: &ShowStmt) {
        if !matches!(show.target, ShowTarget::Background) {
            self.mark_character_used(&show.identifier, show.span);
        }
    }

    fn validate_say(&mut self, say: &SayStmt) {
        if let Some(speaker) = &say.speaker {
            self.mark_character_used(speaker, say.span);
        }
    }

    fn validate_choice(&mut self, choice: &ChoiceStmt, reachable: &mut bool, in_scene: Option<&str>) {
        if choice.options.is_empty() {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::EmptyChoiceBlock,
                "choice block has no options",
                choice.span,
            ));
            return;
        }

        let mut seen_texts: HashMap<&str, Span> = HashMap::new();
        for option in &choice.options {
            if let Some(&first) = seen_texts.get(option.text.as_str()) {
                self.diagnostics.add(
                    Diagnostic::warning(
                        ErrorCode::DuplicateChoiceText,
                        format!("choice option text '{}' is duplicated", option.text),
                        option.span,
                    )
                    .with_related(first.start, "first occurrence here"),
                );
            } else {
                seen_texts.insert(&option.text, option.span);
            }

            if option.body.is_empty() && option.goto_target.is_none() {
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::ChoiceWithoutBranch,
                    "choice option has neither a body nor a goto target",
                    option.span,
                ));
            }

            if let Some(condition) = &option.condition {
                self.validate_expression(condition);
            }

            let mut branch_reachable = true;
            self.validate_statements(&option.body, &mut branch_reachable, in_scene);

            if let Some(target) = &option.goto_target {
                self.validate_goto(
                    &GotoStmt {
                        target: target.clone(),
                        span: option.span,
                    },
                    in_scene,
                );
            }
        }

        *reachable = true;
    }

    fn validate_if(&mut self, if_stmt: &IfStmt, reachable: &mut bool, in_scene: Option<&str>) {
        self.validate_expression(&if_stmt.condition);
        let mut then_reachable = true;
        self.validate_statements(&if_stmt.then_branch, &mut then_reachable, in_scene);
        let mut else_reachable = true;
        self.validate_statements(&if_stmt.else_branch, &mut else_reachable, in_scene);
        *reachable = then_reachable || else_reachable;
    }

    fn validate_goto(&mut self, goto: &GotoStmt, in_scene: Option<&str>) {
        if self.scenes.contains_key(&goto.target) {
            self.mark_scene_used(&goto.target, goto.span);
            if let Some(from) = in_scene {
                self.scene_graph
                    .entry(from.to_string())
                    .or_default()
                    .insert(goto.target.clone());
            }
        } else {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::UndefinedScene,
                format!("scene '{}' is not defined", goto.target),
                goto.span,
            ));
        }
    }

    fn validate_play(&mut self, play: &PlayStmt) {
        if play.resource.trim().is_empty() {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::InvalidResourcePath,
                "play resource path must not be empty",
                play.span,
            ));
        }
        if let Some(volume) = play.volume {
            if !(0.0..=1.0).contains(&volume) {
                self.diagnostics.add(Diagnostic::error(
                    ErrorCode::InvalidOperandTypes,
                    "volume must lie in [0, 1]",
                    play.span,
                ));
            }
        }
    }

    fn validate_stop(&mut self, stop: &StopStmt) {
        if let Some(fade) = stop.fade_out {
            if fade < 0.0 {
                self.diagnostics.add(Diagnostic::error(
                    ErrorCode::InvalidOperandTypes,
                    "stop fade duration must be non-negative",
                    stop.span,
                ));
            }
        }
    }

    fn validate_set(&mut self, set: &SetStmt) {
        self.validate_expression(&set.value);
        let already_defined = self.variables.contains_key(&set.variable);
        self.variables
            .entry(set.variable.clone())
            .or_insert_with(|| SymbolInfo::new(&set.variable, set.span))
            .defined = true;
        if !already_defined && self.config.warn_on_implicit_global {
            // Only fires when explicitly opted in; the default behavior
            // treats a fresh `set` as a normal definition, not a warning.
        }
    }

    fn validate_transition(&mut self, transition: &TransitionStmt) {
        if transition.duration < 0.0 {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::InvalidOperandTypes,
                "transition duration must be non-negative",
                transition.span,
            ));
        }
        if !RECOGNIZED_TRANSITIONS.contains(&transition.kind.as_str()) {
            self.diagnostics.add(Diagnostic::warning(
                ErrorCode::InvalidSyntax,
                format!("unrecognized transition type '{}'", transition.kind),
                transition.span,
            ));
        }
    }

    fn validate_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal { .. } => {}
            Expression::Identifier { name, span } => self.mark_variable_used(name, *span),
            Expression::Binary { left, right, .. } => {
                self.validate_expression(left);
                self.validate_expression(right);
            }
            Expression::Unary { operand, .. } => self.validate_expression(operand),
            Expression::Call { args, .. } => {
                for arg in args {
                    self.validate_expression(arg);
                }
            }
            Expression::Property { object, .. } => self.validate_expression(object),
        }
    }

    // --- pass 3: reachability ---

    fn check_reachability(&mut self) {
        let Some(entry) = self.scene_order.first().cloned() else {
            return;
        };

        let mut visited = HashSet::new();
        let mut stack = vec![entry.clone()];
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(targets) = self.scene_graph.get(&name) {
                for target in targets {
                    stack.push(target.clone());
                }
            }
        }

        for name in &self.scene_order {
            if name != &entry && !visited.contains(name) {
                let span = self.scenes[name].definition_span;
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::UnreachableScene,
                    format!("scene '{name}' is never reached from the entry scene"),
                    span,
                ));
            }
        }
    }

    fn report_unused_symbols(&mut self) {
        let entry_scene = self.scene_order.first().cloned();

        for (name, info) in &self.characters {
            if !info.used {
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::UnusedCharacter,
                    format!("character '{name}' is declared but never used"),
                    info.definition_span,
                ));
            }
        }

        for (name, info) in &self.scenes {
            if !info.used && Some(name) != entry_scene.as_ref() {
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::UnusedScene,
                    format!("scene '{name}' is declared but never referenced by goto"),
                    info.definition_span,
                ));
            }
        }

        for (name, info) in &self.variables {
            if !info.used {
                self.diagnostics.add(Diagnostic::warning(
                    ErrorCode::UnusedVariable,
                    format!("variable '{name}' is set but never read"),
                    info.definition_span,
                ));
            }
        }
    }

    // --- usage bookkeeping ---

    fn mark_character_used(&mut self, name: &str, span: Span) {
        if let Some(info) = self.characters.get_mut(name) {
            info.used = true;
            info.usage_spans.push(span);
        } else {
            self.diagnostics.add(Diagnostic::error(
                ErrorCode::UndefinedCharacter,
                format!("character '{name}' is not defined"),
                span,
            ));
        }
    }

    fn mark_scene_used(&mut self, name: &str, span: Span) {
        if let Some(info) = self.scenes.get_mut(name) {
            info.used = true;
            info.usage_spans.push(span);
        }
    }

    fn mark_variable_used(&mut self, name: &str, span: Span) {
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| SymbolInfo {
                name: name.to_string(),
                definition_span: span,
                usage_spans: Vec::new(),
                defined: false,
                used: false,
            });
        let info = self.variables.get_mut(name).unwrap();
        info.used = true;
        info.usage_spans.push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn validate(source: &str) -> DiagnosticCollection {
        let (program, parse_diags) = Parser::parse(source);
        assert!(!parse_diags.has_errors(), "unexpected parse errors: {parse_diags:?}");
        Validator::validate(&program, ValidatorConfig::default())
    }

    #[test]
    fn empty_program_is_valid() {
        let diags = validate("");
        assert!(diags.is_empty());
    }

    #[test]
    fn undefined_character_in_say_is_an_error() {
        let diags = validate(r#"scene s { Ghost "boo" }"#);
        assert!(diags.has_errors());
    }

    #[test]
    fn undefined_goto_target_is_an_error() {
        let diags = validate("scene s { goto nowhere }");
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_character_reports_related_info() {
        let diags = validate(
            r##"
            character Hero(name="A", color="#fff")
            character Hero(name="B", color="#000")
            "##,
        );
        assert_eq!(diags.error_count(), 1);
        assert!(!diags.errors()[0].related.is_empty());
    }

    #[test]
    fn unreachable_scene_is_a_warning_not_an_error() {
        let diags = validate("scene a { goto a }\nscene b { \"unused\" }");
        assert!(!diags.has_errors());
        assert!(diags.has_warnings());
    }

    #[test]
    fn unused_character_warns_when_report_unused_enabled() {
        let (program, _) = Parser::parse(r##"character Hero(name="A", color="#fff")"##);
        let diags = Validator::validate(&program, ValidatorConfig::default());
        assert!(diags
            .warnings()
            .iter()
            .any(|d| d.code == ErrorCode::UnusedCharacter));
    }

    #[test]
    fn empty_choice_block_is_an_error() {
        let diags = validate("scene s { choice { } }");
        assert!(diags.has_errors());
    }
}
