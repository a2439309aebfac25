//! Single bottom-up pass turning a validated [`Program`] into a
//! [`CompiledScript`]: an ordered instruction stream, a deduplicated
//! string table, and scene/character tables.
//!
//! Forward references (scene names used by `goto` before the scene is
//! emitted) are recorded and patched after every scene has been laid
//! down; an unresolved name at that point is a compile error.

use std::collections::HashMap;

use nms_core::bytecode::{CompiledCharacter, CompiledScript, Instruction, Opcode};
use nms_core::diagnostics::{Diagnostic, DiagnosticCollection, ErrorCode};
use nms_core::span::Span;

use crate::ast::{
    BinaryOp, ChoiceStmt, Expression, HideStmt, IfStmt, Literal, MediaType, PlayStmt, Position,
    Program, SayStmt, SetStmt, ShowStmt, ShowTarget, Statement, StopStmt, TransitionStmt, UnaryOp,
};

struct PendingJump {
    /// Index of the instruction whose operand needs the resolved target.
    instruction_index: usize,
    scene_name: String,
    span: Span,
}

pub struct Compiler {
    instructions: Vec<Instruction>,
    string_table: Vec<String>,
    string_index: HashMap<String, u32>,
    scene_entry_points: Vec<(String, u32)>,
    pending_jumps: Vec<PendingJump>,
    diagnostics: DiagnosticCollection,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            instructions: Vec::new(),
            string_table: Vec::new(),
            string_index: HashMap::new(),
            scene_entry_points: Vec::new(),
            pending_jumps: Vec::new(),
            diagnostics: DiagnosticCollection::new(),
        }
    }

    pub fn compile(program: &Program) -> (CompiledScript, DiagnosticCollection) {
        let mut compiler = Compiler::new();
        compiler.compile_program(program);
        let diagnostics = std::mem::take(&mut compiler.diagnostics);
        let script = compiler.finish(program);
        (script, diagnostics)
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        let index = self.string_table.len() as u32;
        self.string_table.push(s.to_string());
        self.string_index.insert(s.to_string(), index);
        index
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Emits a placeholder jump and returns its instruction index so
    /// [`patch_jump`] can later rewrite the operand.
    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit(Instruction::new(opcode, u32::MAX))
    }

    fn patch_jump(&mut self, index: usize) {
        self.instructions[index].operand = self.here();
    }

    fn compile_program(&mut self, program: &Program) {
        for scene in &program.scenes {
            self.scene_entry_points.push((scene.name.clone(), self.here()));
            for stmt in &scene.body {
                self.compile_statement(stmt, Some(&scene.name));
            }
        }

        for stmt in &program.global_statements {
            self.compile_statement(stmt, None);
        }
        self.emit(Instruction::bare(Opcode::Halt));

        self.resolve_pending_jumps();
    }

    fn resolve_pending_jumps(&mut self) {
        for pending in std::mem::take(&mut self.pending_jumps) {
            match self
                .scene_entry_points
                .iter()
                .find(|(name, _)| *name == pending.scene_name)
            {
                Some((_, ip)) => self.instructions[pending.instruction_index].operand = *ip,
                None => self.diagnostics.add(Diagnostic::error(
                    ErrorCode::CompilationFailed,
                    format!("goto target scene '{}' was never defined", pending.scene_name),
                    pending.span,
                )),
            }
        }
    }

    fn finish(self, program: &Program) -> CompiledScript {
        let characters = program
            .characters
            .iter()
            .map(|decl| {
                (
                    decl.id.clone(),
                    CompiledCharacter {
                        id: decl.id.clone(),
                        display_name: decl.display_name.clone(),
                        color: decl.color.clone(),
                    },
                )
            })
            .collect();

        CompiledScript {
            instructions: self.instructions,
            string_table: self.string_table,
            scene_entry_points: self.scene_entry_points,
            characters,
            variable_types: None,
        }
    }

    // --- statements ---

    fn compile_statement(&mut self, stmt: &Statement, in_scene: Option<&str>) {
        match stmt {
            Statement::CharacterDecl(_) | Statement::SceneDecl(_) => {}
            Statement::Show(show) => self.compile_show(show),
            Statement::Hide(hide) => self.compile_hide(hide),
            Statement::Say(say) => self.compile_say(say),
            Statement::Choice(choice) => self.compile_choice(choice, in_scene),
            Statement::If(if_stmt) => self.compile_if(if_stmt, in_scene),
            Statement::Goto(goto) => {
                let index = self.emit(Instruction::new(Opcode::GotoScene, u32::MAX));
                self.pending_jumps.push(PendingJump {
                    instruction_index: index,
                    scene_name: goto.target.clone(),
                    span: goto.span,
                });
            }
            Statement::Wait(wait) => {
                self.emit(Instruction::with_f32_operand(Opcode::Wait, wait.duration));
            }
            Statement::Play(play) => self.compile_play(play),
            Statement::Stop(stop) => self.compile_stop(stop),
            Statement::Set(set) => self.compile_set(set),
            Statement::Transition(transition) => self.compile_transition(transition),
            Statement::ExpressionStmt { expr, .. } => {
                self.compile_expression(expr);
                self.emit(Instruction::bare(Opcode::Pop));
            }
            Statement::Block { statements, .. } => {
                for s in statements {
                    self.compile_statement(s, in_scene);
                }
            }
        }
    }

    fn compile_show(&mut self, show: &ShowStmt) {
        match show.target {
            ShowTarget::Background => {
                let idx = self.intern(show.resource.as_deref().unwrap_or_default());
                self.emit(Instruction::new(Opcode::ShowBackground, idx));
            }
            ShowTarget::Character | ShowTarget::Sprite => {
                let id_idx = self.intern(&show.identifier);
                self.emit(Instruction::new(Opcode::PushString, id_idx));
                let position_code = position_code(show.position.unwrap_or(Position::Center));
                self.emit(Instruction::new(Opcode::PushInt, position_code));
                self.emit(Instruction::bare(Opcode::ShowCharacter));
            }
        }

        if let Some(transition) = &show.transition {
            let duration = show.duration.unwrap_or(0.0);
            self.emit(Instruction::with_f32_operand(Opcode::PushFloat, duration));
            let type_idx = self.intern(transition);
            self.emit(Instruction::new(Opcode::Transition, type_idx));
        }
    }

    fn compile_hide(&mut self, hide: &HideStmt) {
        let idx = self.intern(&hide.identifier);
        self.emit(Instruction::new(Opcode::PushString, idx));
        self.emit(Instruction::bare(Opcode::HideCharacter));

        if let Some(transition) = &hide.transition {
            let duration = hide.duration.unwrap_or(0.0);
            self.emit(Instruction::with_f32_operand(Opcode::PushFloat, duration));
            let type_idx = self.intern(transition);
            self.emit(Instruction::new(Opcode::Transition, type_idx));
        }
    }

    fn compile_say(&mut self, say: &SayStmt) {
        match &say.speaker {
            Some(speaker) => {
                let idx = self.intern(speaker);
                self.emit(Instruction::new(Opcode::PushString, idx));
            }
            None => {
                self.emit(Instruction::bare(Opcode::PushNull));
            }
        }
        let text_idx = self.intern(&say.text);
        self.emit(Instruction::new(Opcode::Say, text_idx));
    }

    /// Choice option dispatch: push the selection index (left on the
    /// stack by `signal_choice`), compare against each option number in
    /// turn, and fall through to the matching body.
    fn compile_choice(&mut self, choice: &ChoiceStmt, in_scene: Option<&str>) {
        let count = choice.options.len() as u32;
        self.emit(Instruction::new(Opcode::PushInt, count));
        for option in &choice.options {
            let idx = self.intern(&option.text);
            self.emit(Instruction::new(Opcode::PushString, idx));
        }
        self.emit(Instruction::new(Opcode::Choice, count));

        let mut end_jumps = Vec::new();
        for (i, option) in choice.options.iter().enumerate() {
            self.emit(Instruction::bare(Opcode::Dup));
            self.emit(Instruction::new(Opcode::PushInt, i as u32));
            self.emit(Instruction::bare(Opcode::Eq));
            let skip = self.emit_jump(Opcode::JumpIfNot);

            self.emit(Instruction::bare(Opcode::Pop));

            if let Some(condition) = &option.condition {
                self.compile_expression(condition);
                let condition_skip = self.emit_jump(Opcode::JumpIfNot);
                self.compile_option_body(option, in_scene);
                self.patch_jump(condition_skip);
            } else {
                self.compile_option_body(option, in_scene);
            }

            end_jumps.push(self.emit_jump(Opcode::Jump));
            self.patch_jump(skip);
        }

        for jump in end_jumps {
            self.patch_jump(jump);
        }
        self.emit(Instruction::bare(Opcode::Pop));
    }

    fn compile_option_body(&mut self, option: &crate::ast::ChoiceOption, in_scene: Option<&str>) {
        for stmt in &option.body {
            self.compile_statement(stmt, in_scene);
        }
        if let Some(target) = &option.goto_target {
            let index = self.emit(Instruction::new(Opcode::GotoScene, u32::MAX));
            self.pending_jumps.push(PendingJump {
                instruction_index: index,
                scene_name: target.clone(),
                span: option.span,
            });
        }
    }

    fn compile_if(&mut self, if_stmt: &IfStmt, in_scene: Option<&str>) {
        self.compile_expression(&if_stmt.condition);
        let else_jump = self.emit_jump(Opcode::JumpIfNot);
        for stmt in &if_stmt.then_branch {
            self.compile_statement(stmt, in_scene);
        }
        let end_jump = self.emit_jump(Opcode::Jump);
        self.patch_jump(else_jump);
        for stmt in &if_stmt.else_branch {
            self.compile_statement(stmt, in_scene);
        }
        self.patch_jump(end_jump);
    }

    fn compile_play(&mut self, play: &PlayStmt) {
        let idx = self.intern(&play.resource);
        let opcode = match play.media {
            MediaType::Sound => Opcode::PlaySound,
            MediaType::Music => Opcode::PlayMusic,
        };
        self.emit(Instruction::new(opcode, idx));
    }

    /// The bytecode model has no dedicated stop-sound opcode; `stop sound`
    /// and `stop music` both compile to `STOP_MUSIC`.
    fn compile_stop(&mut self, stop: &StopStmt) {
        let _ = stop.media;
        if let Some(fade) = stop.fade_out {
            self.emit(Instruction::with_f32_operand(Opcode::PushFloat, fade));
        }
        self.emit(Instruction::bare(Opcode::StopMusic));
    }

    fn compile_set(&mut self, set: &SetStmt) {
        self.compile_expression(&set.value);
        let idx = self.intern(&set.variable);
        let opcode = if set.is_flag { Opcode::SetFlag } else { Opcode::StoreGlobal };
        self.emit(Instruction::new(opcode, idx));
    }

    fn compile_transition(&mut self, transition: &TransitionStmt) {
        self.emit(Instruction::with_f32_operand(Opcode::PushFloat, transition.duration));
        let idx = self.intern(&transition.kind);
        self.emit(Instruction::new(Opcode::Transition, idx));
    }

    // --- expressions ---

    fn compile_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal { value, .. } => self.compile_literal(value),
            Expression::Identifier { name, .. } => {
                let idx = self.intern(name);
                self.emit(Instruction::new(Opcode::LoadGlobal, idx));
            }
            Expression::Binary { left, op, right, .. } => self.compile_binary(left, *op, right),
            Expression::Unary { op, operand, .. } => {
                self.compile_expression(operand);
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                };
                self.emit(Instruction::bare(opcode));
            }
            Expression::Call { callee, args, .. } => {
                for arg in args {
                    self.compile_expression(arg);
                }
                let idx = self.intern(callee);
                self.emit(Instruction::new(Opcode::Call, idx));
            }
            Expression::Property { object, name, .. } => {
                self.compile_expression(object);
                let idx = self.intern(name);
                self.emit(Instruction::new(Opcode::PushString, idx));
            }
        }
    }

    fn compile_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Null => {
                self.emit(Instruction::bare(Opcode::PushNull));
            }
            Literal::Int(v) => {
                self.emit(Instruction::new(Opcode::PushInt, *v as u32));
            }
            Literal::Float(v) => {
                self.emit(Instruction::with_f32_operand(Opcode::PushFloat, *v as f32));
            }
            Literal::Bool(v) => {
                self.emit(Instruction::new(Opcode::PushBool, *v as u32));
            }
            Literal::String(s) => {
                let idx = self.intern(s);
                self.emit(Instruction::new(Opcode::PushString, idx));
            }
        }
    }

    /// `and`/`or` short-circuit: the right operand is only evaluated when
    /// the left didn't already decide the result.
    fn compile_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression) {
        match op {
            BinaryOp::And => {
                self.compile_expression(left);
                let short_circuit = self.emit_jump(Opcode::JumpIfNot);
                self.emit(Instruction::bare(Opcode::Pop));
                self.compile_expression(right);
                self.patch_jump(short_circuit);
                return;
            }
            BinaryOp::Or => {
                self.compile_expression(left);
                let evaluate_right = self.emit_jump(Opcode::JumpIfNot);
                let short_circuit = self.emit_jump(Opcode::Jump);
                self.patch_jump(evaluate_right);
                self.emit(Instruction::bare(Opcode::Pop));
                self.compile_expression(right);
                self.patch_jump(short_circuit);
                return;
            }
            _ => {}
        }

        self.compile_expression(left);
        self.compile_expression(right);
        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        self.emit(Instruction::bare(opcode));
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn position_code(position: Position) -> u32 {
    match position {
        Position::Left => 0,
        Position::Center => 1,
        Position::Right => 2,
        Position::Custom => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile(source: &str) -> (CompiledScript, DiagnosticCollection) {
        let (program, parse_diags) = Parser::parse(source);
        assert!(!parse_diags.has_errors());
        Compiler::compile(&program)
    }

    #[test]
    fn hello_world_emits_one_say_instruction() {
        let (script, diags) = compile(
            r##"
            character Hero(name="Alex", color="#FFCC00")
            scene intro { Hero "Hi." }
            "##,
        );
        assert!(!diags.has_errors());
        assert_eq!(script.characters.len(), 1);
        assert_eq!(script.scene_entry_points.len(), 1);
        let say_count = script
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Say)
            .count();
        assert_eq!(say_count, 1);
    }

    #[test]
    fn goto_resolves_to_scene_entry_point() {
        let (script, diags) = compile(
            r#"
            scene start { goto target }
            scene target { "here" }
            "#,
        );
        assert!(!diags.has_errors());
        let target_entry = script.scene_entry("target").unwrap();
        let goto = script
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::GotoScene)
            .unwrap();
        assert_eq!(goto.operand, target_entry);
    }

    #[test]
    fn unresolved_goto_target_is_a_compile_error() {
        let (_, diags) = compile("scene s { goto nowhere }");
        // the validator would normally catch this first; the compiler's own
        // pending-jump resolution is the last line of defense.
        assert!(diags.has_errors());
        assert!(diags.errors().iter().any(|d| d.message.contains("nowhere")));
    }

    #[test]
    fn choice_emits_jump_table_for_each_option() {
        let (script, diags) = compile(
            r#"
            scene start {
                choice {
                    "L" -> goto left
                    "R" -> goto right
                }
            }
            scene left  { "went left" }
            scene right { "went right" }
            "#,
        );
        assert!(!diags.has_errors());
        let choice_count = script
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Choice)
            .count();
        assert_eq!(choice_count, 1);
    }

    #[test]
    fn string_table_deduplicates() {
        let (script, _) = compile(
            r#"
            scene s { say "same" say "same" }
            "#,
        );
        let occurrences = script.string_table.iter().filter(|s| s.as_str() == "same").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn halt_is_appended_after_global_statements() {
        let (script, _) = compile("set x = 1");
        assert_eq!(script.instructions.last().unwrap().opcode, Opcode::Halt);
    }
}
