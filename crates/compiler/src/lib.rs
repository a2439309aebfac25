//! Lexer, parser, semantic validator, bytecode compiler, and IR graph
//! converters for the NMS visual-novel scripting language.

pub mod ast;
pub mod compiler;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use compiler::Compiler;
pub use parser::Parser;
pub use validator::{Validator, ValidatorConfig};

use nms_core::bytecode::CompiledScript;
use nms_core::diagnostics::DiagnosticCollection;

/// Runs the full front end — lex, parse, validate, compile — in one call.
/// Any phase's `Error`-severity diagnostics stop the pipeline before the
/// next phase runs; the returned script is `None` in that case.
pub fn compile_source(source: &str, config: ValidatorConfig) -> (Option<CompiledScript>, DiagnosticCollection) {
    let (program, mut diagnostics) = Parser::parse(source);
    if diagnostics.has_errors() {
        return (None, diagnostics);
    }

    let validation = Validator::validate(&program, config);
    diagnostics.extend(validation);
    if diagnostics.has_errors() {
        return (None, diagnostics);
    }

    let (script, compile_diags) = Compiler::compile(&program);
    diagnostics.extend(compile_diags);
    if diagnostics.has_errors() {
        return (None, diagnostics);
    }

    (Some(script), diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_end_to_end() {
        let (script, diags) = compile_source(
            r##"
            character Hero(name="Alex", color="#FFCC00")
            scene intro { Hero "Hi." }
            "##,
            ValidatorConfig::default(),
        );
        assert!(!diags.has_errors());
        assert!(script.is_some());
    }

    #[test]
    fn duplicate_character_blocks_compilation() {
        let (script, diags) = compile_source(
            r##"
            character Hero(name="A", color="#fff")
            character Hero(name="B", color="#000")
            "##,
            ValidatorConfig::default(),
        );
        assert!(diags.has_errors());
        assert!(script.is_none());
    }
}
