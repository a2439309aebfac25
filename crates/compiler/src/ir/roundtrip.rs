//! Validates the two round trips the IR layer promises: text <-> AST <->
//! IR must be lossless for everything the grammar can express, and a
//! graph edited purely through the visual layer must reproduce an
//! equivalent IR graph once normalized.

use crate::ir::ast_to_ir::ast_to_ir;
use crate::ir::ir_to_ast::ir_to_ast;
use crate::ir::normalize::IDNormalizer;
use crate::ir::text_gen::ast_to_text;
use crate::ir::visual::{ir_to_visual, visual_to_ir};
use crate::parser::Parser;

#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripReport {
    pub ok: bool,
    pub detail: Option<String>,
}

impl RoundTripReport {
    fn ok() -> Self {
        RoundTripReport { ok: true, detail: None }
    }

    fn fail(detail: impl Into<String>) -> Self {
        RoundTripReport {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

pub struct RoundTripValidator;

impl RoundTripValidator {
    /// Parses `source`, lowers to IR and back to AST, and checks that
    /// printing the rebuilt AST reparses to a structurally identical
    /// scene/character layout. Exact source text is not expected to
    /// survive (formatting, comments); scene and statement counts are.
    pub fn check_text_round_trip(source: &str) -> RoundTripReport {
        let (program, diags) = Parser::parse(source);
        if diags.has_errors() {
            return RoundTripReport::fail("source does not parse cleanly");
        }

        let graph = ast_to_ir(&program);
        let rebuilt = ir_to_ast(&graph);

        if rebuilt.scenes.len() != program.scenes.len() {
            return RoundTripReport::fail(format!(
                "scene count changed: {} -> {}",
                program.scenes.len(),
                rebuilt.scenes.len()
            ));
        }
        for (original, reconstructed) in program.scenes.iter().zip(rebuilt.scenes.iter()) {
            if original.name != reconstructed.name {
                return RoundTripReport::fail(format!("scene name changed: {} -> {}", original.name, reconstructed.name));
            }
            if original.body.len() != reconstructed.body.len() {
                return RoundTripReport::fail(format!(
                    "scene '{}' statement count changed: {} -> {}",
                    original.name,
                    original.body.len(),
                    reconstructed.body.len()
                ));
            }
        }

        let text = ast_to_text(&rebuilt);
        let (reparsed, reparse_diags) = Parser::parse(&text);
        if reparse_diags.has_errors() {
            return RoundTripReport::fail("printed text failed to reparse");
        }
        if reparsed.scenes.len() != rebuilt.scenes.len() {
            return RoundTripReport::fail("printed text lost scenes on reparse");
        }

        RoundTripReport::ok()
    }

    /// Checks that `ir -> visual -> ir`, once both sides are normalized,
    /// reproduces the original graph.
    pub fn check_graph_round_trip(source: &str) -> RoundTripReport {
        let (program, diags) = Parser::parse(source);
        if diags.has_errors() {
            return RoundTripReport::fail("source does not parse cleanly");
        }

        let graph = ast_to_ir(&program);
        let visual = ir_to_visual(&graph);
        let restored = match visual_to_ir(&visual) {
            Ok(g) => g,
            Err(e) => return RoundTripReport::fail(e),
        };

        let (norm_a, _) = IDNormalizer::normalize(&graph);
        let (norm_b, _) = IDNormalizer::normalize(&restored);
        if norm_a != norm_b {
            return RoundTripReport::fail("normalized graphs differ after visual round trip");
        }

        RoundTripReport::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_round_trips_cleanly() {
        let source = r##"
        character Hero(name="Alex", color="#FFCC00")
        scene intro {
            Hero "Hi there."
            wait 1
        }
        "##;
        assert!(RoundTripValidator::check_text_round_trip(source).ok);
        assert!(RoundTripValidator::check_graph_round_trip(source).ok);
    }

    #[test]
    fn branching_scene_round_trips_through_ir() {
        let source = r#"
        scene start {
            if flag_a == true {
                goto ending
            } else {
                wait 2
            }
        }
        scene ending {}
        "#;
        let report = RoundTripValidator::check_text_round_trip(source);
        assert!(report.ok, "{:?}", report.detail);
    }
}
