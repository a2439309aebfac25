//! IR graph → AST conversion, the inverse of [`crate::ir::ast_to_ir`].
//! Every node loses its original [`nms_core::span::Span`] (graphs built
//! by the visual editor never had one); reconstructed statements get a
//! zero-width span at line 0 instead.

use nms_core::span::Span;
use nms_core::SourceLocation;

use crate::ast::{
    CharacterDecl, ChoiceOption, ChoiceStmt, GotoStmt, HideStmt, IfStmt, MediaType, PlayStmt,
    Position, Program, SayStmt, SceneDecl, SetStmt, ShowStmt, ShowTarget, Statement, StopStmt,
    TransitionStmt, WaitStmt,
};
use crate::ir::graph::{IRGraph, IRNode, IRNodeType, NodeId};
use crate::parser::Parser;

fn synthetic_span() -> Span {
    Span::point(SourceLocation::new(0, 0))
}

pub fn ir_to_ast(graph: &IRGraph) -> Program {
    let mut program = Program::new();

    for node in graph.nodes.values() {
        if node.node_type == IRNodeType::Custom && node.string_property("node_kind") == Some("character") {
            program.characters.push(CharacterDecl {
                id: node.string_property("id").unwrap_or_default().to_string(),
                display_name: node.string_property("display_name").unwrap_or_default().to_string(),
                color: node.string_property("color").unwrap_or_default().to_string(),
                default_sprite: node.string_property("default_sprite").map(str::to_string),
                span: synthetic_span(),
            });
        }
    }

    for (name, start_id) in &graph.scene_entry_nodes {
        let body = build_chain(graph, next_of(graph, *start_id, "next"));
        program.scenes.push(SceneDecl {
            name: name.clone(),
            body,
            span: synthetic_span(),
        });
    }

    program
}

fn next_of(graph: &IRGraph, id: NodeId, port: &str) -> Option<NodeId> {
    graph
        .connections
        .iter()
        .find(|c| c.source.node_id == id && c.source.port_name == port && c.label.is_none())
        .map(|c| c.target.node_id)
}

fn labeled_target(graph: &IRGraph, id: NodeId, label: &str) -> Option<NodeId> {
    graph
        .connections
        .iter()
        .find(|c| c.source.node_id == id && c.label.as_deref() == Some(label))
        .map(|c| c.target.node_id)
}

/// Walks a `"next"`-chained run starting at `first`, stopping at a
/// [`IRNodeType::SceneEnd`] node or a dead end.
fn build_chain(graph: &IRGraph, first: Option<NodeId>) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut current = first;
    while let Some(id) = current {
        let Some(node) = graph.node(id) else { break };
        if node.node_type == IRNodeType::SceneEnd {
            break;
        }
        out.push(node_to_statement(graph, node));
        current = next_of(graph, id, "next");
    }
    out
}

fn node_to_statement(graph: &IRGraph, node: &IRNode) -> Statement {
    let span = synthetic_span();
    match node.node_type {
        IRNodeType::ShowCharacter | IRNodeType::ShowBackground => Statement::Show(ShowStmt {
            target: if node.node_type == IRNodeType::ShowBackground {
                ShowTarget::Background
            } else {
                ShowTarget::Character
            },
            identifier: node.string_property("identifier").unwrap_or_default().to_string(),
            resource: node.string_property("resource").map(str::to_string),
            position: node.string_property("position").and_then(parse_position),
            custom_x: None,
            custom_y: None,
            transition: node.string_property("transition").map(str::to_string),
            duration: node.properties.get("duration").and_then(|v| v.as_float()).map(|v| v as f32),
            span,
        }),
        IRNodeType::HideCharacter => Statement::Hide(HideStmt {
            identifier: node.string_property("identifier").unwrap_or_default().to_string(),
            transition: None,
            duration: node.properties.get("duration").and_then(|v| v.as_float()).map(|v| v as f32),
            span,
        }),
        IRNodeType::Dialogue => Statement::Say(SayStmt {
            speaker: node.string_property("speaker").map(str::to_string),
            text: node.string_property("text").unwrap_or_default().to_string(),
            span,
        }),
        IRNodeType::Choice => {
            let mut labeled: Vec<(usize, NodeId)> = graph
                .connections
                .iter()
                .filter(|c| c.source.node_id == node.id && c.source.port_name == "option")
                .filter_map(|c| {
                    let index = c
                        .label
                        .as_deref()
                        .and_then(|l| l.strip_prefix("option:"))
                        .and_then(|n| n.parse::<usize>().ok())?;
                    Some((index, c.target.node_id))
                })
                .collect();
            labeled.sort_by_key(|(index, _)| *index);
            let options = labeled
                .into_iter()
                .filter_map(|(_, option_id)| graph.node(option_id))
                .map(|option_node| ChoiceOption {
                    text: option_node.string_property("text").unwrap_or_default().to_string(),
                    condition: None,
                    body: build_chain(graph, next_of(graph, option_node.id, "next")),
                    goto_target: option_node.string_property("goto_target").map(str::to_string),
                    span,
                })
                .collect();
            Statement::Choice(ChoiceStmt { options, span })
        }
        IRNodeType::Branch => Statement::If(IfStmt {
            condition: parse_expression_text(node.string_property("condition").unwrap_or("true")),
            then_branch: build_chain(graph, labeled_target(graph, node.id, "then")),
            else_branch: build_chain(graph, labeled_target(graph, node.id, "else")),
            span,
        }),
        IRNodeType::Goto => Statement::Goto(GotoStmt {
            target: node.string_property("target").unwrap_or_default().to_string(),
            span,
        }),
        IRNodeType::Wait => Statement::Wait(WaitStmt {
            duration: node.properties.get("duration").and_then(|v| v.as_float()).unwrap_or(0.0) as f32,
            span,
        }),
        IRNodeType::PlaySound | IRNodeType::PlayMusic => Statement::Play(PlayStmt {
            media: if node.node_type == IRNodeType::PlaySound {
                MediaType::Sound
            } else {
                MediaType::Music
            },
            resource: node.string_property("resource").unwrap_or_default().to_string(),
            volume: node.properties.get("volume").and_then(|v| v.as_float()).map(|v| v as f32),
            looped: node.properties.get("looped").and_then(|v| v.as_bool()),
            span,
        }),
        IRNodeType::StopMusic => Statement::Stop(StopStmt {
            media: if node.string_property("media") == Some("sound") {
                MediaType::Sound
            } else {
                MediaType::Music
            },
            fade_out: node.properties.get("fade_out").and_then(|v| v.as_float()).map(|v| v as f32),
            span,
        }),
        IRNodeType::SetVariable => {
            let value_text = node.string_property("value").unwrap_or("null").to_string();
            let value = parse_expression_text(&value_text);
            Statement::Set(SetStmt {
                variable: node.string_property("variable").unwrap_or_default().to_string(),
                value,
                is_flag: node.properties.get("is_flag").and_then(|v| v.as_bool()).unwrap_or(false),
                span,
            })
        }
        IRNodeType::Transition => Statement::Transition(TransitionStmt {
            kind: node.string_property("kind").unwrap_or_default().to_string(),
            duration: node.properties.get("duration").and_then(|v| v.as_float()).unwrap_or(0.0) as f32,
            color: node.string_property("color").map(str::to_string),
            span,
        }),
        IRNodeType::Expression => {
            let text = node.string_property("expr").unwrap_or("null").to_string();
            Statement::ExpressionStmt {
                expr: parse_expression_text(&text),
                span,
            }
        }
        IRNodeType::Sequence => Statement::Block {
            statements: build_chain(graph, labeled_target(graph, node.id, "body")),
            span,
        },
        other => Statement::ExpressionStmt {
            expr: crate::ast::Expression::Identifier {
                name: format!("<unsupported:{other:?}>"),
                span,
            },
            span,
        },
    }
}

fn parse_position(text: &str) -> Option<Position> {
    match text {
        "left" => Some(Position::Left),
        "center" => Some(Position::Center),
        "right" => Some(Position::Right),
        "custom" => Some(Position::Custom),
        _ => None,
    }
}

/// Parses a single expression out of its pretty-printed text form by
/// wrapping it in a throwaway `set` statement and lexing/parsing that,
/// since the grammar has no standalone "parse an expression" entry point.
fn parse_expression_text(text: &str) -> crate::ast::Expression {
    let wrapped = format!("scene __expr_host__ {{ set __v = {text} }}");
    let (program, diags) = Parser::parse(&wrapped);
    if diags.has_errors() {
        return crate::ast::Expression::Literal {
            value: crate::ast::Literal::Null,
            span: synthetic_span(),
        };
    }
    for stmt in program.scenes.into_iter().flat_map(|s| s.body) {
        if let Statement::Set(set) = stmt {
            return set.value;
        }
    }
    crate::ast::Expression::Literal {
        value: crate::ast::Literal::Null,
        span: synthetic_span(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast_to_ir::ast_to_ir;

    #[test]
    fn scene_round_trips_through_ir_and_back() {
        let (program, diags) = Parser::parse(
            r#"
            scene intro {
                Hero "Hi there."
                wait 1.5
            }
            "#,
        );
        assert!(!diags.has_errors());
        let graph = ast_to_ir(&program);
        let rebuilt = ir_to_ast(&graph);
        let scene = rebuilt.find_scene("intro").unwrap();
        assert_eq!(scene.body.len(), 2);
        match &scene.body[0] {
            Statement::Say(say) => assert_eq!(say.text, "Hi there."),
            other => panic!("expected Say, got {other:?}"),
        }
    }

    #[test]
    fn choice_options_round_trip_with_nested_bodies() {
        let (program, diags) = Parser::parse(
            r#"
            scene start {
                choice {
                    "Go left" -> { wait 1 }
                    "Go right" -> goto right
                }
            }
            scene right {}
            "#,
        );
        assert!(!diags.has_errors());
        let graph = ast_to_ir(&program);
        let rebuilt = ir_to_ast(&graph);
        let scene = rebuilt.find_scene("start").unwrap();
        match &scene.body[0] {
            Statement::Choice(choice) => {
                assert_eq!(choice.options.len(), 2);
                assert_eq!(choice.options[0].text, "Go left");
                assert_eq!(choice.options[0].body.len(), 1);
                assert_eq!(choice.options[1].goto_target.as_deref(), Some("right"));
            }
            other => panic!("expected Choice, got {other:?}"),
        }
    }
}
