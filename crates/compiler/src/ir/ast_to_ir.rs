//! AST → IR graph conversion. Walks a [`Program`] and emits one [`IRNode`]
//! per statement, chained by `"next"` connections in source order, with
//! structural children (choice options, if branches) linked by labeled
//! connections instead of being inlined as properties.

use crate::ast::{
    BinaryOp, CharacterDecl, Expression, Literal, MediaType, Position, Program, SceneDecl,
    ShowTarget, Statement, UnaryOp,
};
use crate::ir::graph::{IRGraph, IRNode, IRNodeType, NodeId, PortId, PropertyValue};

/// Monotonically assigns node ids while a program is being lowered.
struct IdGen {
    next: NodeId,
}

impl IdGen {
    fn new() -> Self {
        IdGen { next: 1 }
    }

    fn next_id(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }
}

pub fn ast_to_ir(program: &Program) -> IRGraph {
    let mut graph = IRGraph::new();
    let mut ids = IdGen::new();

    for character in &program.characters {
        lower_character(&mut graph, &mut ids, character);
    }

    for scene in &program.scenes {
        lower_scene(&mut graph, &mut ids, scene);
    }

    if !program.global_statements.is_empty() {
        lower_chain(&mut graph, &mut ids, &program.global_statements, None);
    }

    graph
}

fn lower_character(graph: &mut IRGraph, ids: &mut IdGen, decl: &CharacterDecl) {
    let id = ids.next_id();
    let mut node = IRNode::new(id, IRNodeType::Custom)
        .with_property("node_kind", PropertyValue::String("character".into()))
        .with_property("id", PropertyValue::String(decl.id.clone()))
        .with_property("display_name", PropertyValue::String(decl.display_name.clone()))
        .with_property("color", PropertyValue::String(decl.color.clone()));
    if let Some(sprite) = &decl.default_sprite {
        node = node.with_property("default_sprite", PropertyValue::String(sprite.clone()));
    }
    graph.character_declarations.push((
        decl.id.clone(),
        decl.display_name.clone(),
        decl.color.clone(),
    ));
    graph.add_node(node);
}

fn lower_scene(graph: &mut IRGraph, ids: &mut IdGen, scene: &SceneDecl) {
    let start_id = ids.next_id();
    graph.add_node(
        IRNode::new(start_id, IRNodeType::SceneStart)
            .with_property("name", PropertyValue::String(scene.name.clone())),
    );
    graph.scene_entry_nodes.push((scene.name.clone(), start_id));

    let last = lower_chain(graph, ids, &scene.body, Some(start_id));

    let end_id = ids.next_id();
    graph.add_node(IRNode::new(end_id, IRNodeType::SceneEnd));
    if let Some(last_id) = last {
        graph.connect(
            PortId::output(last_id, "next"),
            PortId::input(end_id, "in"),
            None,
        );
    } else {
        graph.connect(
            PortId::output(start_id, "next"),
            PortId::input(end_id, "in"),
            None,
        );
    }
}

/// Lowers a statement list into a `"next"`-chained run of nodes, wiring
/// the first node to `predecessor` (if any). Returns the id of the last
/// node in the chain so the caller can wire what follows.
fn lower_chain(
    graph: &mut IRGraph,
    ids: &mut IdGen,
    statements: &[Statement],
    predecessor: Option<NodeId>,
) -> Option<NodeId> {
    let mut prev = predecessor;
    for stmt in statements {
        let id = lower_statement(graph, ids, stmt);
        if let Some(prev_id) = prev {
            graph.connect(PortId::output(prev_id, "next"), PortId::input(id, "in"), None);
        }
        prev = Some(id);
    }
    if prev == predecessor {
        None
    } else {
        prev
    }
}

fn lower_statement(graph: &mut IRGraph, ids: &mut IdGen, stmt: &Statement) -> NodeId {
    match stmt {
        Statement::Show(show) => {
            let node_type = match show.target {
                ShowTarget::Background => IRNodeType::ShowBackground,
                ShowTarget::Character | ShowTarget::Sprite => IRNodeType::ShowCharacter,
            };
            let id = ids.next_id();
            let mut node = IRNode::new(id, node_type)
                .with_property("identifier", PropertyValue::String(show.identifier.clone()));
            if let Some(res) = &show.resource {
                node = node.with_property("resource", PropertyValue::String(res.clone()));
            }
            if let Some(position) = show.position {
                node = node.with_property("position", PropertyValue::String(position_name(position).into()));
            }
            if let Some(transition) = &show.transition {
                node = node.with_property("transition", PropertyValue::String(transition.clone()));
            }
            if let Some(duration) = show.duration {
                node = node.with_property("duration", PropertyValue::Float(duration as f64));
            }
            graph.add_node(node);
            id
        }
        Statement::Hide(hide) => {
            let id = ids.next_id();
            let mut node = IRNode::new(id, IRNodeType::HideCharacter)
                .with_property("identifier", PropertyValue::String(hide.identifier.clone()));
            if let Some(duration) = hide.duration {
                node = node.with_property("duration", PropertyValue::Float(duration as f64));
            }
            graph.add_node(node);
            id
        }
        Statement::Say(say) => {
            let id = ids.next_id();
            let mut node = IRNode::new(id, IRNodeType::Dialogue)
                .with_property("text", PropertyValue::String(say.text.clone()));
            if let Some(speaker) = &say.speaker {
                node = node.with_property("speaker", PropertyValue::String(speaker.clone()));
            }
            graph.add_node(node);
            id
        }
        Statement::Choice(choice) => {
            let id = ids.next_id();
            graph.add_node(IRNode::new(id, IRNodeType::Choice));
            for (i, option) in choice.options.iter().enumerate() {
                let option_id = ids.next_id();
                let mut option_node = IRNode::new(option_id, IRNodeType::ChoiceOption)
                    .with_property("text", PropertyValue::String(option.text.clone()));
                if let Some(target) = &option.goto_target {
                    option_node = option_node.with_property("goto_target", PropertyValue::String(target.clone()));
                }
                graph.add_node(option_node);
                graph.connect(
                    PortId::output(id, "option"),
                    PortId::input(option_id, "in"),
                    Some(format!("option:{i}")),
                );
                if !option.body.is_empty() {
                    lower_chain(graph, ids, &option.body, Some(option_id));
                }
            }
            id
        }
        Statement::If(stmt) => {
            let id = ids.next_id();
            graph.add_node(
                IRNode::new(id, IRNodeType::Branch)
                    .with_property("condition", expression_to_property(&stmt.condition)),
            );
            if let Some(then_head) = lower_chain(graph, ids, &stmt.then_branch, None) {
                graph.connect(
                    PortId::output(id, "then"),
                    PortId::input(then_head, "in"),
                    Some("then".into()),
                );
            }
            if !stmt.else_branch.is_empty() {
                if let Some(else_head) = lower_chain(graph, ids, &stmt.else_branch, None) {
                    graph.connect(
                        PortId::output(id, "else"),
                        PortId::input(else_head, "in"),
                        Some("else".into()),
                    );
                }
            }
            id
        }
        Statement::Goto(goto) => {
            let id = ids.next_id();
            graph.add_node(
                IRNode::new(id, IRNodeType::Goto)
                    .with_property("target", PropertyValue::String(goto.target.clone())),
            );
            id
        }
        Statement::Wait(wait) => {
            let id = ids.next_id();
            graph.add_node(
                IRNode::new(id, IRNodeType::Wait)
                    .with_property("duration", PropertyValue::Float(wait.duration as f64)),
            );
            id
        }
        Statement::Play(play) => {
            let node_type = match play.media {
                MediaType::Sound => IRNodeType::PlaySound,
                MediaType::Music => IRNodeType::PlayMusic,
            };
            let id = ids.next_id();
            let mut node = IRNode::new(id, node_type)
                .with_property("resource", PropertyValue::String(play.resource.clone()));
            if let Some(volume) = play.volume {
                node = node.with_property("volume", PropertyValue::Float(volume as f64));
            }
            if let Some(looped) = play.looped {
                node = node.with_property("looped", PropertyValue::Bool(looped));
            }
            graph.add_node(node);
            id
        }
        Statement::Stop(stop) => {
            let id = ids.next_id();
            let mut node = IRNode::new(id, IRNodeType::StopMusic)
                .with_property("media", PropertyValue::String(media_name(stop.media).into()));
            if let Some(fade) = stop.fade_out {
                node = node.with_property("fade_out", PropertyValue::Float(fade as f64));
            }
            graph.add_node(node);
            id
        }
        Statement::Set(set) => {
            let id = ids.next_id();
            let node = IRNode::new(id, IRNodeType::SetVariable)
                .with_property("variable", PropertyValue::String(set.variable.clone()))
                .with_property("is_flag", PropertyValue::Bool(set.is_flag))
                .with_property("value", expression_to_property(&set.value));
            graph.add_node(node);
            id
        }
        Statement::Transition(transition) => {
            let id = ids.next_id();
            let mut node = IRNode::new(id, IRNodeType::Transition)
                .with_property("kind", PropertyValue::String(transition.kind.clone()))
                .with_property("duration", PropertyValue::Float(transition.duration as f64));
            if let Some(color) = &transition.color {
                node = node.with_property("color", PropertyValue::String(color.clone()));
            }
            graph.add_node(node);
            id
        }
        Statement::ExpressionStmt { expr, .. } => {
            let id = ids.next_id();
            graph.add_node(
                IRNode::new(id, IRNodeType::Expression)
                    .with_property("expr", expression_to_property(expr)),
            );
            id
        }
        Statement::Block { statements, .. } => {
            let id = ids.next_id();
            graph.add_node(IRNode::new(id, IRNodeType::Sequence));
            if let Some(head) = lower_chain(graph, ids, statements, None) {
                graph.connect(PortId::output(id, "body"), PortId::input(head, "in"), Some("body".into()));
            }
            id
        }
        Statement::CharacterDecl(_) | Statement::SceneDecl(_) => {
            unreachable!("character and scene declarations are lowered by their own callers")
        }
    }
}

/// Expressions fold to a single source-text property rather than a
/// sub-graph: the visual editor round-trips them through the text
/// pretty-printer, not node-by-node.
fn expression_to_property(expr: &Expression) -> PropertyValue {
    PropertyValue::String(expression_to_text(expr))
}

pub(crate) fn expression_to_text(expr: &Expression) -> String {
    match expr {
        Expression::Literal { value, .. } => literal_to_text(value),
        Expression::Identifier { name, .. } => name.clone(),
        Expression::Binary { left, op, right, .. } => {
            format!("{} {} {}", expression_to_text(left), binary_op_symbol(*op), expression_to_text(right))
        }
        Expression::Unary { op, operand, .. } => {
            format!("{}{}", unary_op_symbol(*op), expression_to_text(operand))
        }
        Expression::Call { callee, args, .. } => {
            let args_text: Vec<String> = args.iter().map(expression_to_text).collect();
            format!("{}({})", callee, args_text.join(", "))
        }
        Expression::Property { object, name, .. } => {
            format!("{}.{}", expression_to_text(object), name)
        }
    }
}

fn literal_to_text(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) => v.to_string(),
        Literal::Bool(v) => v.to_string(),
        Literal::String(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

fn binary_op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn unary_op_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Not => "not ",
    }
}

fn position_name(position: Position) -> &'static str {
    match position {
        Position::Left => "left",
        Position::Center => "center",
        Position::Right => "right",
        Position::Custom => "custom",
    }
}

fn media_name(media: MediaType) -> &'static str {
    match media {
        MediaType::Sound => "sound",
        MediaType::Music => "music",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn scene_with_dialogue_lowers_to_start_dialogue_end_chain() {
        let (program, diags) = Parser::parse(
            r##"
            character Hero(name="Alex", color="#fff")
            scene intro {
                Hero "Hello there."
            }
            "##,
        );
        assert!(!diags.has_errors());
        let graph = ast_to_ir(&program);
        assert_eq!(graph.scene_entry_nodes.len(), 1);
        let (_, start_id) = graph.scene_entry_nodes[0];
        let dialogue = graph.outgoing(start_id).next().unwrap();
        let dialogue_node = graph.node(dialogue.target.node_id).unwrap();
        assert_eq!(dialogue_node.node_type, IRNodeType::Dialogue);
        assert_eq!(dialogue_node.string_property("text"), Some("Hello there."));
    }

    #[test]
    fn choice_options_link_via_labeled_connections() {
        let (program, diags) = Parser::parse(
            r#"
            scene start {
                choice {
                    "Go left" -> goto left
                    "Go right" -> goto right
                }
            }
            scene left {}
            scene right {}
            "#,
        );
        assert!(!diags.has_errors());
        let graph = ast_to_ir(&program);
        let choice_node = graph
            .nodes
            .values()
            .find(|n| n.node_type == IRNodeType::Choice)
            .unwrap();
        let options: Vec<_> = graph.outgoing(choice_node.id).collect();
        assert_eq!(options.len(), 2);
    }
}
