//! The visual-editor mirror of [`IRGraph`]: plain, JSON-serializable
//! nodes with flattened string properties and explicit canvas
//! coordinates, matching what a node-graph UI actually needs to render
//! and edit without depending on the compiler's internal types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ir::graph::{IRConnection, IRGraph, IRNode, IRNodeType, NodeId, NodePosition, PortId, PropertyValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: NodeId,
    pub type_name: String,
    pub properties: HashMap<String, String>,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualConnection {
    pub from_node: NodeId,
    pub from_port: String,
    pub to_node: NodeId,
    pub to_port: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VisualGraph {
    pub nodes: Vec<VisualNode>,
    pub connections: Vec<VisualConnection>,
}

pub fn ir_to_visual(graph: &IRGraph) -> VisualGraph {
    let mut nodes: Vec<VisualNode> = graph
        .nodes
        .values()
        .map(|node| VisualNode {
            id: node.id,
            type_name: type_name(node.node_type).to_string(),
            properties: node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_canonical_string()))
                .collect(),
            x: node.position.x,
            y: node.position.y,
        })
        .collect();
    nodes.sort_by_key(|n| n.id);

    let connections = graph
        .connections
        .iter()
        .map(|c| VisualConnection {
            from_node: c.source.node_id,
            from_port: c.source.port_name.clone(),
            to_node: c.target.node_id,
            to_port: c.target.port_name.clone(),
            label: c.label.clone(),
        })
        .collect();

    VisualGraph { nodes, connections }
}

pub fn visual_to_ir(visual: &VisualGraph) -> Result<IRGraph, String> {
    let mut graph = IRGraph::new();
    for vnode in &visual.nodes {
        let node_type = node_type_from_name(&vnode.type_name)
            .ok_or_else(|| format!("unknown node type '{}' on node {}", vnode.type_name, vnode.id))?;
        let mut node = IRNode::new(vnode.id, node_type);
        node.position = NodePosition { x: vnode.x, y: vnode.y };
        for (key, value) in &vnode.properties {
            node.properties.insert(key.clone(), PropertyValue::String(value.clone()));
        }
        if node_type == IRNodeType::SceneStart {
            if let Some(name) = node.string_property("name") {
                graph.scene_entry_nodes.push((name.to_string(), vnode.id));
            }
        }
        if node_type == IRNodeType::Custom && node.string_property("node_kind") == Some("character") {
            graph.character_declarations.push((
                node.string_property("id").unwrap_or_default().to_string(),
                node.string_property("display_name").unwrap_or_default().to_string(),
                node.string_property("color").unwrap_or_default().to_string(),
            ));
        }
        graph.add_node(node);
    }

    for vc in &visual.connections {
        graph.connections.push(IRConnection {
            source: PortId::output(vc.from_node, vc.from_port.clone()),
            target: PortId::input(vc.to_node, vc.to_port.clone()),
            label: vc.label.clone(),
        });
    }

    Ok(graph)
}

fn type_name(node_type: IRNodeType) -> &'static str {
    match node_type {
        IRNodeType::SceneStart => "SceneStart",
        IRNodeType::SceneEnd => "SceneEnd",
        IRNodeType::Comment => "Comment",
        IRNodeType::Sequence => "Sequence",
        IRNodeType::Branch => "Branch",
        IRNodeType::Switch => "Switch",
        IRNodeType::Loop => "Loop",
        IRNodeType::Goto => "Goto",
        IRNodeType::Label => "Label",
        IRNodeType::ShowCharacter => "ShowCharacter",
        IRNodeType::HideCharacter => "HideCharacter",
        IRNodeType::ShowBackground => "ShowBackground",
        IRNodeType::Dialogue => "Dialogue",
        IRNodeType::Choice => "Choice",
        IRNodeType::ChoiceOption => "ChoiceOption",
        IRNodeType::PlayMusic => "PlayMusic",
        IRNodeType::StopMusic => "StopMusic",
        IRNodeType::PlaySound => "PlaySound",
        IRNodeType::Transition => "Transition",
        IRNodeType::Wait => "Wait",
        IRNodeType::SetVariable => "SetVariable",
        IRNodeType::GetVariable => "GetVariable",
        IRNodeType::Expression => "Expression",
        IRNodeType::FunctionCall => "FunctionCall",
        IRNodeType::Custom => "Custom",
    }
}

fn node_type_from_name(name: &str) -> Option<IRNodeType> {
    Some(match name {
        "SceneStart" => IRNodeType::SceneStart,
        "SceneEnd" => IRNodeType::SceneEnd,
        "Comment" => IRNodeType::Comment,
        "Sequence" => IRNodeType::Sequence,
        "Branch" => IRNodeType::Branch,
        "Switch" => IRNodeType::Switch,
        "Loop" => IRNodeType::Loop,
        "Goto" => IRNodeType::Goto,
        "Label" => IRNodeType::Label,
        "ShowCharacter" => IRNodeType::ShowCharacter,
        "HideCharacter" => IRNodeType::HideCharacter,
        "ShowBackground" => IRNodeType::ShowBackground,
        "Dialogue" => IRNodeType::Dialogue,
        "Choice" => IRNodeType::Choice,
        "ChoiceOption" => IRNodeType::ChoiceOption,
        "PlayMusic" => IRNodeType::PlayMusic,
        "StopMusic" => IRNodeType::StopMusic,
        "PlaySound" => IRNodeType::PlaySound,
        "Transition" => IRNodeType::Transition,
        "Wait" => IRNodeType::Wait,
        "SetVariable" => IRNodeType::SetVariable,
        "GetVariable" => IRNodeType::GetVariable,
        "Expression" => IRNodeType::Expression,
        "FunctionCall" => IRNodeType::FunctionCall,
        "Custom" => IRNodeType::Custom,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::{IRNode, PortId};

    #[test]
    fn visual_round_trip_preserves_nodes_and_connections() {
        let mut graph = IRGraph::new();
        graph.add_node(IRNode::new(1, IRNodeType::SceneStart).with_property("name", PropertyValue::String("intro".into())));
        graph.add_node(IRNode::new(2, IRNodeType::SceneEnd));
        graph.connect(PortId::output(1, "next"), PortId::input(2, "in"), None);
        graph.scene_entry_nodes.push(("intro".into(), 1));

        let visual = ir_to_visual(&graph);
        let rebuilt = visual_to_ir(&visual).unwrap();

        assert_eq!(rebuilt.nodes.len(), graph.nodes.len());
        assert_eq!(rebuilt.connections.len(), graph.connections.len());
        assert_eq!(rebuilt.scene_entry_nodes, graph.scene_entry_nodes);
    }

    #[test]
    fn unknown_node_type_name_is_rejected() {
        let visual = VisualGraph {
            nodes: vec![VisualNode {
                id: 1,
                type_name: "NotARealType".into(),
                properties: HashMap::new(),
                x: 0.0,
                y: 0.0,
            }],
            connections: vec![],
        };
        assert!(visual_to_ir(&visual).is_err());
    }
}
