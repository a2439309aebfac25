//! The IR graph's core types: nodes, ports, connections, and the graph
//! that owns them. Bridges the textual AST and the visual node editor.

use std::collections::HashMap;

use nms_core::span::Span;
use serde::{Deserialize, Serialize};

pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    pub node_id: NodeId,
    pub port_name: String,
    pub is_output: bool,
}

impl PortId {
    pub fn output(node_id: NodeId, port_name: impl Into<String>) -> Self {
        PortId {
            node_id,
            port_name: port_name.into(),
            is_output: true,
        }
    }

    pub fn input(node_id: NodeId, port_name: impl Into<String>) -> Self {
        PortId {
            node_id,
            port_name: port_name.into(),
            is_output: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IRConnection {
    pub source: PortId,
    pub target: PortId,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IRNodeType {
    SceneStart,
    SceneEnd,
    Comment,
    Sequence,
    Branch,
    Switch,
    Loop,
    Goto,
    Label,
    ShowCharacter,
    HideCharacter,
    ShowBackground,
    Dialogue,
    Choice,
    ChoiceOption,
    PlayMusic,
    StopMusic,
    PlaySound,
    Transition,
    Wait,
    SetVariable,
    GetVariable,
    Expression,
    FunctionCall,
    Custom,
}

/// The closed set of property value kinds an [`IRNode`] may carry. Kept
/// as a tagged union rather than an untyped map so converters can be
/// exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringList(Vec<String>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical string form used by the visual-graph mirror, where every
    /// property is a flat string.
    pub fn to_canonical_string(&self) -> String {
        match self {
            PropertyValue::Null => String::new(),
            PropertyValue::Bool(v) => v.to_string(),
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Float(v) => v.to_string(),
            PropertyValue::String(v) => v.clone(),
            PropertyValue::StringList(items) => items.join(","),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRNode {
    pub id: NodeId,
    pub node_type: IRNodeType,
    pub properties: HashMap<String, PropertyValue>,
    #[serde(skip)]
    pub source_span: Option<Span>,
    pub position: NodePosition,
}

impl IRNode {
    pub fn new(id: NodeId, node_type: IRNodeType) -> Self {
        IRNode {
            id,
            node_type,
            properties: HashMap::new(),
            source_span: None,
            position: NodePosition::default(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = NodePosition { x, y };
        self
    }

    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_str)
    }
}

/// The owned IR graph for one compiled program: nodes, an ordered
/// connection list, and the scene/character tables the editor needs
/// without walking every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IRGraph {
    pub nodes: HashMap<NodeId, IRNode>,
    pub connections: Vec<IRConnection>,
    pub scene_entry_nodes: Vec<(String, NodeId)>,
    pub character_declarations: Vec<(String, String, String)>,
}

impl IRGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: IRNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn connect(&mut self, source: PortId, target: PortId, label: Option<String>) {
        self.connections.push(IRConnection { source, target, label });
    }

    pub fn node(&self, id: NodeId) -> Option<&IRNode> {
        self.nodes.get(&id)
    }

    pub fn outgoing(&self, node_id: NodeId) -> impl Iterator<Item = &IRConnection> {
        self.connections.iter().filter(move |c| c.source.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_canonical_string_round_trips_scalars() {
        assert_eq!(PropertyValue::Int(42).to_canonical_string(), "42");
        assert_eq!(PropertyValue::Bool(true).to_canonical_string(), "true");
        assert_eq!(
            PropertyValue::StringList(vec!["a".into(), "b".into()]).to_canonical_string(),
            "a,b"
        );
    }

    #[test]
    fn graph_tracks_outgoing_connections_per_node() {
        let mut graph = IRGraph::new();
        graph.add_node(IRNode::new(1, IRNodeType::SceneStart));
        graph.add_node(IRNode::new(2, IRNodeType::Dialogue));
        graph.connect(PortId::output(1, "next"), PortId::input(2, "prev"), None);
        assert_eq!(graph.outgoing(1).count(), 1);
        assert_eq!(graph.outgoing(2).count(), 0);
    }
}
