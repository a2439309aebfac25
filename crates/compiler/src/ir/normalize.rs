//! Canonicalizes node ids so two graphs that differ only in id
//! allocation order (e.g. one built fresh, one loaded from disk after
//! edits) compare equal once normalized. Required for the round-trip
//! validator: the AST has no stable node ids of its own, so each
//! AST -> IR lowering starts counting from 1 again.

use std::collections::HashMap;

use crate::ir::graph::{IRConnection, IRGraph, NodeId, PortId};

pub struct IDNormalizer;

impl IDNormalizer {
    /// Renumbers every node id to `1..=n` in a deterministic order:
    /// scene entry points first (in their declared order), then any
    /// remaining nodes by original id. Returns the normalized graph and
    /// the `old_id -> new_id` mapping that produced it.
    pub fn normalize(graph: &IRGraph) -> (IRGraph, HashMap<NodeId, NodeId>) {
        let mut order: Vec<NodeId> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (_, start_id) in &graph.scene_entry_nodes {
            if seen.insert(*start_id) {
                order.push(*start_id);
            }
        }
        let mut remaining: Vec<NodeId> = graph.nodes.keys().copied().filter(|id| !seen.contains(id)).collect();
        remaining.sort_unstable();
        order.extend(remaining);

        let mapping: HashMap<NodeId, NodeId> = order
            .into_iter()
            .enumerate()
            .map(|(i, old_id)| (old_id, (i + 1) as NodeId))
            .collect();

        let nodes = graph
            .nodes
            .values()
            .map(|node| {
                let mut remapped = node.clone();
                remapped.id = mapping[&node.id];
                (remapped.id, remapped)
            })
            .collect();

        let connections = graph
            .connections
            .iter()
            .map(|c| remap_connection(c, &mapping))
            .collect();

        let scene_entry_nodes = graph
            .scene_entry_nodes
            .iter()
            .map(|(name, id)| (name.clone(), mapping[id]))
            .collect();

        (
            IRGraph {
                nodes,
                connections,
                scene_entry_nodes,
                character_declarations: graph.character_declarations.clone(),
            },
            mapping,
        )
    }
}

fn remap_connection(connection: &IRConnection, mapping: &HashMap<NodeId, NodeId>) -> IRConnection {
    IRConnection {
        source: remap_port(&connection.source, mapping),
        target: remap_port(&connection.target, mapping),
        label: connection.label.clone(),
    }
}

fn remap_port(port: &PortId, mapping: &HashMap<NodeId, NodeId>) -> PortId {
    PortId {
        node_id: mapping[&port.node_id],
        port_name: port.port_name.clone(),
        is_output: port.is_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::{IRNode, IRNodeType};

    #[test]
    fn normalizing_twice_from_different_id_origins_agrees() {
        let mut a = IRGraph::new();
        a.add_node(IRNode::new(10, IRNodeType::SceneStart));
        a.add_node(IRNode::new(20, IRNodeType::Dialogue));
        a.connect(PortId::output(10, "next"), PortId::input(20, "in"), None);
        a.scene_entry_nodes.push(("intro".into(), 10));

        let mut b = IRGraph::new();
        b.add_node(IRNode::new(1, IRNodeType::SceneStart));
        b.add_node(IRNode::new(2, IRNodeType::Dialogue));
        b.connect(PortId::output(1, "next"), PortId::input(2, "in"), None);
        b.scene_entry_nodes.push(("intro".into(), 1));

        let (na, _) = IDNormalizer::normalize(&a);
        let (nb, _) = IDNormalizer::normalize(&b);
        assert_eq!(na, nb);
    }
}
