//! Structural diffing between two [`IRGraph`] snapshots, for undo/redo
//! and collaborative-edit merge in the visual editor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ir::graph::{IRConnection, IRGraph, IRNode, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeChange {
    Added(IRNode),
    Removed(IRNode),
    Modified { before: IRNode, after: IRNode },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDiff {
    pub node_changes: Vec<NodeChange>,
    pub connections_added: Vec<IRConnection>,
    pub connections_removed: Vec<IRConnection>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.node_changes.is_empty() && self.connections_added.is_empty() && self.connections_removed.is_empty()
    }
}

pub fn diff(before: &IRGraph, after: &IRGraph) -> GraphDiff {
    let mut node_changes = Vec::new();

    let before_ids: HashSet<NodeId> = before.nodes.keys().copied().collect();
    let after_ids: HashSet<NodeId> = after.nodes.keys().copied().collect();

    let mut ids: Vec<NodeId> = before_ids.union(&after_ids).copied().collect();
    ids.sort_unstable();

    for id in ids {
        match (before.nodes.get(&id), after.nodes.get(&id)) {
            (None, Some(new)) => node_changes.push(NodeChange::Added(new.clone())),
            (Some(old), None) => node_changes.push(NodeChange::Removed(old.clone())),
            (Some(old), Some(new)) if old != new => node_changes.push(NodeChange::Modified {
                before: old.clone(),
                after: new.clone(),
            }),
            _ => {}
        }
    }

    let before_set: HashSet<&IRConnection> = before.connections.iter().collect();
    let after_set: HashSet<&IRConnection> = after.connections.iter().collect();

    let connections_added = after
        .connections
        .iter()
        .filter(|c| !before_set.contains(c))
        .cloned()
        .collect();
    let connections_removed = before
        .connections
        .iter()
        .filter(|c| !after_set.contains(c))
        .cloned()
        .collect();

    GraphDiff {
        node_changes,
        connections_added,
        connections_removed,
    }
}

/// Applies a diff computed as `diff(base, target)` to `base`, producing
/// a graph equal to `target`.
pub fn apply(base: &IRGraph, diff: &GraphDiff) -> IRGraph {
    let mut out = base.clone();
    for change in &diff.node_changes {
        match change {
            NodeChange::Added(node) => {
                out.nodes.insert(node.id, node.clone());
            }
            NodeChange::Removed(node) => {
                out.nodes.remove(&node.id);
            }
            NodeChange::Modified { after, .. } => {
                out.nodes.insert(after.id, after.clone());
            }
        }
    }
    out.connections.retain(|c| !diff.connections_removed.contains(c));
    for added in &diff.connections_added {
        if !out.connections.contains(added) {
            out.connections.push(added.clone());
        }
    }
    out
}

/// Produces the diff that undoes `diff` when applied in turn.
pub fn invert(diff: &GraphDiff) -> GraphDiff {
    let node_changes = diff
        .node_changes
        .iter()
        .map(|change| match change {
            NodeChange::Added(node) => NodeChange::Removed(node.clone()),
            NodeChange::Removed(node) => NodeChange::Added(node.clone()),
            NodeChange::Modified { before, after } => NodeChange::Modified {
                before: after.clone(),
                after: before.clone(),
            },
        })
        .collect();

    GraphDiff {
        node_changes,
        connections_added: diff.connections_removed.clone(),
        connections_removed: diff.connections_added.clone(),
    }
}

/// Combines two diffs taken from the same base into one, with `other`'s
/// node changes winning on conflicting node ids. Used when two editor
/// sessions each produce a diff from a shared snapshot.
pub fn merge(mine: &GraphDiff, other: &GraphDiff) -> GraphDiff {
    let mut node_changes = mine.node_changes.clone();
    let other_ids: HashSet<NodeId> = other.node_changes.iter().map(change_node_id).collect();
    node_changes.retain(|c| !other_ids.contains(&change_node_id(c)));
    node_changes.extend(other.node_changes.iter().cloned());

    let mut connections_added = mine.connections_added.clone();
    for c in &other.connections_added {
        if !connections_added.contains(c) {
            connections_added.push(c.clone());
        }
    }

    let mut connections_removed = mine.connections_removed.clone();
    for c in &other.connections_removed {
        if !connections_removed.contains(c) {
            connections_removed.push(c.clone());
        }
    }

    GraphDiff {
        node_changes,
        connections_added,
        connections_removed,
    }
}

fn change_node_id(change: &NodeChange) -> NodeId {
    match change {
        NodeChange::Added(n) | NodeChange::Removed(n) => n.id,
        NodeChange::Modified { after, .. } => after.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::{IRNode, IRNodeType, PortId, PropertyValue};

    fn sample_graph() -> IRGraph {
        let mut graph = IRGraph::new();
        graph.add_node(IRNode::new(1, IRNodeType::SceneStart));
        graph.add_node(IRNode::new(2, IRNodeType::Dialogue).with_property("text", PropertyValue::String("hi".into())));
        graph.connect(PortId::output(1, "next"), PortId::input(2, "in"), None);
        graph
    }

    #[test]
    fn diff_apply_round_trips_to_target() {
        let before = sample_graph();
        let mut after = before.clone();
        after.add_node(IRNode::new(3, IRNodeType::SceneEnd));
        after.connect(PortId::output(2, "next"), PortId::input(3, "in"), None);

        let d = diff(&before, &after);
        assert!(!d.is_empty());
        let rebuilt = apply(&before, &d);
        assert_eq!(rebuilt, after);
    }

    #[test]
    fn invert_of_diff_undoes_the_change() {
        let before = sample_graph();
        let mut after = before.clone();
        after.nodes.remove(&2);

        let d = diff(&before, &after);
        let applied = apply(&before, &d);
        assert_eq!(applied, after);

        let undone = apply(&applied, &invert(&d));
        assert_eq!(undone, before);
    }
}
