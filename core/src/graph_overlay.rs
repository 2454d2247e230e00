//! Presentation overlay for the entity graph.
//!
//! The analytical graph is never decorated in place. Colours, labels and
//! hidden sets live here, keyed by entity id / edge display id, and are
//! applied only when producing a display projection.

use crate::{
    graph_builder::{EntityGraph, UndirectedEdge},
    types::EntityId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOverlay {
    pub hidden_nodes: BTreeSet<EntityId>,
    /// Undirected display ids (`"a->b"` with a <= b).
    pub hidden_edges: BTreeSet<String>,
    pub node_colors: BTreeMap<EntityId, String>,
    pub edge_colors: BTreeMap<String, String>,
    pub node_labels: BTreeMap<EntityId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayNode {
    pub id: EntityId,
    pub label: String,
    pub color: Option<String>,
    pub interaction_count: u64,
    pub is_hub: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEdge {
    pub id: String,
    pub color: Option<String>,
    pub edge: UndirectedEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayGraph {
    pub nodes: Vec<DisplayNode>,
    pub edges: Vec<DisplayEdge>,
    /// Nodes were dropped to fit `max_nodes`. Aggregates in the
    /// underlying graph are unaffected.
    pub trimmed: bool,
    pub total_nodes: usize,
    pub total_edges: usize,
}

/// Layout-facing view: hidden items removed, self-loops excluded, the
/// `max_nodes` busiest nodes kept (ties by id).
pub fn display_projection(
    graph: &EntityGraph,
    overlay: &GraphOverlay,
    max_nodes: usize,
    hub_threshold: usize,
) -> DisplayGraph {
    let mut candidates: Vec<_> = graph
        .nodes
        .values()
        .filter(|n| !overlay.hidden_nodes.contains(&n.id))
        .collect();
    candidates.sort_by(|a, b| {
        b.interaction_count
            .cmp(&a.interaction_count)
            .then(a.id.cmp(&b.id))
    });
    let trimmed = candidates.len() > max_nodes;
    candidates.truncate(max_nodes);

    let hubs: BTreeSet<EntityId> = graph.hubs(hub_threshold).into_iter().collect();
    let mut nodes: Vec<DisplayNode> = candidates
        .into_iter()
        .map(|n| DisplayNode {
            id: n.id.clone(),
            label: overlay
                .node_labels
                .get(&n.id)
                .cloned()
                .unwrap_or_else(|| n.id.clone()),
            color: overlay.node_colors.get(&n.id).cloned(),
            interaction_count: n.interaction_count,
            is_hub: hubs.contains(&n.id),
        })
        .collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let kept: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let edges = graph
        .undirected_projection()
        .into_iter()
        .filter(|e| kept.contains(e.a.as_str()) && kept.contains(e.b.as_str()))
        .filter_map(|edge| {
            let id = format!("{}->{}", edge.a, edge.b);
            if overlay.hidden_edges.contains(&id) {
                return None;
            }
            Some(DisplayEdge {
                color: overlay.edge_colors.get(&id).cloned(),
                id,
                edge,
            })
        })
        .collect();

    DisplayGraph {
        nodes,
        edges,
        trimmed,
        total_nodes: graph.node_count(),
        total_edges: graph.edge_count(),
    }
}
