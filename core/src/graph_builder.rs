//! Graph builder — folds dyadic records into the entity graph.
//!
//! RULES:
//!   - The canonical graph is directed: A→B and B→A are distinct edges,
//!     oriented by who originated the interaction.
//!   - Every edge's endpoints exist as nodes.
//!   - first_seen / last_seen only ever widen.
//!   - The fold is commutative and associative: `merge` of two partial
//!     graphs equals the graph of the concatenated records.
//!   - Trimming is a display concern (see graph_overlay.rs); counts here
//!     are always exact.

use crate::{
    clock::AnalysisClock,
    record::{InteractionRecord, RecordKind},
    types::{EntityId, SourceId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: EntityId,
    pub target: EntityId,
}

impl EdgeKey {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Orientation-free key: endpoints in lexical order.
    pub fn undirected(&self) -> Self {
        if self.source <= self.target {
            self.clone()
        } else {
            Self::new(self.target.clone(), self.source.clone())
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Stable string form used by overlays: `"a->b"`.
    pub fn display_id(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    pub interaction_count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub outgoing: u64,
    pub incoming: u64,
    pub total_duration: u64,
    /// Uploads in which this entity appears.
    pub source_ids: BTreeSet<SourceId>,
}

impl Node {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            interaction_count: 0,
            first_seen: None,
            last_seen: None,
            outgoing: 0,
            incoming: 0,
            total_duration: 0,
            source_ids: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, other: &Node) {
        self.interaction_count = self.interaction_count.saturating_add(other.interaction_count);
        self.outgoing = self.outgoing.saturating_add(other.outgoing);
        self.incoming = self.incoming.saturating_add(other.incoming);
        self.total_duration = self.total_duration.saturating_add(other.total_duration);
        self.first_seen = earliest(self.first_seen, other.first_seen);
        self.last_seen = latest(self.last_seen, other.last_seen);
        self.source_ids.extend(other.source_ids.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityId,
    pub target: EntityId,
    pub call_count: u64,
    pub sms_count: u64,
    pub transaction_count: u64,
    pub duration_sum: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub source_ids: BTreeSet<SourceId>,
}

impl Edge {
    fn new(key: &EdgeKey) -> Self {
        Self {
            source: key.source.clone(),
            target: key.target.clone(),
            call_count: 0,
            sms_count: 0,
            transaction_count: 0,
            duration_sum: 0,
            first_seen: None,
            last_seen: None,
            source_ids: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone())
    }

    pub fn total_interactions(&self) -> u64 {
        self.call_count
            .saturating_add(self.sms_count)
            .saturating_add(self.transaction_count)
    }

    fn absorb(&mut self, other: &Edge) {
        self.call_count = self.call_count.saturating_add(other.call_count);
        self.sms_count = self.sms_count.saturating_add(other.sms_count);
        self.transaction_count = self.transaction_count.saturating_add(other.transaction_count);
        self.duration_sum = self.duration_sum.saturating_add(other.duration_sum);
        self.first_seen = earliest(self.first_seen, other.first_seen);
        self.last_seen = latest(self.last_seen, other.last_seen);
        self.source_ids.extend(other.source_ids.iter().cloned());
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub nodes: BTreeMap<EntityId, Node>,
    /// JSON object keys must be strings, so edges travel as a list.
    #[serde(with = "edge_list")]
    pub edges: BTreeMap<EdgeKey, Edge>,
}

mod edge_list {
    use super::{Edge, EdgeKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        edges: &BTreeMap<EdgeKey, Edge>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Edge> = edges.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EdgeKey, Edge>, D::Error> {
        let list = Vec::<Edge>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|e| (e.key(), e)).collect())
    }
}

/// An orientation-free edge: A→B and B→A summed. Self-loops never appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndirectedEdge {
    pub a: EntityId,
    pub b: EntityId,
    pub call_count: u64,
    pub sms_count: u64,
    pub transaction_count: u64,
    pub duration_sum: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl UndirectedEdge {
    pub fn total_interactions(&self) -> u64 {
        self.call_count
            .saturating_add(self.sms_count)
            .saturating_add(self.transaction_count)
    }
}

impl EntityGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.get(&EdgeKey::new(source, target))
    }

    /// Fold another partial graph into this one.
    pub fn merge(&mut self, other: &EntityGraph) {
        for (id, node) in &other.nodes {
            self.nodes
                .entry(id.clone())
                .or_insert_with(|| Node::new(id))
                .absorb(node);
        }
        for (key, edge) in &other.edges {
            self.edges
                .entry(key.clone())
                .or_insert_with(|| Edge::new(key))
                .absorb(edge);
        }
    }

    /// Distinct neighbours per node, ignoring direction and self-loops.
    pub fn degrees(&self) -> BTreeMap<&str, usize> {
        let mut neighbours: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in self.nodes.keys() {
            neighbours.entry(id.as_str()).or_default();
        }
        for key in self.edges.keys().filter(|k| !k.is_self_loop()) {
            neighbours
                .entry(key.source.as_str())
                .or_default()
                .insert(key.target.as_str());
            neighbours
                .entry(key.target.as_str())
                .or_default()
                .insert(key.source.as_str());
        }
        neighbours.into_iter().map(|(k, v)| (k, v.len())).collect()
    }

    /// Nodes whose undirected degree reaches `threshold`, highest first.
    pub fn hubs(&self, threshold: usize) -> Vec<EntityId> {
        if threshold == 0 {
            return Vec::new();
        }
        let mut hubs: Vec<(&str, usize)> = self
            .degrees()
            .into_iter()
            .filter(|(_, degree)| *degree >= threshold)
            .collect();
        hubs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        hubs.into_iter().map(|(id, _)| id.to_string()).collect()
    }

    pub fn undirected_projection(&self) -> Vec<UndirectedEdge> {
        let mut merged: BTreeMap<EdgeKey, UndirectedEdge> = BTreeMap::new();
        for (key, edge) in self.edges.iter().filter(|(k, _)| !k.is_self_loop()) {
            let pair = key.undirected();
            let entry = merged.entry(pair.clone()).or_insert_with(|| UndirectedEdge {
                a: pair.source.clone(),
                b: pair.target.clone(),
                call_count: 0,
                sms_count: 0,
                transaction_count: 0,
                duration_sum: 0,
                first_seen: None,
                last_seen: None,
            });
            entry.call_count = entry.call_count.saturating_add(edge.call_count);
            entry.sms_count = entry.sms_count.saturating_add(edge.sms_count);
            entry.transaction_count = entry.transaction_count.saturating_add(edge.transaction_count);
            entry.duration_sum = entry.duration_sum.saturating_add(edge.duration_sum);
            entry.first_seen = earliest(entry.first_seen, edge.first_seen);
            entry.last_seen = latest(entry.last_seen, edge.last_seen);
        }
        merged.into_values().collect()
    }

    /// True when a display of this graph would have to drop nodes.
    pub fn is_trimmed(&self, max_display_nodes: usize) -> bool {
        self.nodes.len() > max_display_nodes
    }
}

// ── Builder ────────────────────────────────────────────────────────────────

/// Interactive hide/show applied at build time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBuildOptions {
    pub excluded_nodes: BTreeSet<EntityId>,
    /// Directed keys; excluding A→B leaves B→A in place.
    pub excluded_edges: BTreeSet<EdgeKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDiagnostics {
    pub folded: usize,
    pub skipped_non_dyadic: usize,
    pub skipped_missing_party: usize,
    pub skipped_excluded: usize,
    pub self_loops: usize,
    /// Folded with exact counts but without widening any timestamps.
    pub undated: usize,
}

impl GraphDiagnostics {
    pub fn absorb(&mut self, other: &GraphDiagnostics) {
        self.folded += other.folded;
        self.skipped_non_dyadic += other.skipped_non_dyadic;
        self.skipped_missing_party += other.skipped_missing_party;
        self.skipped_excluded += other.skipped_excluded;
        self.self_loops += other.self_loops;
        self.undated += other.undated;
    }
}

pub struct GraphBuilder<'o> {
    options: &'o GraphBuildOptions,
    graph: EntityGraph,
    diagnostics: GraphDiagnostics,
}

impl<'o> GraphBuilder<'o> {
    pub fn new(options: &'o GraphBuildOptions) -> Self {
        Self {
            options,
            graph: EntityGraph::default(),
            diagnostics: GraphDiagnostics::default(),
        }
    }

    /// Fold one record. `at` is the parsed timestamp, if it parsed.
    pub fn fold(&mut self, record: &InteractionRecord, at: Option<DateTime<Utc>>) {
        if record.kind == RecordKind::TowerPresence {
            self.diagnostics.skipped_non_dyadic += 1;
            return;
        }
        let Some((from, to)) = record.oriented() else {
            self.diagnostics.skipped_missing_party += 1;
            return;
        };
        let key = EdgeKey::new(from, to);
        if self.options.excluded_nodes.contains(from)
            || self.options.excluded_nodes.contains(to)
            || self.options.excluded_edges.contains(&key)
        {
            self.diagnostics.skipped_excluded += 1;
            return;
        }

        self.diagnostics.folded += 1;
        if at.is_none() {
            self.diagnostics.undated += 1;
        }
        if key.is_self_loop() {
            self.diagnostics.self_loops += 1;
        }

        let duration = record.duration_seconds;
        let source = (!record.source_id.is_empty()).then_some(&record.source_id);

        let origin = self
            .graph
            .nodes
            .entry(from.to_string())
            .or_insert_with(|| Node::new(from));
        touch_node(origin, at, duration, source);
        origin.outgoing += 1;

        if key.is_self_loop() {
            origin.incoming += 1;
        } else {
            let recipient = self
                .graph
                .nodes
                .entry(to.to_string())
                .or_insert_with(|| Node::new(to));
            touch_node(recipient, at, duration, source);
            recipient.incoming += 1;
        }

        let edge = self
            .graph
            .edges
            .entry(key.clone())
            .or_insert_with(|| Edge::new(&key));
        match record.kind {
            RecordKind::Call => edge.call_count += 1,
            RecordKind::Sms => edge.sms_count += 1,
            RecordKind::Transaction => edge.transaction_count += 1,
            RecordKind::TowerPresence => {}
        }
        edge.duration_sum = edge.duration_sum.saturating_add(duration);
        edge.first_seen = earliest(edge.first_seen, at);
        edge.last_seen = latest(edge.last_seen, at);
        if let Some(source) = source {
            edge.source_ids.insert(source.clone());
        }
    }

    pub fn finish(self) -> (EntityGraph, GraphDiagnostics) {
        log::debug!(
            "graph folded {} records into {} nodes / {} edges",
            self.diagnostics.folded,
            self.graph.nodes.len(),
            self.graph.edges.len()
        );
        (self.graph, self.diagnostics)
    }
}

fn touch_node(node: &mut Node, at: Option<DateTime<Utc>>, duration: u64, source: Option<&SourceId>) {
    node.interaction_count += 1;
    node.total_duration = node.total_duration.saturating_add(duration);
    node.first_seen = earliest(node.first_seen, at);
    node.last_seen = latest(node.last_seen, at);
    if let Some(source) = source {
        node.source_ids.insert(source.clone());
    }
}

/// Single pass over `records`; timestamps parsed with `clock`.
pub fn build_graph<'a, I>(
    records: I,
    clock: &AnalysisClock,
    options: &GraphBuildOptions,
) -> (EntityGraph, GraphDiagnostics)
where
    I: IntoIterator<Item = &'a InteractionRecord>,
{
    let mut builder = GraphBuilder::new(options);
    for record in records {
        builder.fold(record, clock.parse(&record.timestamp));
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Direction;

    #[test]
    fn incoming_call_is_oriented_from_caller() {
        let records = vec![InteractionRecord::call(
            "r1",
            "2024-01-01 10:00:00",
            "A",
            "B",
            Direction::Incoming,
            40,
        )];
        let (graph, diag) = build_graph(&records, &AnalysisClock::utc(), &GraphBuildOptions::default());
        assert!(graph.edge("B", "A").is_some());
        assert!(graph.edge("A", "B").is_none());
        assert_eq!(graph.nodes["B"].outgoing, 1);
        assert_eq!(graph.nodes["A"].incoming, 1);
        assert_eq!(diag.folded, 1);
    }

    #[test]
    fn self_loop_is_kept_but_not_projected() {
        let records = vec![InteractionRecord::call("r1", "2024-01-01 10:00:00", "A", "A", Direction::Outgoing, 5)];
        let (graph, diag) = build_graph(&records, &AnalysisClock::utc(), &GraphBuildOptions::default());
        assert_eq!(diag.self_loops, 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.nodes["A"].interaction_count, 1);
        assert!(graph.undirected_projection().is_empty());
    }

    #[test]
    fn edges_serialize_as_a_list() {
        let records = vec![InteractionRecord::sms("r1", "2024-01-01 10:00:00", "A", "B", Direction::Outgoing)];
        let (graph, _) = build_graph(&records, &AnalysisClock::utc(), &GraphBuildOptions::default());
        let json = serde_json::to_value(&graph).unwrap();
        assert!(json["edges"].is_array());
        let back: EntityGraph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }
}
