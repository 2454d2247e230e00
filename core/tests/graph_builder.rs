//! Entity graph construction, merge semantics and exclusions.

use telecorr_core::{
    clock::AnalysisClock,
    graph_builder::{build_graph, EdgeKey, EntityGraph, GraphBuildOptions},
    record::{Direction, InteractionRecord, RecordKind},
    synthetic::{generate, SyntheticConfig},
};

fn build(records: &[InteractionRecord]) -> EntityGraph {
    build_graph(records, &AnalysisClock::utc(), &GraphBuildOptions::default()).0
}

/// Building from {fileA, fileB} concatenated equals merging the graphs
/// built from each file, in either order.
#[test]
fn merge_equals_concatenation() {
    let dataset = generate(&SyntheticConfig {
        seed: 11,
        days: 10,
        ..Default::default()
    });
    let (file_a, file_b): (Vec<_>, Vec<_>) = dataset
        .records
        .iter()
        .cloned()
        .enumerate()
        .partition(|(i, _)| i % 3 == 0);
    let file_a: Vec<InteractionRecord> = file_a.into_iter().map(|(_, r)| r).collect();
    let file_b: Vec<InteractionRecord> = file_b.into_iter().map(|(_, r)| r).collect();

    let whole = build(&dataset.records);

    let mut ab = build(&file_a);
    ab.merge(&build(&file_b));
    let mut ba = build(&file_b);
    ba.merge(&build(&file_a));

    assert_eq!(ab, whole, "merge(A, B) differs from build(A ++ B)");
    assert_eq!(ba, whole, "merge(B, A) differs from build(A ++ B)");
}

/// Counts accumulate and first/last seen only widen.
#[test]
fn edges_accumulate_and_widen() {
    let mut records = vec![
        InteractionRecord::call("r1", "2024-01-05 10:00:00", "A", "B", Direction::Outgoing, 60),
        InteractionRecord::sms("r2", "2024-01-01 10:00:00", "A", "B", Direction::Outgoing),
        InteractionRecord::call("r3", "2024-01-09 10:00:00", "A", "B", Direction::Outgoing, 30),
        InteractionRecord::new("r4", RecordKind::Transaction, "2024-01-03 10:00:00", "A")
            .with_source("mfs"),
    ];
    records[3].party_b = Some("B".into());

    let graph = build(&records);
    let edge = graph.edge("A", "B").expect("edge A->B");
    assert_eq!(edge.call_count, 2);
    assert_eq!(edge.sms_count, 1);
    assert_eq!(edge.transaction_count, 1);
    assert_eq!(edge.duration_sum, 90);
    let clock = AnalysisClock::utc();
    assert_eq!(edge.first_seen, clock.parse("2024-01-01 10:00:00"));
    assert_eq!(edge.last_seen, clock.parse("2024-01-09 10:00:00"));
    assert!(edge.source_ids.contains("mfs"));

    assert_eq!(graph.nodes["A"].outgoing, 4);
    assert_eq!(graph.nodes["B"].incoming, 4);
    assert_eq!(graph.nodes["A"].total_duration, 90);
}

/// Every edge endpoint is a node; undated records still count.
#[test]
fn endpoints_exist_and_undated_records_count() {
    let records = vec![
        InteractionRecord::call("r1", "garbage", "A", "B", Direction::Outgoing, 60),
        InteractionRecord::presence("p1", "2024-01-01 10:00:00", "A", "L-1"),
        InteractionRecord::call("r2", "2024-01-01 10:00:00", "", "B", Direction::Outgoing, 60),
    ];
    let (graph, diag) = build_graph(&records, &AnalysisClock::utc(), &GraphBuildOptions::default());

    assert_eq!(diag.folded, 1);
    assert_eq!(diag.undated, 1);
    assert_eq!(diag.skipped_non_dyadic, 1);
    assert_eq!(diag.skipped_missing_party, 1);
    for key in graph.edges.keys() {
        assert!(graph.nodes.contains_key(&key.source), "missing node {}", key.source);
        assert!(graph.nodes.contains_key(&key.target), "missing node {}", key.target);
    }
    assert_eq!(graph.nodes["A"].first_seen, None);
    assert_eq!(graph.edge("A", "B").map(|e| e.call_count), Some(1));
}

/// Hidden nodes and directed edges are left out of the fold and counted.
#[test]
fn exclusions_are_directed() {
    let records = vec![
        InteractionRecord::call("r1", "2024-01-01 10:00:00", "A", "B", Direction::Outgoing, 10),
        InteractionRecord::call("r2", "2024-01-01 11:00:00", "B", "A", Direction::Outgoing, 10),
        InteractionRecord::call("r3", "2024-01-01 12:00:00", "A", "C", Direction::Outgoing, 10),
    ];
    let mut options = GraphBuildOptions::default();
    options.excluded_edges.insert(EdgeKey::new("A", "B"));
    options.excluded_nodes.insert("C".into());

    let (graph, diag) = build_graph(&records, &AnalysisClock::utc(), &options);
    assert!(graph.edge("A", "B").is_none());
    assert!(graph.edge("B", "A").is_some());
    assert!(!graph.nodes.contains_key("C"));
    assert_eq!(diag.skipped_excluded, 2);
}

/// Hubs by undirected degree; A→B and B→A are one neighbour.
#[test]
fn hubs_use_undirected_degree() {
    let mut records: Vec<InteractionRecord> = (0..4)
        .map(|i| {
            InteractionRecord::call(
                format!("r{i}"),
                "2024-01-01 10:00:00",
                "HUB",
                format!("N{i}"),
                Direction::Outgoing,
                5,
            )
        })
        .collect();
    records.push(InteractionRecord::call("back", "2024-01-01 11:00:00", "N0", "HUB", Direction::Outgoing, 5));

    let graph = build(&records);
    assert_eq!(graph.degrees()["HUB"], 4);
    assert_eq!(graph.hubs(4), vec!["HUB".to_string()]);
    assert!(graph.hubs(5).is_empty());

    let projection = graph.undirected_projection();
    assert_eq!(projection.len(), 4);
    let hub_n0 = projection.iter().find(|e| e.b == "N0").expect("HUB-N0");
    assert_eq!(hub_n0.call_count, 2);
    assert!(graph.is_trimmed(3));
    assert!(!graph.is_trimmed(5));
}

/// Duration totals saturate rather than wrap.
#[test]
fn duration_totals_saturate() {
    let records = vec![
        InteractionRecord::call("c1", "2024-01-01 10:00:00", "A", "B", Direction::Outgoing, u64::MAX),
        InteractionRecord::call("c2", "2024-01-01 11:00:00", "A", "B", Direction::Outgoing, u64::MAX),
    ];
    let mut graph = build(&records);
    let edge = graph.edge("A", "B").expect("edge exists");
    assert_eq!(edge.call_count, 2);
    assert_eq!(edge.duration_sum, u64::MAX);
    assert_eq!(graph.nodes["A"].total_duration, u64::MAX);
    assert_eq!(graph.undirected_projection()[0].duration_sum, u64::MAX);

    let copy = graph.clone();
    graph.merge(&copy);
    assert_eq!(graph.edge("A", "B").map(|e| e.duration_sum), Some(u64::MAX));
    assert_eq!(graph.nodes["B"].total_duration, u64::MAX);
}
