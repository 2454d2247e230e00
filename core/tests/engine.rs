//! Full passes through the engine: validation, filtering, diagnostics,
//! optional capabilities.

use telecorr_core::{
    classification::KeywordClassifier,
    config::AnalysisConfig,
    engine::AnalysisEngine,
    error::AnalysisError,
    filter::RecordFilter,
    graph_overlay::{display_projection, GraphOverlay},
    location_resolver::TowerLookup,
    record::{Direction, InteractionRecord},
    synthetic::{generate, SyntheticConfig},
};

fn small_case() -> Vec<InteractionRecord> {
    vec![
        InteractionRecord::call("c1", "2024-01-01 10:00:00", "01711111111", "01722222222", Direction::Outgoing, 60)
            .with_source("cdr"),
        InteractionRecord::call("c2", "2024-01-01 10:05:00", "01722222222", "01733333333", Direction::Outgoing, 45)
            .with_source("cdr"),
        InteractionRecord::sms("s1", "2024-01-01 10:10:00", "01733333333", "01711111111", Direction::Outgoing)
            .with_source("sms")
            .with_content("your verification code is 1234"),
        InteractionRecord::call("bad", "yesterday-ish", "01711111111", "01744444444", Direction::Outgoing, 5)
            .with_source("cdr"),
    ]
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An invalid threshold aborts before any record is read.
#[test]
fn invalid_config_is_rejected() {
    let mut config = AnalysisConfig::default();
    config.chains.gap_minutes = 0;
    match AnalysisEngine::new(config).err() {
        Some(AnalysisError::InvalidConfig { field, .. }) => assert_eq!(field, "chains.gap_minutes"),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }

    let mut config = AnalysisConfig::default();
    config.time.utc_offset_minutes = 15 * 60;
    assert!(AnalysisEngine::new(config).is_err());
}

#[test]
fn inverted_filter_is_rejected() {
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let clock = engine.clock();
    let filter = RecordFilter {
        date_from: clock.parse("2024-02-01 00:00:00"),
        date_to: clock.parse("2024-01-01 00:00:00"),
        ..Default::default()
    };
    let result = engine.run(&small_case(), &TowerLookup::new(), &filter);
    assert!(matches!(result, Err(AnalysisError::InvalidConfig { .. })));
}

/// Unreadable timestamps are counted and kept out of time analysis, but
/// the interaction still reaches the graph.
#[test]
fn malformed_timestamps_are_counted_not_fatal() {
    init_logging();
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let report = engine
        .run(&small_case(), &TowerLookup::new(), &RecordFilter::default())
        .expect("pass succeeds");

    let diag = &report.diagnostics;
    assert_eq!(diag.records_in, 4);
    assert_eq!(diag.analysed, 4);
    assert_eq!(diag.unparsable_timestamps, 1);
    assert_eq!(diag.graph.undated, 1);
    assert!(report.graph.edge("01711111111", "01744444444").is_some());
    assert!(
        report.chains.iter().all(|c| c.calls.iter().all(|call| call.record_id != "bad")),
        "undated calls never join a chain"
    );
    assert!(!report.fingerprints.contains_key("01744444444"));
}

#[test]
fn classification_only_runs_with_a_classifier() {
    let records = small_case();
    let towers = TowerLookup::new();

    let plain = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let report = plain.run(&records, &towers, &RecordFilter::default()).expect("pass succeeds");
    assert!(!report.content.capability_available);
    assert!(report.content.flagged.is_empty());

    let with_text = AnalysisEngine::new(AnalysisConfig::default())
        .expect("default config is valid")
        .with_classifier(Box::new(KeywordClassifier::default()));
    let report = with_text.run(&records, &towers, &RecordFilter::default()).expect("pass succeeds");
    assert!(report.content.capability_available);
    assert_eq!(report.content.flagged.len(), 1);
    assert_eq!(report.content.flagged[0].record_id, "s1");
}

/// A party filter narrows the snapshot before any stage sees it.
#[test]
fn party_filter_narrows_the_pass() {
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let filter = RecordFilter {
        party: Some("0173".into()),
        ..Default::default()
    };
    let report = engine
        .run(&small_case(), &TowerLookup::new(), &filter)
        .expect("pass succeeds");

    assert_eq!(report.diagnostics.analysed, 2);
    assert_eq!(report.diagnostics.filtered_out, 2);
    assert!(report.graph.nodes.contains_key("01733333333"));
    assert!(report.graph.edge("01711111111", "01722222222").is_none());
}

/// Graphs beyond the display limit are flagged; hubs use the configured
/// degree.
#[test]
fn graph_trim_flag_and_hubs_follow_config() {
    let mut config = AnalysisConfig::default();
    config.graph.max_display_nodes = 2;
    config.graph.hub_degree_threshold = 2;
    let engine = AnalysisEngine::new(config).expect("valid config");
    let report = engine
        .run(&small_case(), &TowerLookup::new(), &RecordFilter::default())
        .expect("pass succeeds");

    assert!(report.graph_trimmed);
    assert_eq!(report.hubs[0], "01711111111", "degree 3 ranks first");
    assert_eq!(report.diagnostics.anomaly_rules.len(), 4);
}

/// A pass over generated data fills every section of the report.
#[test]
fn synthetic_pass_populates_every_stage() {
    init_logging();
    let dataset = generate(&SyntheticConfig {
        days: 7,
        ..Default::default()
    });
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let report = engine
        .run(&dataset.records, &dataset.towers, &RecordFilter::default())
        .expect("pass succeeds");

    assert!(report.graph.node_count() > 0);
    assert!(!report.chains.is_empty());
    assert!(!report.fingerprints.is_empty());
    assert!(!report.device_fingerprints.is_empty());
    assert!(!report.location_events.is_empty());
    assert!(!report.tower_visits.is_empty());
    assert_eq!(report.diagnostics.unparsable_timestamps, 0);
}

/// Absurd call durations are reported, not fatal.
#[test]
fn out_of_range_durations_are_counted() {
    init_logging();
    let records = vec![
        InteractionRecord::call(
            "huge",
            "2024-01-01 10:00:00",
            "01711111111",
            "01722222222",
            Direction::Outgoing,
            10_000_000_000_000_000,
        ),
        InteractionRecord::call("c2", "2024-01-01 11:00:00", "01711111111", "01722222222", Direction::Outgoing, 30),
    ];
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let report = engine
        .run(&records, &TowerLookup::new(), &RecordFilter::default())
        .expect("pass succeeds");

    assert_eq!(report.diagnostics.clamped_call_durations, 1);
    let edge = report.graph.edge("01711111111", "01722222222").expect("edge exists");
    assert_eq!(edge.duration_sum, 10_000_000_000_000_030);
    assert!(report.fingerprints["01711111111"].avg_call_duration_seconds.is_finite());
}

/// Links follow the filter's source selection.
#[test]
fn links_span_the_selected_sources() {
    let engine = AnalysisEngine::new(AnalysisConfig::default()).expect("default config is valid");
    let records = small_case();
    let towers = TowerLookup::new();

    let report = engine.run(&records, &towers, &RecordFilter::default()).expect("pass succeeds");
    let linked: Vec<&str> = report.links.iter().map(|l| l.number.as_str()).collect();
    assert_eq!(linked, vec!["01711111111", "01733333333"]);
    assert!(report.links.iter().all(|l| l.common_across_all_selected));
    assert!(report.tower_activity.is_empty(), "no record carries a location");

    let cdr_only = RecordFilter {
        source_ids: vec!["cdr".to_string()],
        ..Default::default()
    };
    let report = engine.run(&records, &towers, &cdr_only).expect("pass succeeds");
    assert!(report.links.is_empty());
}

/// The report's hub list and the display flag come from the same degree rule.
#[test]
fn report_hubs_match_display_flags() {
    let mut config = AnalysisConfig::default();
    config.graph.hub_degree_threshold = 3;
    let engine = AnalysisEngine::new(config).expect("valid config");
    let report = engine
        .run(&small_case(), &TowerLookup::new(), &RecordFilter::default())
        .expect("pass succeeds");

    assert_eq!(report.hubs, vec!["01711111111".to_string()]);
    let display = display_projection(&report.graph, &GraphOverlay::default(), 500, 3);
    let flagged: Vec<&str> = display
        .nodes
        .iter()
        .filter(|n| n.is_hub)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(flagged, vec!["01711111111"]);
}
