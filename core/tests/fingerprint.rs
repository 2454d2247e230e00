//! Behavioral fingerprints: histograms in the analysis zone, labels,
//! top locations and comparison.

use telecorr_core::{
    clock::AnalysisClock,
    config::FingerprintConfig,
    fingerprint::{
        compare_fingerprints, compute_fingerprint, ActivityFocus, Directionality, TimeSlot,
    },
    location_resolver::{TowerInfo, TowerLookup},
    record::{Direction, InteractionRecord},
    temporal_index::TemporalIndex,
    types::EntityKind,
};

const A: &str = "01711111111";

fn dhaka_clock() -> AnalysisClock {
    AnalysisClock::with_offset_minutes(360).expect("UTC+6 is a valid offset")
}

fn towers() -> TowerLookup {
    let mut towers = TowerLookup::new();
    towers.insert(
        "L-1",
        TowerInfo {
            lat: 23.81,
            lon: 90.41,
            address: Some("Gulshan 2, Dhaka".into()),
        },
    );
    towers
}

/// Mornings on the phone, one evening text, mostly at L-2.
fn records() -> Vec<InteractionRecord> {
    vec![
        InteractionRecord::call("c1", "2024-01-01 10:00:00", A, "B", Direction::Outgoing, 60)
            .with_location("L-1"),
        InteractionRecord::call("c2", "2024-01-01 10:30:00", A, "C", Direction::Outgoing, 120)
            .with_location("L-1"),
        InteractionRecord::call("c3", "2024-01-02 11:00:00", A, "B", Direction::Outgoing, 0)
            .with_location("L-2"),
        InteractionRecord::sms("s1", "2024-01-02 21:00:00", A, "B", Direction::Incoming),
        InteractionRecord::presence("p1", "2024-01-02 08:00:00", A, "L-2"),
        InteractionRecord::presence("p2", "2024-01-03 08:00:00", A, "L-2"),
    ]
}

/// No records: every label n/a, every histogram zero, no NaN anywhere.
#[test]
fn empty_history_is_not_applicable() {
    let fp = compute_fingerprint(
        A,
        EntityKind::Number,
        &[],
        &AnalysisClock::utc(),
        &FingerprintConfig::default(),
        &TowerLookup::new(),
    );

    assert_eq!(fp.total_interactions, 0);
    assert!(fp.hourly.iter().all(|h| *h == 0));
    assert!(fp.daily.iter().all(|d| *d == 0));
    assert_eq!(fp.avg_call_duration_seconds, 0.0);
    assert_eq!(fp.call_directionality, Directionality::NotApplicable);
    assert_eq!(fp.sms_directionality, Directionality::NotApplicable);
    assert_eq!(fp.primary_activity_focus, ActivityFocus::NotApplicable);
    assert_eq!(fp.dominant_time_slot, TimeSlot::NotApplicable);
    assert!(fp.top_locations.is_empty());

    let sim = compare_fingerprints(&fp, &fp);
    assert_eq!(sim.overall, 0.0, "nothing to compare must score zero, not NaN");
}

/// Hours and weekdays are read in the configured zone, not UTC.
#[test]
fn histograms_use_the_analysis_zone() {
    let records = records();
    let clock = dhaka_clock();
    let index = TemporalIndex::build(&records, &clock, |r| r.parties());
    let fp = compute_fingerprint(
        A,
        EntityKind::Number,
        index.history(A),
        &clock,
        &FingerprintConfig::default(),
        &towers(),
    );

    assert_eq!(fp.total_interactions, 4, "presence records are not interactions");
    assert_eq!(fp.call_count, 3);
    assert_eq!(fp.sms_count, 1);
    assert_eq!(fp.hourly[10], 2);
    assert_eq!(fp.hourly[11], 1);
    assert_eq!(fp.hourly[21], 1);
    // 2024-01-01 is a Monday.
    assert_eq!(fp.daily[0], 2);
    assert_eq!(fp.daily[1], 2);
    assert_eq!(fp.hourly.iter().sum::<u32>(), fp.total_interactions);
}

#[test]
fn labels_and_averages() {
    let records = records();
    let clock = dhaka_clock();
    let index = TemporalIndex::build(&records, &clock, |r| r.parties());
    let fp = compute_fingerprint(
        A,
        EntityKind::Number,
        index.history(A),
        &clock,
        &FingerprintConfig::default(),
        &towers(),
    );

    assert_eq!(fp.call_directionality, Directionality::Outgoing);
    assert_eq!(fp.sms_directionality, Directionality::Incoming);
    assert_eq!(fp.primary_activity_focus, ActivityFocus::Call);
    assert_eq!(fp.dominant_time_slot, TimeSlot::Morning);
    // Zero-length calls do not drag the average down.
    assert_eq!(fp.avg_call_duration_seconds, 90.0);

    // The counterparty sees the mirror image.
    let b = compute_fingerprint(
        "B",
        EntityKind::Number,
        index.history("B"),
        &clock,
        &FingerprintConfig::default(),
        &towers(),
    );
    assert_eq!(b.call_directionality, Directionality::Incoming);
    assert_eq!(b.sms_directionality, Directionality::Outgoing);
    assert!(b.top_locations.is_empty(), "cells on A's records say nothing about B");
}

/// Ranked by count, then id; addresses come from the lookup.
#[test]
fn top_locations_are_ranked_with_addresses() {
    let records = records();
    let clock = dhaka_clock();
    let index = TemporalIndex::build(&records, &clock, |r| r.parties());
    let fp = compute_fingerprint(
        A,
        EntityKind::Number,
        index.history(A),
        &clock,
        &FingerprintConfig::default(),
        &towers(),
    );

    let ranked: Vec<(&str, u32)> = fp
        .top_locations
        .iter()
        .map(|l| (l.location_id.as_str(), l.count))
        .collect();
    assert_eq!(ranked, vec![("L-2", 3), ("L-1", 2)]);
    assert_eq!(fp.top_locations[0].address, None);
    assert_eq!(fp.top_locations[1].address.as_deref(), Some("Gulshan 2, Dhaka"));

    let capped = compute_fingerprint(
        A,
        EntityKind::Number,
        index.history(A),
        &clock,
        &FingerprintConfig {
            top_locations: 1,
            ..Default::default()
        },
        &towers(),
    );
    assert_eq!(capped.top_locations.len(), 1);
}

/// A populated fingerprint is fully similar to itself.
#[test]
fn self_similarity_is_one() {
    let records = records();
    let clock = dhaka_clock();
    let index = TemporalIndex::build(&records, &clock, |r| r.parties());
    let fp = compute_fingerprint(
        A,
        EntityKind::Number,
        index.history(A),
        &clock,
        &FingerprintConfig::default(),
        &towers(),
    );

    let sim = compare_fingerprints(&fp, &fp);
    assert!((sim.overall - 1.0).abs() < 1e-9, "got {}", sim.overall);
    assert!((sim.hourly_cosine - 1.0).abs() < 1e-9);
    assert_eq!(sim.top_location_jaccard, 1.0);
}
