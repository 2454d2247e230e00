//! Numbers shared between uploaded sources.

use telecorr_core::{
    link_analysis::link_analysis,
    record::{Direction, InteractionRecord},
};

/// Three uploads: the shared contact "01799999999" appears in all of them,
/// "01711111111" only in the first two, everyone else in just one.
fn three_sources() -> Vec<InteractionRecord> {
    vec![
        InteractionRecord::call("a1", "2024-01-01 09:00:00", "01711111111", "01799999999", Direction::Outgoing, 60)
            .with_source("cdr-a")
            .with_location("L-1")
            .with_device("IMEI-1"),
        InteractionRecord::call("a2", "2024-01-01 09:30:00", "01711111111", "01700000001", Direction::Outgoing, 20)
            .with_source("cdr-a"),
        InteractionRecord::call("b1", "2024-01-02 10:00:00", "01722222222", "01711111111", Direction::Outgoing, 15)
            .with_source("cdr-b")
            .with_location("L-2"),
        InteractionRecord::sms("b2", "2024-01-02 10:05:00", "01799999999", "01722222222", Direction::Outgoing)
            .with_source("cdr-b"),
        InteractionRecord::call("c1", "2024-01-03 11:00:00", "01733333333", "01799999999", Direction::Outgoing, 40)
            .with_source("cdr-c"),
        InteractionRecord::call("x1", "2024-01-03 12:00:00", "01711111111", "01799999999", Direction::Outgoing, 40),
    ]
}

#[test]
fn numbers_in_two_or_more_sources_are_linked() {
    let records = three_sources();
    let results = link_analysis(&records, &[]);

    let numbers: Vec<&str> = results.iter().map(|r| r.number.as_str()).collect();
    assert_eq!(numbers, vec!["01711111111", "01799999999"], "equal totals fall back to number order");

    let shared = &results[1];
    assert_eq!(shared.total_occurrences, 3);
    assert!(shared.common_across_all_selected);
    let sources: Vec<&str> = shared.sources.iter().map(|s| s.source_id.as_str()).collect();
    assert_eq!(sources, vec!["cdr-a", "cdr-b", "cdr-c"]);

    let subject = &results[0];
    assert_eq!(subject.total_occurrences, 3);
    assert!(!subject.common_across_all_selected, "missing from cdr-c");
    let in_a = &subject.sources[0];
    assert_eq!((in_a.as_a_party, in_a.as_b_party), (2, 0));
    assert_eq!(in_a.record_ids, vec!["a1".to_string(), "a2".to_string()]);
    assert!(in_a.contacted_b_parties.contains("01799999999"));
    assert!(in_a.location_ids.contains("L-1"));
    assert!(in_a.devices.contains("IMEI-1"));
    let in_b = &subject.sources[1];
    assert_eq!((in_b.as_a_party, in_b.as_b_party), (0, 1));
    assert!(in_b.calling_a_parties.contains("01722222222"));
}

/// A number confined to one source is never reported, and records without
/// a source id never contribute.
#[test]
fn single_source_and_unattributed_records_are_ignored() {
    let records = three_sources();
    let results = link_analysis(&records, &[]);
    assert!(results
        .iter()
        .all(|r| r.number != "01733333333" && r.number != "01722222222"));
    assert!(results
        .iter()
        .flat_map(|r| &r.sources)
        .all(|s| !s.record_ids.contains(&"x1".to_string())));
}

#[test]
fn selection_narrows_the_sources_considered() {
    let records = three_sources();
    let selected = vec!["cdr-a".to_string(), "cdr-c".to_string()];
    let results = link_analysis(&records, &selected);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].number, "01799999999");
    assert!(results[0].common_across_all_selected);
    assert_eq!(results[0].total_occurrences, 2);
}
