//! Cross-source link analysis: numbers that surface in more than one
//! uploaded source.
//!
//! A number "appears" in a source when any record of that source names it
//! as either party. Records without a source id cannot be attributed and
//! are skipped.

use crate::{
    record::InteractionRecord,
    types::{EntityId, LocationId, RecordId, SourceId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What one source says about a linked number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAppearance {
    pub source_id: SourceId,
    pub as_a_party: u64,
    pub as_b_party: u64,
    pub record_ids: Vec<RecordId>,
    /// Counterparties reached while the number was party A.
    pub contacted_b_parties: BTreeSet<EntityId>,
    /// Counterparties seen calling in while the number was party B.
    pub calling_a_parties: BTreeSet<EntityId>,
    pub location_ids: BTreeSet<LocationId>,
    pub devices: BTreeSet<String>,
}

impl SourceAppearance {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            ..Default::default()
        }
    }

    pub fn occurrences(&self) -> u64 {
        self.as_a_party.saturating_add(self.as_b_party)
    }

    fn note_context(&mut self, record: &InteractionRecord) {
        if self.record_ids.last() != Some(&record.id) {
            self.record_ids.push(record.id.clone());
        }
        if let Some(location) = record.location() {
            self.location_ids.insert(location.to_string());
        }
        if let Some(device) = record.device() {
            self.devices.insert(device.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAnalysisResult {
    pub number: EntityId,
    /// One entry per source the number appears in, source order.
    pub sources: Vec<SourceAppearance>,
    pub total_occurrences: u64,
    /// Present in every source of the selection.
    pub common_across_all_selected: bool,
}

/// Numbers appearing in at least two of `selected_sources`. An empty
/// selection means every source present in `records`.
///
/// Results are ordered by total occurrences, busiest first, then by number.
pub fn link_analysis<'a, I>(records: I, selected_sources: &[SourceId]) -> Vec<LinkAnalysisResult>
where
    I: IntoIterator<Item = &'a InteractionRecord>,
{
    let wanted: BTreeSet<&str> = selected_sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let mut seen_sources: BTreeSet<String> = BTreeSet::new();
    let mut by_number: BTreeMap<EntityId, BTreeMap<SourceId, SourceAppearance>> = BTreeMap::new();
    let mut unattributed = 0usize;

    for record in records {
        let source = record.source_id.trim();
        if source.is_empty() {
            unattributed += 1;
            continue;
        }
        if !wanted.is_empty() && !wanted.contains(source) {
            continue;
        }
        seen_sources.insert(source.to_string());

        if let Some(a) = record.party_a() {
            let entry = appearance(&mut by_number, a, source);
            entry.as_a_party = entry.as_a_party.saturating_add(1);
            if let Some(b) = record.party_b() {
                entry.contacted_b_parties.insert(b.to_string());
            }
            entry.note_context(record);
        }
        if let Some(b) = record.party_b() {
            let entry = appearance(&mut by_number, b, source);
            entry.as_b_party = entry.as_b_party.saturating_add(1);
            if let Some(a) = record.party_a() {
                entry.calling_a_parties.insert(a.to_string());
            }
            entry.note_context(record);
        }
    }
    if unattributed > 0 {
        log::debug!("link analysis skipped {unattributed} records without a source id");
    }

    let universe = if wanted.is_empty() {
        seen_sources.len()
    } else {
        wanted.len()
    };

    let mut results: Vec<LinkAnalysisResult> = by_number
        .into_iter()
        .filter(|(_, sources)| sources.len() >= 2)
        .map(|(number, sources)| {
            let total_occurrences = sources
                .values()
                .fold(0u64, |acc, s| acc.saturating_add(s.occurrences()));
            LinkAnalysisResult {
                number,
                common_across_all_selected: sources.len() == universe,
                sources: sources.into_values().collect(),
                total_occurrences,
            }
        })
        .collect();
    results.sort_by(|a, b| {
        b.total_occurrences
            .cmp(&a.total_occurrences)
            .then_with(|| a.number.cmp(&b.number))
    });
    results
}

fn appearance<'m>(
    by_number: &'m mut BTreeMap<EntityId, BTreeMap<SourceId, SourceAppearance>>,
    number: &str,
    source: &str,
) -> &'m mut SourceAppearance {
    by_number
        .entry(number.to_string())
        .or_default()
        .entry(source.to_string())
        .or_insert_with(|| SourceAppearance::new(source))
}
