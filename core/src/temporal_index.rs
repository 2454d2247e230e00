//! Temporal index — per-entity, time-sorted views over the record snapshot.
//!
//! RULES:
//!   - Timestamps are parsed once per pass (`TimedRecord::parse_all`) and
//!     every index of that pass is built from the same parsed slice.
//!   - Sorting is stable: equal timestamps keep ingestion order, so the
//!     same input always yields the same histories.
//!   - A record that cannot be indexed is counted, never silently dropped.

use crate::{clock::AnalysisClock, record::InteractionRecord, types::EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record paired with its parsed instant and ingestion position.
#[derive(Debug, Clone, Copy)]
pub struct TimedRecord<'a> {
    pub at: DateTime<Utc>,
    pub ordinal: usize,
    pub record: &'a InteractionRecord,
}

impl<'a> TimedRecord<'a> {
    /// Parse every record's timestamp. Records that fail are counted in
    /// the returned diagnostics and left out of the slice.
    pub fn parse_all<I>(records: I, clock: &AnalysisClock) -> (Vec<TimedRecord<'a>>, IndexDiagnostics)
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
    {
        let (timed, undated) = Self::partition(records, clock);
        let diagnostics = IndexDiagnostics {
            unparsable_timestamps: undated.len(),
            ..Default::default()
        };
        (timed, diagnostics)
    }

    /// Like [`TimedRecord::parse_all`] but hands back the undated records
    /// for stages that still count them.
    pub fn partition<I>(records: I, clock: &AnalysisClock) -> (Vec<TimedRecord<'a>>, Vec<&'a InteractionRecord>)
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
    {
        let mut timed = Vec::new();
        let mut undated = Vec::new();
        for (ordinal, record) in records.into_iter().enumerate() {
            match clock.parse(&record.timestamp) {
                Some(at) => timed.push(TimedRecord { at, ordinal, record }),
                None => {
                    log::debug!(
                        "record {} has unreadable timestamp {:?}",
                        record.id,
                        record.timestamp
                    );
                    undated.push(record);
                }
            }
        }
        (timed, undated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDiagnostics {
    pub indexed: usize,
    pub unparsable_timestamps: usize,
    /// Records for which the key function produced no entity.
    pub missing_keys: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TemporalIndex<'a> {
    entries: BTreeMap<EntityId, Vec<TimedRecord<'a>>>,
    diagnostics: IndexDiagnostics,
}

impl<'a> TemporalIndex<'a> {
    /// Parse and index in one step. Prefer [`TemporalIndex::from_timed`]
    /// when several indices are needed in the same pass.
    pub fn build<I, F>(records: I, clock: &AnalysisClock, key_fn: F) -> Self
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
        F: Fn(&'a InteractionRecord) -> Vec<&'a str>,
    {
        let (timed, parse_diagnostics) = TimedRecord::parse_all(records, clock);
        let mut index = Self::from_timed(&timed, key_fn);
        index.diagnostics.unparsable_timestamps = parse_diagnostics.unparsable_timestamps;
        index
    }

    pub fn from_timed<F>(timed: &[TimedRecord<'a>], key_fn: F) -> Self
    where
        F: Fn(&'a InteractionRecord) -> Vec<&'a str>,
    {
        let mut entries: BTreeMap<EntityId, Vec<TimedRecord<'a>>> = BTreeMap::new();
        let mut diagnostics = IndexDiagnostics::default();

        for item in timed {
            let mut keys = key_fn(item.record);
            keys.sort_unstable();
            keys.dedup();
            if keys.is_empty() {
                diagnostics.missing_keys += 1;
                continue;
            }
            diagnostics.indexed += 1;
            for key in keys {
                entries.entry(key.to_string()).or_default().push(*item);
            }
        }

        for history in entries.values_mut() {
            history.sort_by(|a, b| a.at.cmp(&b.at).then(a.ordinal.cmp(&b.ordinal)));
        }

        Self { entries, diagnostics }
    }

    /// Both parties of every record (numbers / accounts).
    pub fn by_party(timed: &[TimedRecord<'a>]) -> Self {
        Self::from_timed(timed, |r| r.parties())
    }

    /// Party A only: the subscriber whose cell the record carries.
    pub fn by_subscriber(timed: &[TimedRecord<'a>]) -> Self {
        Self::from_timed(timed, |r| r.party_a().into_iter().collect())
    }

    pub fn by_device(timed: &[TimedRecord<'a>]) -> Self {
        Self::from_timed(timed, |r| r.device().into_iter().collect())
    }

    pub fn by_sim(timed: &[TimedRecord<'a>]) -> Self {
        Self::from_timed(timed, |r| r.sim().into_iter().collect())
    }

    /// Chronological history of one entity; empty if unknown.
    pub fn history(&self, entity: &str) -> &[TimedRecord<'a>] {
        self.entries.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &[TimedRecord<'a>])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn diagnostics(&self) -> IndexDiagnostics {
        self.diagnostics
    }
}
