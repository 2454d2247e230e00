//! The dashboard's global record filter.
//!
//! A new filter never patches earlier results: callers run a fresh pass
//! over the filtered snapshot and swap the whole report.

use crate::{
    clock::AnalysisClock,
    error::{AnalysisError, AnalysisResult},
    record::{InteractionRecord, RecordKind},
    types::SourceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Empty means every source.
    pub source_ids: Vec<SourceId>,
    /// Empty means every kind.
    pub kinds: Vec<RecordKind>,
    /// Substring match against either party.
    pub party: Option<String>,
}

#[derive(Debug)]
pub struct FilterOutcome<'a> {
    pub records: Vec<&'a InteractionRecord>,
    pub filtered_out: usize,
    /// Records dropped only because a date bound was set and their
    /// timestamp could not be read.
    pub unparsable_timestamps: usize,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.source_ids.is_empty()
            && self.kinds.is_empty()
            && self.party.as_deref().map_or(true, |p| p.trim().is_empty())
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AnalysisError::invalid(
                    "filter.date_from",
                    format!("{from} is after date_to {to}"),
                ));
            }
        }
        Ok(())
    }

    pub fn apply<'a>(
        &self,
        records: &'a [InteractionRecord],
        clock: &AnalysisClock,
    ) -> FilterOutcome<'a> {
        let mut outcome = FilterOutcome {
            records: Vec::with_capacity(records.len()),
            filtered_out: 0,
            unparsable_timestamps: 0,
        };
        let party = self
            .party
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty());
        let date_bounded = self.date_from.is_some() || self.date_to.is_some();

        for record in records {
            if !self.source_ids.is_empty() && !self.source_ids.contains(&record.source_id) {
                outcome.filtered_out += 1;
                continue;
            }
            if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
                outcome.filtered_out += 1;
                continue;
            }
            if let Some(needle) = &party {
                let hit = record
                    .parties()
                    .iter()
                    .any(|p| p.to_lowercase().contains(needle.as_str()));
                if !hit {
                    outcome.filtered_out += 1;
                    continue;
                }
            }
            if date_bounded {
                let Some(at) = clock.parse(&record.timestamp) else {
                    outcome.unparsable_timestamps += 1;
                    outcome.filtered_out += 1;
                    continue;
                };
                let after_start = self.date_from.map_or(true, |from| at >= from);
                let before_end = self.date_to.map_or(true, |to| at <= to);
                if !(after_start && before_end) {
                    outcome.filtered_out += 1;
                    continue;
                }
            }
            outcome.records.push(record);
        }

        if outcome.unparsable_timestamps > 0 {
            log::warn!(
                "filter excluded {} records with unreadable timestamps",
                outcome.unparsable_timestamps
            );
        }
        outcome
    }
}
