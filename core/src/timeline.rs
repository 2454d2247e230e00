//! Unified activity timeline for one number or IMEI.

use crate::{
    clock::AnalysisClock,
    record::{Direction, InteractionRecord, RecordKind},
    temporal_index::TimedRecord,
    types::{EntityId, LocationId, RecordId, SourceId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Number,
    Device,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineQuery {
    pub identifier: String,
    pub kind: IdentifierKind,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    /// Empty means every kind.
    #[serde(default)]
    pub kinds: Vec<RecordKind>,
}

impl TimelineQuery {
    pub fn number(identifier: impl Into<String>) -> Self {
        Self::new(identifier, IdentifierKind::Number)
    }

    pub fn device(identifier: impl Into<String>) -> Self {
        Self::new(identifier, IdentifierKind::Device)
    }

    fn new(identifier: impl Into<String>, kind: IdentifierKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            date_from: None,
            date_to: None,
            kinds: Vec::new(),
        }
    }

    fn matches(&self, item: &TimedRecord<'_>) -> bool {
        let id = self.identifier.trim();
        let touches = match self.kind {
            IdentifierKind::Number => item.record.involves(id),
            IdentifierKind::Device => item.record.device() == Some(id),
        };
        touches
            && (self.kinds.is_empty() || self.kinds.contains(&item.record.kind))
            && self.date_from.map_or(true, |from| item.at >= from)
            && self.date_to.map_or(true, |to| item.at <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub record_id: RecordId,
    pub source_id: SourceId,
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub direction: Direction,
    pub counterparty: Option<EntityId>,
    pub location_id: Option<LocationId>,
    pub duration_seconds: u64,
    pub title: String,
}

fn title(kind: RecordKind, direction: Direction, counterparty: Option<&str>, record: &InteractionRecord) -> String {
    let other = counterparty.unwrap_or("unknown");
    let outgoing = direction != Direction::Incoming;
    match kind {
        RecordKind::Call if outgoing => format!("Outgoing call to {other} ({}s)", record.duration_seconds),
        RecordKind::Call => format!("Incoming call from {other} ({}s)", record.duration_seconds),
        RecordKind::Sms if outgoing => format!("SMS sent to {other}"),
        RecordKind::Sms => format!("SMS received from {other}"),
        RecordKind::Transaction if outgoing => format!("Transaction to {other}"),
        RecordKind::Transaction => format!("Transaction from {other}"),
        RecordKind::TowerPresence => format!("Seen at tower {}", record.location().unwrap_or("unknown")),
    }
}

/// Every record touching the identifier, chronologically. Records whose
/// timestamp cannot be read are left out.
pub fn unified_timeline(
    records: &[InteractionRecord],
    clock: &AnalysisClock,
    query: &TimelineQuery,
) -> Vec<TimelineEvent> {
    let (mut timed, diagnostics) = TimedRecord::parse_all(records, clock);
    if diagnostics.unparsable_timestamps > 0 {
        log::debug!(
            "timeline for {} skipped {} undated records",
            query.identifier,
            diagnostics.unparsable_timestamps
        );
    }
    timed.retain(|item| query.matches(item));
    timed.sort_by(|a, b| a.at.cmp(&b.at).then(a.ordinal.cmp(&b.ordinal)));

    let id = query.identifier.trim();
    timed
        .into_iter()
        .map(|item| {
            let record = item.record;
            let (direction, counterparty) = match query.kind {
                IdentifierKind::Number => (record.direction_for(id), record.counterparty(id)),
                IdentifierKind::Device => (
                    record.direction_for(record.party_a().unwrap_or(id)),
                    record.party_b(),
                ),
            };
            let direction = match record.kind {
                RecordKind::TowerPresence => Direction::Unknown,
                _ => direction,
            };
            TimelineEvent {
                record_id: record.id.clone(),
                source_id: record.source_id.clone(),
                timestamp: item.at,
                kind: record.kind,
                direction,
                counterparty: counterparty.map(str::to_string),
                location_id: record.location().map(str::to_string),
                duration_seconds: record.duration_seconds,
                title: title(record.kind, direction, counterparty, record),
            }
        })
        .collect()
}
