//! Chain detector — splits one entity's call history into conversation
//! chains.
//!
//! A chain grows while the next call starts no more than `gap_minutes`
//! after the previous call ended and shares a participant with the
//! chain so far. Boundaries depend only on the sorted input and the
//! threshold.

use crate::{
    record::RecordKind,
    temporal_index::{TemporalIndex, TimedRecord},
    types::{EntityId, RecordId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    pub record_id: RecordId,
    pub caller: EntityId,
    pub receiver: EntityId,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: u64,
    /// Silence before the next call in the same chain; `None` for the last.
    pub gap_to_next_seconds: Option<i64>,
}

impl CallEvent {
    /// When the call ended. A duration running past the last representable
    /// instant saturates there.
    pub fn end(&self) -> DateTime<Utc> {
        self.checked_end().unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True when `end` had to saturate.
    pub fn is_clamped(&self) -> bool {
        self.checked_end().is_none()
    }

    fn checked_end(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.duration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| self.timestamp.checked_add_signed(d))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationChain {
    pub id: String,
    /// The entity whose history was scanned.
    pub entity: EntityId,
    pub calls: Vec<CallEvent>,
    /// Everyone on any call of the chain, the scanned entity included.
    pub participants: BTreeSet<EntityId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_talk_seconds: u64,
    pub overall_timespan_seconds: i64,
    /// Distinct counterparties, not counting the scanned entity.
    pub depth: usize,
}

struct OpenChain {
    calls: Vec<CallEvent>,
    participants: BTreeSet<EntityId>,
}

impl OpenChain {
    fn start(call: CallEvent) -> Self {
        let participants = [call.caller.clone(), call.receiver.clone()].into_iter().collect();
        Self {
            calls: vec![call],
            participants,
        }
    }

    fn accepts(&self, call: &CallEvent, max_gap: Duration) -> bool {
        let Some(last) = self.calls.last() else {
            return false;
        };
        let gap = (call.timestamp - last.end()).max(Duration::zero());
        gap <= max_gap
            && (self.participants.contains(&call.caller) || self.participants.contains(&call.receiver))
    }

    fn push(&mut self, call: CallEvent) {
        if let Some(last) = self.calls.last_mut() {
            last.gap_to_next_seconds = Some((call.timestamp - last.end()).num_seconds().max(0));
        }
        self.participants.insert(call.caller.clone());
        self.participants.insert(call.receiver.clone());
        self.calls.push(call);
    }

    fn close(self, entity: &str, ordinal: usize) -> Option<ConversationChain> {
        let first = self.calls.first()?;
        let start_time = first.timestamp;
        let end_time = self
            .calls
            .iter()
            .map(CallEvent::end)
            .max()
            .unwrap_or(start_time);
        let total_talk_seconds = self
            .calls
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.duration_seconds));
        let depth = self.participants.iter().filter(|p| p.as_str() != entity).count();
        Some(ConversationChain {
            id: format!("{entity}-{ordinal}"),
            entity: entity.to_string(),
            calls: self.calls,
            participants: self.participants,
            start_time,
            end_time,
            total_talk_seconds,
            overall_timespan_seconds: (end_time - start_time).num_seconds(),
            depth,
        })
    }
}

fn call_event(item: &TimedRecord<'_>) -> Option<CallEvent> {
    if item.record.kind != RecordKind::Call {
        return None;
    }
    let (caller, receiver) = item.record.oriented()?;
    Some(CallEvent {
        record_id: item.record.id.clone(),
        caller: caller.to_string(),
        receiver: receiver.to_string(),
        timestamp: item.at,
        duration_seconds: item.record.duration_seconds,
        gap_to_next_seconds: None,
    })
}

/// Greedy forward scan over one entity's time-sorted history. Non-call
/// records and calls without a second party are ignored.
pub fn detect_chains(entity: &str, history: &[TimedRecord<'_>], gap_minutes: i64) -> Vec<ConversationChain> {
    let max_gap = Duration::try_minutes(gap_minutes).unwrap_or(Duration::MAX);
    let mut chains = Vec::new();
    let mut open: Option<OpenChain> = None;

    for call in history.iter().filter_map(call_event) {
        match open.as_mut() {
            Some(chain) if chain.accepts(&call, max_gap) => chain.push(call),
            _ => {
                if let Some(done) = open.take().and_then(|c| c.close(entity, chains.len() + 1)) {
                    chains.push(done);
                }
                open = Some(OpenChain::start(call));
            }
        }
    }
    if let Some(done) = open.and_then(|c| c.close(entity, chains.len() + 1)) {
        chains.push(done);
    }
    chains
}

/// Call records whose duration runs past the representable end of time.
pub fn count_clamped_calls(timed: &[TimedRecord<'_>]) -> usize {
    timed
        .iter()
        .filter_map(call_event)
        .filter(CallEvent::is_clamped)
        .count()
}

/// Chains for every entity in the index, entity order, keeping only those
/// with at least `min_depth` counterparties.
pub fn detect_all(index: &TemporalIndex<'_>, gap_minutes: i64, min_depth: usize) -> Vec<ConversationChain> {
    let chains: Vec<ConversationChain> = index
        .iter()
        .flat_map(|(entity, history)| detect_chains(entity, history, gap_minutes))
        .filter(|chain| chain.depth >= min_depth)
        .collect();
    log::debug!("chain detection produced {} chains", chains.len());
    chains
}
