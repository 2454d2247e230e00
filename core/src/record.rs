//! The normalized interaction record — the only input the engine accepts.
//!
//! RULE: Records are created once by the external normalizer and never
//! mutated. Every component holds `&InteractionRecord`; nothing clones
//! record bodies into derived structures except identifiers.

use crate::types::{EntityId, LocationId, RecordId, SourceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Call,
    Sms,
    Transaction,
    TowerPresence,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
            Self::Transaction => "transaction",
            Self::TowerPresence => "tower_presence",
        }
    }
}

/// Direction as seen by `party_a`, the subscriber the record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Unknown,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
            Self::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: RecordId,
    #[serde(default)]
    pub source_id: SourceId,
    /// Raw timestamp exactly as the normalizer produced it.
    pub timestamp: String,
    #[serde(default)]
    pub party_a: EntityId,
    #[serde(default)]
    pub party_b: Option<EntityId>,
    pub kind: RecordKind,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub sim_id: Option<String>,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    #[serde(default)]
    pub direction: Direction,
    /// Message body, SMS only. Read solely by the optional classifier.
    #[serde(default)]
    pub content: Option<String>,
}

fn present(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl InteractionRecord {
    pub fn new(
        id: impl Into<RecordId>,
        kind: RecordKind,
        timestamp: impl Into<String>,
        party_a: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: String::new(),
            timestamp: timestamp.into(),
            party_a: party_a.into(),
            party_b: None,
            kind,
            duration_seconds: 0,
            device_id: None,
            sim_id: None,
            location_id: None,
            direction: Direction::Unknown,
            content: None,
        }
    }

    pub fn call(
        id: impl Into<RecordId>,
        timestamp: impl Into<String>,
        party_a: impl Into<EntityId>,
        party_b: impl Into<EntityId>,
        direction: Direction,
        duration_seconds: u64,
    ) -> Self {
        let mut record = Self::new(id, RecordKind::Call, timestamp, party_a);
        record.party_b = Some(party_b.into());
        record.direction = direction;
        record.duration_seconds = duration_seconds;
        record
    }

    pub fn sms(
        id: impl Into<RecordId>,
        timestamp: impl Into<String>,
        party_a: impl Into<EntityId>,
        party_b: impl Into<EntityId>,
        direction: Direction,
    ) -> Self {
        let mut record = Self::new(id, RecordKind::Sms, timestamp, party_a);
        record.party_b = Some(party_b.into());
        record.direction = direction;
        record
    }

    pub fn presence(
        id: impl Into<RecordId>,
        timestamp: impl Into<String>,
        party_a: impl Into<EntityId>,
        location_id: impl Into<LocationId>,
    ) -> Self {
        let mut record = Self::new(id, RecordKind::TowerPresence, timestamp, party_a);
        record.location_id = Some(location_id.into());
        record
    }

    pub fn with_source(mut self, source_id: impl Into<SourceId>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_sim(mut self, sim_id: impl Into<String>) -> Self {
        self.sim_id = Some(sim_id.into());
        self
    }

    pub fn with_location(mut self, location_id: impl Into<LocationId>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    // ── Normalized accessors: blank strings count as absent ──────────

    pub fn party_a(&self) -> Option<&str> {
        present(&self.party_a)
    }

    pub fn party_b(&self) -> Option<&str> {
        self.party_b.as_deref().and_then(present)
    }

    pub fn device(&self) -> Option<&str> {
        self.device_id.as_deref().and_then(present)
    }

    pub fn sim(&self) -> Option<&str> {
        self.sim_id.as_deref().and_then(present)
    }

    pub fn location(&self) -> Option<&str> {
        self.location_id.as_deref().and_then(present)
    }

    /// Both parties identifiable and the kind is a two-party interaction.
    pub fn is_dyadic(&self) -> bool {
        self.kind != RecordKind::TowerPresence && self.party_a().is_some() && self.party_b().is_some()
    }

    /// All identifiable parties, deduplicated (a self-call yields one).
    pub fn parties(&self) -> Vec<&str> {
        let mut parties: Vec<&str> = self.party_a().into_iter().chain(self.party_b()).collect();
        parties.dedup();
        parties
    }

    pub fn involves(&self, entity: &str) -> bool {
        self.party_a() == Some(entity) || self.party_b() == Some(entity)
    }

    /// (originator, recipient) of a dyadic record. `Unknown` direction is
    /// read as "party A originated".
    pub fn oriented(&self) -> Option<(&str, &str)> {
        let a = self.party_a()?;
        let b = self.party_b()?;
        match self.direction {
            Direction::Incoming => Some((b, a)),
            Direction::Outgoing | Direction::Unknown => Some((a, b)),
        }
    }

    /// Direction from the point of view of `entity`, which may be either
    /// party or the device/SIM of party A. Never returns `Unknown`.
    pub fn direction_for(&self, entity: &str) -> Direction {
        let as_a = match self.direction {
            Direction::Unknown => Direction::Outgoing,
            known => known,
        };
        if self.party_b() == Some(entity) && self.party_a() != Some(entity) {
            as_a.flipped()
        } else {
            as_a
        }
    }

    pub fn counterparty(&self, entity: &str) -> Option<&str> {
        match (self.party_a(), self.party_b()) {
            (Some(a), Some(b)) if a == entity => Some(b),
            (Some(a), Some(b)) if b == entity => Some(a),
            (_, b) if self.device() == Some(entity) || self.sim() == Some(entity) => b,
            _ => None,
        }
    }

    /// The cell on this record describes where `entity` was: true for the
    /// subscriber (party A) and for party A's device or SIM.
    pub fn locates(&self, entity: &str) -> bool {
        self.location().is_some()
            && (self.party_a() == Some(entity)
                || self.device() == Some(entity)
                || self.sim() == Some(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifiers_are_absent() {
        let mut record = InteractionRecord::call("r1", "2024-01-01 10:00:00", "  ", "017", Direction::Outgoing, 5);
        record.device_id = Some(String::new());
        assert!(record.party_a().is_none());
        assert!(record.device().is_none());
        assert!(!record.is_dyadic());
        assert_eq!(record.parties(), vec!["017"]);
    }

    #[test]
    fn direction_is_relative_to_entity() {
        let record = InteractionRecord::call("r1", "t", "A", "B", Direction::Incoming, 10);
        assert_eq!(record.direction_for("A"), Direction::Incoming);
        assert_eq!(record.direction_for("B"), Direction::Outgoing);
        assert_eq!(record.oriented(), Some(("B", "A")));

        let unknown = InteractionRecord::sms("r2", "t", "A", "B", Direction::Unknown);
        assert_eq!(unknown.direction_for("A"), Direction::Outgoing);
        assert_eq!(unknown.direction_for("B"), Direction::Incoming);
    }

    #[test]
    fn location_belongs_to_subscriber_only() {
        let record = InteractionRecord::call("r1", "t", "A", "B", Direction::Outgoing, 10)
            .with_location("L-1")
            .with_device("IMEI-1");
        assert!(record.locates("A"));
        assert!(record.locates("IMEI-1"));
        assert!(!record.locates("B"));
    }
}
