//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

/// A tracked identifier: phone number, IMEI, IMSI or financial account.
pub type EntityId = String;

/// Composite area-code + cell identifier, e.g. `"LAC-CELL"`.
pub type LocationId = String;

/// Stable identifier of a single normalized record.
pub type RecordId = String;

/// Identifier of the uploaded source (file) a record came from.
pub type SourceId = String;

/// What kind of identifier an entity id denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Number,
    Device,
    Sim,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Device => "device",
            Self::Sim => "sim",
        }
    }
}
