//! Per-tower activity: who was served by a cell, when, and for how long.

use crate::{
    clock::AnalysisClock,
    location_resolver::{Coordinate, TowerLookup},
    record::RecordKind,
    temporal_index::TimedRecord,
    types::{EntityId, LocationId, RecordId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyActivity {
    pub hour: u32,
    pub record_count: u64,
    pub total_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerActivity {
    pub location_id: LocationId,
    pub address: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub record_count: u64,
    pub total_call_duration: u64,
    pub unique_a_parties: BTreeSet<EntityId>,
    pub unique_b_parties: BTreeSet<EntityId>,
    /// Local hours 0-23 of the analysis clock.
    pub hourly: Vec<HourlyActivity>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub record_ids: Vec<RecordId>,
}

impl TowerActivity {
    fn new(location_id: &str, towers: &TowerLookup) -> Self {
        Self {
            location_id: location_id.to_string(),
            address: towers.address(location_id).map(str::to_string),
            coordinate: towers.coordinate(location_id),
            record_count: 0,
            total_call_duration: 0,
            unique_a_parties: BTreeSet::new(),
            unique_b_parties: BTreeSet::new(),
            hourly: (0..24)
                .map(|hour| HourlyActivity {
                    hour,
                    ..Default::default()
                })
                .collect(),
            first_seen: None,
            last_seen: None,
            record_ids: Vec::new(),
        }
    }

    /// The busiest local hour; the earliest wins a tie. `None` when idle.
    pub fn peak_hour(&self) -> Option<u32> {
        self.hourly
            .iter()
            .filter(|h| h.record_count > 0)
            .max_by(|a, b| a.record_count.cmp(&b.record_count).then(b.hour.cmp(&a.hour)))
            .map(|h| h.hour)
    }
}

/// Aggregate every located record by tower. `record_ids` keep the order of
/// `timed`. Towers missing from `towers` are still reported, without
/// address or coordinate.
pub fn tower_activity(
    timed: &[TimedRecord<'_>],
    clock: &AnalysisClock,
    towers: &TowerLookup,
) -> BTreeMap<LocationId, TowerActivity> {
    let mut activity: BTreeMap<LocationId, TowerActivity> = BTreeMap::new();

    for item in timed {
        let record = item.record;
        let Some(location) = record.location() else {
            continue;
        };
        let tower = activity
            .entry(location.to_string())
            .or_insert_with(|| TowerActivity::new(location, towers));

        tower.record_count = tower.record_count.saturating_add(1);
        let duration = if record.kind == RecordKind::Call {
            record.duration_seconds
        } else {
            0
        };
        tower.total_call_duration = tower.total_call_duration.saturating_add(duration);
        if let Some(a) = record.party_a() {
            tower.unique_a_parties.insert(a.to_string());
        }
        if let Some(b) = record.party_b() {
            tower.unique_b_parties.insert(b.to_string());
        }

        let hour = clock.local_hour(item.at) as usize;
        if let Some(slot) = tower.hourly.get_mut(hour) {
            slot.record_count = slot.record_count.saturating_add(1);
            slot.total_duration = slot.total_duration.saturating_add(duration);
        }

        tower.first_seen = Some(tower.first_seen.map_or(item.at, |t| t.min(item.at)));
        tower.last_seen = Some(tower.last_seen.map_or(item.at, |t| t.max(item.at)));
        tower.record_ids.push(record.id.clone());
    }

    log::debug!("tower activity over {} towers", activity.len());
    activity
}
