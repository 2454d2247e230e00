//! Location resolver — tower lookups, per-subscriber location timelines,
//! tower visits and the co-location index.
//!
//! RULES:
//!   - The tower table is fully materialised before resolution; no lookup
//!     happens per record against anything but the in-memory map.
//!   - An unknown or malformed tower id yields an event with
//!     `coordinate: None, address: None`. The visit still counts.
//!   - Dwell is the gap to the next located record of the same entity,
//!     capped. The last event of a timeline has no successor: dwell 0.

use crate::{
    clock::AnalysisClock,
    record::RecordKind,
    temporal_index::{TemporalIndex, TimedRecord},
    types::{EntityId, LocationId, RecordId, SourceId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// `None` unless both components are finite and in range.
    pub fn checked(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerInfo {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl TowerInfo {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::checked(self.lat, self.lon)
    }
}

/// Read-only `locationId → tower` table. May be partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TowerLookup(pub BTreeMap<LocationId, TowerInfo>);

impl TowerLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location_id: impl Into<LocationId>, info: TowerInfo) {
        self.0.insert(location_id.into(), info);
    }

    pub fn get(&self, location_id: &str) -> Option<&TowerInfo> {
        self.0.get(location_id)
    }

    pub fn coordinate(&self, location_id: &str) -> Option<Coordinate> {
        self.get(location_id).and_then(TowerInfo::coordinate)
    }

    pub fn address(&self, location_id: &str) -> Option<&str> {
        self.get(location_id).and_then(|t| t.address.as_deref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub entity: EntityId,
    pub record_id: RecordId,
    pub source_id: SourceId,
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    pub location_id: LocationId,
    pub coordinate: Option<Coordinate>,
    pub address: Option<String>,
    pub dwell_minutes: i64,
}

impl LocationEvent {
    pub fn is_resolved(&self) -> bool {
        self.coordinate.is_some()
    }
}

/// Ordered location events for one entity. Only records whose cell
/// belongs to `entity` are used.
pub fn resolve_timeline(
    entity: &str,
    history: &[TimedRecord<'_>],
    towers: &TowerLookup,
    dwell_cap_minutes: i64,
) -> Vec<LocationEvent> {
    let located: Vec<(&TimedRecord<'_>, &str)> = history
        .iter()
        .filter(|item| item.record.locates(entity))
        .filter_map(|item| item.record.location().map(|loc| (item, loc)))
        .collect();

    located
        .iter()
        .enumerate()
        .map(|(i, (item, location_id))| {
            let dwell_minutes = located
                .get(i + 1)
                .map(|(next, _)| (next.at - item.at).num_minutes().min(dwell_cap_minutes).max(0))
                .unwrap_or(0);
            LocationEvent {
                entity: entity.to_string(),
                record_id: item.record.id.clone(),
                source_id: item.record.source_id.clone(),
                kind: item.record.kind,
                timestamp: item.at,
                location_id: location_id.to_string(),
                coordinate: towers.coordinate(location_id),
                address: towers.address(location_id).map(str::to_string),
                dwell_minutes,
            }
        })
        .collect()
}

/// Timelines for every subscriber in the index that has at least one
/// located record.
pub fn resolve_all(
    subscribers: &TemporalIndex<'_>,
    towers: &TowerLookup,
    dwell_cap_minutes: i64,
) -> BTreeMap<EntityId, Vec<LocationEvent>> {
    let mut unresolved = 0usize;
    let timelines: BTreeMap<EntityId, Vec<LocationEvent>> = subscribers
        .iter()
        .map(|(entity, history)| (entity.clone(), resolve_timeline(entity, history, towers, dwell_cap_minutes)))
        .filter(|(_, events)| !events.is_empty())
        .inspect(|(_, events)| unresolved += events.iter().filter(|e| !e.is_resolved()).count())
        .collect();
    if unresolved > 0 {
        log::warn!("{unresolved} location events reference towers missing from the lookup");
    }
    timelines
}

// ── Tower visits ───────────────────────────────────────────────────────────

/// Consecutive events at one cell collapsed into a stay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerVisit {
    pub location_id: LocationId,
    pub address: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub arrival: DateTime<Utc>,
    /// Last event of the stay plus its dwell.
    pub departure: DateTime<Utc>,
    pub duration_minutes: i64,
    pub record_count: usize,
    pub kinds: BTreeSet<RecordKind>,
    pub source_ids: BTreeSet<SourceId>,
}

/// The tower travel path of one timeline.
pub fn tower_visits(events: &[LocationEvent]) -> Vec<TowerVisit> {
    let mut visits: Vec<TowerVisit> = Vec::new();
    for event in events {
        let departure = event.timestamp + Duration::minutes(event.dwell_minutes);
        match visits.last_mut() {
            Some(visit) if visit.location_id == event.location_id => {
                visit.departure = departure;
                visit.record_count += 1;
                visit.kinds.insert(event.kind);
                visit.source_ids.insert(event.source_id.clone());
            }
            _ => visits.push(TowerVisit {
                location_id: event.location_id.clone(),
                address: event.address.clone(),
                coordinate: event.coordinate,
                arrival: event.timestamp,
                departure,
                duration_minutes: 0,
                record_count: 1,
                kinds: BTreeSet::from([event.kind]),
                source_ids: BTreeSet::from([event.source_id.clone()]),
            }),
        }
    }
    for visit in &mut visits {
        visit.duration_minutes = (visit.departure - visit.arrival).num_minutes();
    }
    visits
}

// ── Co-location ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColocationPair {
    pub location_id: LocationId,
    pub bucket_start: DateTime<Utc>,
    /// `entity_a < entity_b`.
    pub entity_a: EntityId,
    pub entity_b: EntityId,
}

/// `locationId → bucket → entities present`, with buckets aligned to the
/// analysis clock.
#[derive(Debug, Clone)]
pub struct ColocationIndex {
    clock: AnalysisClock,
    bucket_minutes: i64,
    by_location: BTreeMap<LocationId, BTreeMap<i64, BTreeSet<EntityId>>>,
}

impl ColocationIndex {
    pub fn build(
        timelines: &BTreeMap<EntityId, Vec<LocationEvent>>,
        clock: AnalysisClock,
        bucket_minutes: i64,
    ) -> Self {
        let mut by_location: BTreeMap<LocationId, BTreeMap<i64, BTreeSet<EntityId>>> = BTreeMap::new();
        for (entity, events) in timelines {
            for event in events {
                by_location
                    .entry(event.location_id.clone())
                    .or_default()
                    .entry(clock.bucket(event.timestamp, bucket_minutes))
                    .or_default()
                    .insert(entity.clone());
            }
        }
        Self {
            clock,
            bucket_minutes,
            by_location,
        }
    }

    /// Every entity ever seen at `location_id`.
    pub fn visitors(&self, location_id: &str) -> BTreeSet<EntityId> {
        self.by_location
            .get(location_id)
            .map(|buckets| buckets.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Entities other than `entity` present at `location_id` in the bucket
    /// containing `at`.
    pub fn who_else_at(&self, location_id: &str, at: DateTime<Utc>, entity: &str) -> Vec<EntityId> {
        let bucket = self.clock.bucket(at, self.bucket_minutes);
        self.by_location
            .get(location_id)
            .and_then(|buckets| buckets.get(&bucket))
            .map(|present| present.iter().filter(|e| e.as_str() != entity).cloned().collect())
            .unwrap_or_default()
    }

    /// All pairs sharing a location and bucket, location then time order.
    pub fn candidate_pairs(&self) -> Vec<ColocationPair> {
        let mut pairs = Vec::new();
        for (location_id, buckets) in &self.by_location {
            for (bucket, present) in buckets.iter().filter(|(_, p)| p.len() > 1) {
                let bucket_start = self.clock.bucket_start(*bucket, self.bucket_minutes);
                let present: Vec<&EntityId> = present.iter().collect();
                for (i, a) in present.iter().enumerate() {
                    for b in &present[i + 1..] {
                        pairs.push(ColocationPair {
                            location_id: location_id.clone(),
                            bucket_start,
                            entity_a: (*a).clone(),
                            entity_b: (*b).clone(),
                        });
                    }
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_dhaka_to_chittagong() {
        let dhaka = Coordinate::checked(23.8103, 90.4125).unwrap();
        let ctg = Coordinate::checked(22.3569, 91.7832).unwrap();
        let km = haversine_km(dhaka, ctg);
        assert!((km - 214.0).abs() < 5.0, "got {km}");
        assert_eq!(haversine_km(dhaka, dhaka), 0.0);
    }

    #[test]
    fn out_of_range_coordinates_are_unresolved() {
        assert!(Coordinate::checked(91.0, 0.0).is_none());
        assert!(Coordinate::checked(0.0, f64::NAN).is_none());
        let mut towers = TowerLookup::new();
        towers.insert("BAD", TowerInfo { lat: 200.0, lon: 0.0, address: Some("nowhere".into()) });
        assert!(towers.coordinate("BAD").is_none());
        assert_eq!(towers.address("BAD"), Some("nowhere"));
    }
}
