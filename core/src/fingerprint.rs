//! Fingerprint engine — statistical behavioural signature per entity.
//!
//! RULES:
//!   - Hour and weekday come from the analysis clock, never the host zone.
//!   - An entity with no interactions gets all-zero histograms and
//!     `NotApplicable` classifications. Nothing here divides by zero.
//!   - Tower-presence records are not interactions; they only feed the
//!     top-location ranking.

use crate::{
    clock::AnalysisClock,
    config::FingerprintConfig,
    location_resolver::TowerLookup,
    record::{Direction, RecordKind},
    temporal_index::{TemporalIndex, TimedRecord},
    types::{EntityId, EntityKind, LocationId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directionality {
    Outgoing,
    Incoming,
    Balanced,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityFocus {
    Call,
    Sms,
    Mixed,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
    Night,
    Varied,
    NotApplicable,
}

impl TimeSlot {
    const BUCKETS: [TimeSlot; 4] = [Self::Morning, Self::Afternoon, Self::Evening, Self::Night];

    /// Morning 06–12, Afternoon 12–17, Evening 17–22, Night 22–06.
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Varied => "varied",
            Self::NotApplicable => "n/a",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLocation {
    pub location_id: LocationId,
    pub count: u32,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralFingerprint {
    pub entity: EntityId,
    pub entity_kind: EntityKind,
    pub total_interactions: u32,
    pub call_count: u32,
    pub sms_count: u32,
    pub hourly: [u32; 24],
    /// Monday = 0.
    pub daily: [u32; 7],
    /// Mean over calls with non-zero duration; 0.0 when there are none.
    pub avg_call_duration_seconds: f64,
    pub call_directionality: Directionality,
    pub sms_directionality: Directionality,
    pub primary_activity_focus: ActivityFocus,
    pub dominant_time_slot: TimeSlot,
    pub top_locations: Vec<TopLocation>,
}

impl BehavioralFingerprint {
    pub fn empty(entity: &str, entity_kind: EntityKind) -> Self {
        Self {
            entity: entity.to_string(),
            entity_kind,
            total_interactions: 0,
            call_count: 0,
            sms_count: 0,
            hourly: [0; 24],
            daily: [0; 7],
            avg_call_duration_seconds: 0.0,
            call_directionality: Directionality::NotApplicable,
            sms_directionality: Directionality::NotApplicable,
            primary_activity_focus: ActivityFocus::NotApplicable,
            dominant_time_slot: TimeSlot::NotApplicable,
            top_locations: Vec::new(),
        }
    }
}

#[derive(Default)]
struct DirectionTally {
    outgoing: u32,
    incoming: u32,
}

impl DirectionTally {
    fn add(&mut self, direction: Direction) {
        match direction {
            Direction::Outgoing => self.outgoing += 1,
            Direction::Incoming => self.incoming += 1,
            Direction::Unknown => {}
        }
    }

    fn classify(&self, threshold: f64) -> Directionality {
        let total = self.outgoing + self.incoming;
        if total == 0 {
            return Directionality::NotApplicable;
        }
        let total = f64::from(total);
        if f64::from(self.outgoing) / total >= threshold {
            Directionality::Outgoing
        } else if f64::from(self.incoming) / total >= threshold {
            Directionality::Incoming
        } else {
            Directionality::Balanced
        }
    }
}

fn activity_focus(calls: u32, sms: u32, threshold: f64) -> ActivityFocus {
    let total = calls + sms;
    if total == 0 {
        return ActivityFocus::NotApplicable;
    }
    let total = f64::from(total);
    if f64::from(calls) / total >= threshold {
        ActivityFocus::Call
    } else if f64::from(sms) / total >= threshold {
        ActivityFocus::Sms
    } else {
        ActivityFocus::Mixed
    }
}

fn dominant_slot(hourly: &[u32; 24], threshold: f64) -> TimeSlot {
    let total: u32 = hourly.iter().sum();
    if total == 0 {
        return TimeSlot::NotApplicable;
    }
    let mut counts = [0u32; 4];
    for (hour, count) in hourly.iter().enumerate() {
        let slot = TimeSlot::for_hour(hour as u32);
        if let Some(i) = TimeSlot::BUCKETS.iter().position(|s| *s == slot) {
            counts[i] += count;
        }
    }
    // Earliest slot wins a tie.
    let (best, best_count) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc });
    if f64::from(best_count) / f64::from(total) > threshold {
        TimeSlot::BUCKETS[best]
    } else {
        TimeSlot::Varied
    }
}

pub fn compute_fingerprint(
    entity: &str,
    entity_kind: EntityKind,
    history: &[TimedRecord<'_>],
    clock: &AnalysisClock,
    config: &FingerprintConfig,
    towers: &TowerLookup,
) -> BehavioralFingerprint {
    let mut fp = BehavioralFingerprint::empty(entity, entity_kind);
    let mut call_dir = DirectionTally::default();
    let mut sms_dir = DirectionTally::default();
    let mut duration_sum = 0u64;
    let mut timed_calls = 0u64;
    let mut locations: BTreeMap<&str, u32> = BTreeMap::new();

    for item in history {
        let record = item.record;
        if record.locates(entity) {
            if let Some(location) = record.location() {
                *locations.entry(location).or_default() += 1;
            }
        }
        if record.kind == RecordKind::TowerPresence {
            continue;
        }

        fp.total_interactions += 1;
        fp.hourly[clock.local_hour(item.at) as usize] += 1;
        fp.daily[clock.local_weekday(item.at) as usize] += 1;

        match record.kind {
            RecordKind::Call => {
                fp.call_count += 1;
                call_dir.add(record.direction_for(entity));
                if record.duration_seconds > 0 {
                    duration_sum = duration_sum.saturating_add(record.duration_seconds);
                    timed_calls += 1;
                }
            }
            RecordKind::Sms => {
                fp.sms_count += 1;
                sms_dir.add(record.direction_for(entity));
            }
            RecordKind::Transaction | RecordKind::TowerPresence => {}
        }
    }

    if timed_calls > 0 {
        fp.avg_call_duration_seconds = duration_sum as f64 / timed_calls as f64;
    }
    fp.call_directionality = call_dir.classify(config.directionality_threshold);
    fp.sms_directionality = sms_dir.classify(config.directionality_threshold);
    fp.primary_activity_focus =
        activity_focus(fp.call_count, fp.sms_count, config.directionality_threshold);
    fp.dominant_time_slot = dominant_slot(&fp.hourly, config.time_slot_threshold);

    let mut ranked: Vec<(&str, u32)> = locations.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    fp.top_locations = ranked
        .into_iter()
        .take(config.top_locations)
        .map(|(location_id, count)| TopLocation {
            location_id: location_id.to_string(),
            count,
            address: towers.address(location_id).map(str::to_string),
        })
        .collect();

    fp
}

/// Fingerprints for every entity in `index`, keyed by entity.
pub fn compute_all(
    index: &TemporalIndex<'_>,
    entity_kind: EntityKind,
    clock: &AnalysisClock,
    config: &FingerprintConfig,
    towers: &TowerLookup,
) -> BTreeMap<EntityId, BehavioralFingerprint> {
    index
        .iter()
        .map(|(entity, history)| {
            (
                entity.clone(),
                compute_fingerprint(entity, entity_kind, history, clock, config, towers),
            )
        })
        .collect()
}

// ── Comparison ─────────────────────────────────────────────────────────────

/// Per-metric similarity of two fingerprints. Every component is in
/// [0, 1]; a metric with nothing to compare on either side scores 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintSimilarity {
    pub hourly_cosine: f64,
    pub daily_cosine: f64,
    pub call_directionality_match: f64,
    pub sms_directionality_match: f64,
    pub time_slot_match: f64,
    pub top_location_jaccard: f64,
    pub avg_duration_ratio: f64,
    /// Mean of the components above.
    pub overall: f64,
}

fn cosine(a: &[u32], b: &[u32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm = |v: &[u32]| v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom).clamp(0.0, 1.0)
    }
}

fn label_match<T: PartialEq>(a: T, b: T, not_applicable: T) -> f64 {
    if a == not_applicable || b == not_applicable {
        0.0
    } else if a == b {
        1.0
    } else {
        0.0
    }
}

pub fn compare_fingerprints(a: &BehavioralFingerprint, b: &BehavioralFingerprint) -> FingerprintSimilarity {
    let locs_a: BTreeSet<&str> = a.top_locations.iter().map(|l| l.location_id.as_str()).collect();
    let locs_b: BTreeSet<&str> = b.top_locations.iter().map(|l| l.location_id.as_str()).collect();
    let union = locs_a.union(&locs_b).count();
    let top_location_jaccard = if union == 0 {
        0.0
    } else {
        locs_a.intersection(&locs_b).count() as f64 / union as f64
    };

    let (da, db) = (a.avg_call_duration_seconds, b.avg_call_duration_seconds);
    let avg_duration_ratio = if da > 0.0 && db > 0.0 { da.min(db) / da.max(db) } else { 0.0 };

    let mut sim = FingerprintSimilarity {
        hourly_cosine: cosine(&a.hourly, &b.hourly),
        daily_cosine: cosine(&a.daily, &b.daily),
        call_directionality_match: label_match(
            a.call_directionality,
            b.call_directionality,
            Directionality::NotApplicable,
        ),
        sms_directionality_match: label_match(
            a.sms_directionality,
            b.sms_directionality,
            Directionality::NotApplicable,
        ),
        time_slot_match: label_match(a.dominant_time_slot, b.dominant_time_slot, TimeSlot::NotApplicable),
        top_location_jaccard,
        avg_duration_ratio,
        overall: 0.0,
    };
    let components = [
        sim.hourly_cosine,
        sim.daily_cosine,
        sim.call_directionality_match,
        sim.sms_directionality_match,
        sim.time_slot_match,
        sim.top_location_jaccard,
        sim.avg_duration_ratio,
    ];
    sim.overall = components.iter().sum::<f64>() / components.len() as f64;
    sim
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_boundaries() {
        assert_eq!(TimeSlot::for_hour(5), TimeSlot::Night);
        assert_eq!(TimeSlot::for_hour(6), TimeSlot::Morning);
        assert_eq!(TimeSlot::for_hour(12), TimeSlot::Afternoon);
        assert_eq!(TimeSlot::for_hour(17), TimeSlot::Evening);
        assert_eq!(TimeSlot::for_hour(22), TimeSlot::Night);
    }

    #[test]
    fn varied_when_no_slot_exceeds_threshold() {
        let mut hourly = [0u32; 24];
        hourly[8] = 3; // morning
        hourly[13] = 3; // afternoon
        hourly[19] = 2; // evening
        hourly[23] = 2; // night
        assert_eq!(dominant_slot(&hourly, 0.40), TimeSlot::Varied);
        hourly[8] = 10;
        assert_eq!(dominant_slot(&hourly, 0.40), TimeSlot::Morning);
    }

    #[test]
    fn directionality_threshold_is_inclusive() {
        let tally = DirectionTally { outgoing: 13, incoming: 7 };
        assert_eq!(tally.classify(0.65), Directionality::Outgoing);
        let tally = DirectionTally { outgoing: 6, incoming: 4 };
        assert_eq!(tally.classify(0.65), Directionality::Balanced);
        let tally = DirectionTally { outgoing: 1, incoming: 9 };
        assert_eq!(tally.classify(0.65), Directionality::Incoming);
    }
}
