//! The four anomaly rules. Each exposes a `scan` over exactly the
//! structure it needs so it can be exercised without a full pass.

use crate::{
    anomaly_detector::{AnomalyCategory, AnomalyInput, AnomalyReport, AnomalyRule, Evidence, Severity},
    clock::AnalysisClock,
    device_association::{DeviceAssociationTable, Observation},
    fingerprint::{BehavioralFingerprint, TimeSlot},
    location_resolver::{haversine_km, LocationEvent},
    record::RecordKind,
    temporal_index::{TemporalIndex, TimedRecord},
    types::{EntityId, EntityKind},
};
use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};

// ── Device swap ────────────────────────────────────────────────────────────

/// A SIM seen in a different device (or a device with a different SIM)
/// than its previous observation, within `window_hours` of it.
pub struct DeviceSwapRule {
    window: Duration,
}

impl DeviceSwapRule {
    pub fn new(window_hours: i64) -> Self {
        Self {
            window: Duration::try_hours(window_hours).unwrap_or(Duration::MAX),
        }
    }

    pub fn scan(&self, associations: &DeviceAssociationTable) -> Vec<AnomalyReport> {
        let sims = associations
            .by_sim
            .iter()
            .filter_map(|(sim, obs)| self.check(sim, EntityKind::Sim, obs));
        let devices = associations
            .by_device
            .iter()
            .filter_map(|(device, obs)| self.check(device, EntityKind::Device, obs));
        sims.chain(devices).collect()
    }

    fn check(&self, entity: &str, kind: EntityKind, observations: &[Observation]) -> Option<AnomalyReport> {
        let swaps: Vec<(&Observation, &Observation)> = observations
            .windows(2)
            .filter(|w| w[0].counterpart != w[1].counterpart && w[1].at - w[0].at <= self.window)
            .map(|w| (&w[0], &w[1]))
            .collect();
        if swaps.is_empty() {
            return None;
        }

        let counterparts: BTreeSet<&str> = swaps
            .iter()
            .flat_map(|(a, b)| [a.counterpart.as_str(), b.counterpart.as_str()])
            .collect();
        let severity = match swaps.len() {
            1..=2 => Severity::Low,
            3..=5 => Severity::Medium,
            _ => Severity::High,
        };
        let (holder, held) = match kind {
            EntityKind::Device => ("Device", "SIMs"),
            _ => ("SIM", "devices"),
        };
        let mut record_ids = Vec::new();
        for (a, b) in &swaps {
            for id in [&a.record_id, &b.record_id] {
                if !record_ids.contains(id) {
                    record_ids.push(id.clone());
                }
            }
        }

        Some(AnomalyReport {
            entity: entity.to_string(),
            entity_kind: kind,
            category: AnomalyCategory::DeviceSwap,
            severity,
            description: format!(
                "{holder} {entity} switched between {} {held} {} time(s) within {}h",
                counterparts.len(),
                swaps.len(),
                self.window.num_hours()
            ),
            evidence: Evidence {
                record_ids,
                timestamps: swaps.iter().map(|(_, b)| b.at).collect(),
                details: serde_json::json!({
                    "counterparts": counterparts,
                    "swaps": swaps.len(),
                    "window_hours": self.window.num_hours(),
                }),
            },
        })
    }
}

impl AnomalyRule for DeviceSwapRule {
    fn name(&self) -> &'static str {
        AnomalyCategory::DeviceSwap.as_str()
    }

    fn evaluate(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport> {
        self.scan(input.associations)
    }
}

// ── Impossible travel ──────────────────────────────────────────────────────

/// Consecutive resolved events of one entity implying a speed above
/// `max_speed_kmh`. Unresolved events are stepped over.
pub struct ImpossibleTravelRule {
    max_speed_kmh: f64,
}

impl ImpossibleTravelRule {
    pub fn new(max_speed_kmh: f64) -> Self {
        Self { max_speed_kmh }
    }

    pub fn scan(&self, timelines: &BTreeMap<EntityId, Vec<LocationEvent>>) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        for (entity, events) in timelines {
            let resolved: Vec<_> = events
                .iter()
                .filter_map(|e| e.coordinate.map(|c| (e, c)))
                .collect();
            for pair in resolved.windows(2) {
                let ((from, from_at), (to, to_at)) = (pair[0], pair[1]);
                let distance_km = haversine_km(from_at, to_at);
                if distance_km <= 0.0 {
                    continue;
                }
                let elapsed_secs = (to.timestamp - from.timestamp).num_seconds().max(0);
                let speed_kmh = if elapsed_secs == 0 {
                    f64::INFINITY
                } else {
                    distance_km / (elapsed_secs as f64 / 3600.0)
                };
                if speed_kmh <= self.max_speed_kmh {
                    continue;
                }

                let ratio = speed_kmh / self.max_speed_kmh;
                let severity = if ratio > 3.0 {
                    Severity::High
                } else if ratio > 1.5 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                let speed_text = if speed_kmh.is_finite() {
                    format!("{speed_kmh:.0} km/h")
                } else {
                    "no elapsed time".to_string()
                };
                reports.push(AnomalyReport {
                    entity: entity.clone(),
                    entity_kind: EntityKind::Number,
                    category: AnomalyCategory::ImpossibleTravel,
                    severity,
                    description: format!(
                        "{entity} moved {distance_km:.1} km from {} to {} in {} min ({speed_text})",
                        from.location_id,
                        to.location_id,
                        elapsed_secs / 60
                    ),
                    evidence: Evidence {
                        record_ids: vec![from.record_id.clone(), to.record_id.clone()],
                        timestamps: vec![from.timestamp, to.timestamp],
                        details: serde_json::json!({
                            "from_location": from.location_id,
                            "to_location": to.location_id,
                            "distance_km": distance_km,
                            "elapsed_seconds": elapsed_secs,
                            "speed_kmh": speed_kmh.is_finite().then_some(speed_kmh),
                            "max_speed_kmh": self.max_speed_kmh,
                        }),
                    },
                });
            }
        }
        reports
    }
}

impl AnomalyRule for ImpossibleTravelRule {
    fn name(&self) -> &'static str {
        AnomalyCategory::ImpossibleTravel.as_str()
    }

    fn evaluate(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport> {
        self.scan(input.timelines)
    }
}

// ── Burst activity ─────────────────────────────────────────────────────────

/// Hours whose interaction count exceeds mean + k·stddev of the entity's
/// own active hours.
pub struct BurstRule {
    k: f64,
    min_active_hours: usize,
}

fn interactions<'r, 'a>(history: &'r [TimedRecord<'a>]) -> impl Iterator<Item = &'r TimedRecord<'a>> {
    history
        .iter()
        .filter(|item| item.record.kind != RecordKind::TowerPresence)
}

impl BurstRule {
    pub fn new(k: f64, min_active_hours: usize) -> Self {
        Self { k, min_active_hours }
    }

    pub fn scan(
        &self,
        index: &TemporalIndex<'_>,
        clock: &AnalysisClock,
        fingerprints: &BTreeMap<EntityId, BehavioralFingerprint>,
    ) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        for (entity, history) in index.iter() {
            let mut hours: BTreeMap<i64, Vec<&TimedRecord<'_>>> = BTreeMap::new();
            for item in interactions(history) {
                hours.entry(clock.bucket(item.at, 60)).or_default().push(item);
            }
            if hours.len() < self.min_active_hours {
                continue;
            }

            let n = hours.len() as f64;
            let mean = hours.values().map(|v| v.len() as f64).sum::<f64>() / n;
            let variance = hours
                .values()
                .map(|v| (v.len() as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            let stddev = variance.sqrt();
            if stddev <= 0.0 {
                continue;
            }
            let threshold = mean + self.k * stddev;
            let slot = fingerprints
                .get(entity)
                .map(|fp| fp.dominant_time_slot)
                .unwrap_or(TimeSlot::NotApplicable);

            for (bucket, items) in hours.iter().filter(|(_, v)| v.len() as f64 > threshold) {
                let count = items.len();
                let z = (count as f64 - mean) / stddev;
                let severity = if z >= 2.0 * self.k {
                    Severity::High
                } else if z >= 1.5 * self.k {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                let hour_start = clock.bucket_start(*bucket, 60);
                reports.push(AnomalyReport {
                    entity: entity.clone(),
                    entity_kind: EntityKind::Number,
                    category: AnomalyCategory::BurstActivity,
                    severity,
                    description: format!(
                        "{entity} had {count} interactions in the hour from {} (typical {mean:.1} ± {stddev:.1})",
                        clock.format(hour_start)
                    ),
                    evidence: Evidence {
                        record_ids: items.iter().map(|i| i.record.id.clone()).collect(),
                        timestamps: vec![hour_start],
                        details: serde_json::json!({
                            "count": count,
                            "mean": mean,
                            "stddev": stddev,
                            "z_score": z,
                            "k": self.k,
                            "active_hours": hours.len(),
                            "usual_time_slot": slot.as_str(),
                        }),
                    },
                });
            }
        }
        reports
    }
}

impl AnomalyRule for BurstRule {
    fn name(&self) -> &'static str {
        AnomalyCategory::BurstActivity.as_str()
    }

    fn evaluate(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport> {
        self.scan(input.party_index, input.clock, input.fingerprints)
    }
}

// ── Dormant reactivation ───────────────────────────────────────────────────

/// A silence longer than `threshold_days` after at least
/// `min_prior_interactions` interactions.
pub struct DormantReactivationRule {
    threshold: Duration,
    min_prior_interactions: usize,
}

impl DormantReactivationRule {
    pub fn new(threshold_days: i64, min_prior_interactions: usize) -> Self {
        Self {
            threshold: Duration::try_days(threshold_days).unwrap_or(Duration::MAX),
            min_prior_interactions,
        }
    }

    pub fn scan(&self, index: &TemporalIndex<'_>) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        for (entity, history) in index.iter() {
            let active: Vec<&TimedRecord<'_>> = interactions(history).collect();
            for (i, pair) in active.windows(2).enumerate() {
                let (before, after) = (pair[0], pair[1]);
                let gap = after.at - before.at;
                let prior = i + 1;
                if gap <= self.threshold || prior < self.min_prior_interactions {
                    continue;
                }
                let severity = if gap >= self.threshold.checked_mul(2).unwrap_or(Duration::MAX) {
                    Severity::High
                } else {
                    Severity::Medium
                };
                reports.push(AnomalyReport {
                    entity: entity.clone(),
                    entity_kind: EntityKind::Number,
                    category: AnomalyCategory::DormantReactivation,
                    severity,
                    description: format!(
                        "{entity} reactivated after {} days of silence",
                        gap.num_days()
                    ),
                    evidence: Evidence {
                        record_ids: vec![before.record.id.clone(), after.record.id.clone()],
                        timestamps: vec![before.at, after.at],
                        details: serde_json::json!({
                            "gap_days": gap.num_days(),
                            "threshold_days": self.threshold.num_days(),
                            "prior_interactions": prior,
                        }),
                    },
                });
            }
        }
        reports
    }
}

impl AnomalyRule for DormantReactivationRule {
    fn name(&self) -> &'static str {
        AnomalyCategory::DormantReactivation.as_str()
    }

    fn evaluate(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport> {
        self.scan(input.party_index)
    }
}
