//! Anomaly detector — rule registry and report types.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. DeviceSwap
//!   2. ImpossibleTravel
//!   3. BurstActivity
//!   4. DormantReactivation
//!
//! RULES:
//!   - Every rule implements AnomalyRule and reads the whole pass input.
//!   - No rule sees another rule's findings; one rule firing never
//!     suppresses another.
//!   - Reports are derived values. The detector keeps no state between
//!     passes.

use crate::{
    anomaly_rules::{BurstRule, DeviceSwapRule, DormantReactivationRule, ImpossibleTravelRule},
    clock::AnalysisClock,
    config::AnomalyConfig,
    device_association::DeviceAssociationTable,
    fingerprint::BehavioralFingerprint,
    location_resolver::LocationEvent,
    temporal_index::TemporalIndex,
    types::{EntityId, EntityKind, RecordId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    DeviceSwap,
    ImpossibleTravel,
    BurstActivity,
    DormantReactivation,
}

impl AnomalyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceSwap => "device_swap",
            Self::ImpossibleTravel => "impossible_travel",
            Self::BurstActivity => "burst_activity",
            Self::DormantReactivation => "dormant_reactivation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// What a report points back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub record_ids: Vec<RecordId>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub details: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub entity: EntityId,
    pub entity_kind: EntityKind,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub description: String,
    pub evidence: Evidence,
}

/// Everything the rules may read. All borrowed from the pass.
pub struct AnomalyInput<'a> {
    pub party_index: &'a TemporalIndex<'a>,
    pub associations: &'a DeviceAssociationTable,
    pub timelines: &'a BTreeMap<EntityId, Vec<LocationEvent>>,
    pub fingerprints: &'a BTreeMap<EntityId, BehavioralFingerprint>,
    pub clock: &'a AnalysisClock,
}

/// The contract every anomaly rule must fulfil.
pub trait AnomalyRule: Send + Sync {
    /// Unique stable name for this rule.
    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport>;
}

pub struct AnomalyDetector {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register every enabled rule in the documented order.
    pub fn from_config(config: &AnomalyConfig) -> Self {
        let mut detector = Self::new();
        if config.device_swap.enabled {
            detector.register(Box::new(DeviceSwapRule::new(config.device_swap.window_hours)));
        }
        if config.impossible_travel.enabled {
            detector.register(Box::new(ImpossibleTravelRule::new(
                config.impossible_travel.max_speed_kmh,
            )));
        }
        if config.burst.enabled {
            detector.register(Box::new(BurstRule::new(config.burst.k, config.burst.min_active_hours)));
        }
        if config.dormancy.enabled {
            detector.register(Box::new(DormantReactivationRule::new(
                config.dormancy.threshold_days,
                config.dormancy.min_prior_interactions,
            )));
        }
        detector
    }

    pub fn register(&mut self, rule: Box<dyn AnomalyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule over the full input. Output order is entity,
    /// category, first evidence timestamp, description.
    pub fn detect(&self, input: &AnomalyInput<'_>) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        for rule in &self.rules {
            let found = rule.evaluate(input);
            log::debug!("anomaly rule {} produced {} reports", rule.name(), found.len());
            reports.extend(found);
        }
        sort_reports(&mut reports);
        reports
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sort_reports(reports: &mut [AnomalyReport]) {
    reports.sort_by(|a, b| {
        a.entity
            .cmp(&b.entity)
            .then(a.category.cmp(&b.category))
            .then(a.evidence.timestamps.first().cmp(&b.evidence.timestamps.first()))
            .then(a.description.cmp(&b.description))
    });
}
