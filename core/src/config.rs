//! Engine configuration.
//!
//! Every section has documented defaults and every field may be
//! overridden per invocation. `validate()` runs before a pass starts;
//! an invalid threshold aborts the pass before any record is read.

use crate::{
    clock::AnalysisClock,
    error::{AnalysisError, AnalysisResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub time: TimeConfig,
    pub graph: GraphConfig,
    pub chains: ChainConfig,
    pub fingerprint: FingerprintConfig,
    pub location: LocationConfig,
    pub anomaly: AnomalyConfig,
    pub execution: ExecutionConfig,
}

// ── Time ───────────────────────────────────────────────────────────

/// The zone used for parsing naive timestamps and for all hour/weekday
/// bucketing. Fixed offset, never inferred per record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub utc_offset_minutes: i32,
}

// ── Graph ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Above this many nodes the graph is flagged as trimmed for display.
    pub max_display_nodes: usize,
    /// Undirected degree at which a node is reported as a hub.
    pub hub_degree_threshold: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_display_nodes: 500,
            hub_degree_threshold: 10,
        }
    }
}

// ── Chains ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub gap_minutes: i64,
    /// Chains with fewer counterparties are dropped from the report.
    pub min_depth: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gap_minutes: 30,
            min_depth: 1,
        }
    }
}

// ── Fingerprints ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub top_locations: usize,
    /// Share of one direction needed to call an entity outgoing/incoming.
    pub directionality_threshold: f64,
    /// Share a time slot must exceed to be dominant.
    pub time_slot_threshold: f64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            top_locations: 5,
            directionality_threshold: 0.65,
            time_slot_threshold: 0.40,
        }
    }
}

// ── Location ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Dwell is the gap to the next located record, capped here.
    pub dwell_cap_minutes: i64,
    pub colocation_bucket_minutes: i64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            dwell_cap_minutes: 180,
            colocation_bucket_minutes: 5,
        }
    }
}

// ── Anomaly rules ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub device_swap: DeviceSwapConfig,
    pub impossible_travel: ImpossibleTravelConfig,
    pub burst: BurstConfig,
    pub dormancy: DormancyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSwapConfig {
    pub enabled: bool,
    pub window_hours: i64,
}

impl Default for DeviceSwapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpossibleTravelConfig {
    pub enabled: bool,
    pub max_speed_kmh: f64,
}

impl Default for ImpossibleTravelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_speed_kmh: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    pub enabled: bool,
    /// Flag hours above mean + k·stddev.
    pub k: f64,
    /// Entities with fewer active hours have no meaningful baseline.
    pub min_active_hours: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k: 3.0,
            min_active_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DormancyConfig {
    pub enabled: bool,
    pub threshold_days: i64,
    /// Interactions required before a gap for the entity to count as
    /// previously active.
    pub min_prior_interactions: usize,
}

impl Default for DormancyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_days: 90,
            min_prior_interactions: 3,
        }
    }
}

// ── Execution ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fan the independent stages out over scoped threads. Output is
    /// identical to the sequential pass.
    pub parallel: bool,
}

impl AnalysisConfig {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &str) -> AnalysisResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AnalysisError::ConfigLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let config: AnalysisConfig =
            serde_json::from_str(&content).map_err(|e| AnalysisError::ConfigLoad {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The clock described by `time`. Fails on an out-of-range offset.
    pub fn clock(&self) -> AnalysisResult<AnalysisClock> {
        AnalysisClock::with_offset_minutes(self.time.utc_offset_minutes).ok_or_else(|| {
            AnalysisError::invalid(
                "time.utc_offset_minutes",
                format!("{} is outside ±840", self.time.utc_offset_minutes),
            )
        })
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        self.clock()?;

        if self.chains.gap_minutes <= 0 {
            return Err(AnalysisError::invalid(
                "chains.gap_minutes",
                format!("must be positive, got {}", self.chains.gap_minutes),
            ));
        }
        if self.fingerprint.directionality_threshold <= 0.5
            || self.fingerprint.directionality_threshold > 1.0
        {
            return Err(AnalysisError::invalid(
                "fingerprint.directionality_threshold",
                format!(
                    "must be in (0.5, 1.0], got {}",
                    self.fingerprint.directionality_threshold
                ),
            ));
        }
        if self.fingerprint.time_slot_threshold <= 0.0 || self.fingerprint.time_slot_threshold > 1.0
        {
            return Err(AnalysisError::invalid(
                "fingerprint.time_slot_threshold",
                format!(
                    "must be in (0.0, 1.0], got {}",
                    self.fingerprint.time_slot_threshold
                ),
            ));
        }
        if self.location.dwell_cap_minutes < 0 {
            return Err(AnalysisError::invalid(
                "location.dwell_cap_minutes",
                format!("must not be negative, got {}", self.location.dwell_cap_minutes),
            ));
        }
        if self.location.colocation_bucket_minutes <= 0 {
            return Err(AnalysisError::invalid(
                "location.colocation_bucket_minutes",
                format!(
                    "must be positive, got {}",
                    self.location.colocation_bucket_minutes
                ),
            ));
        }
        if self.anomaly.device_swap.window_hours <= 0 {
            return Err(AnalysisError::invalid(
                "anomaly.device_swap.window_hours",
                format!("must be positive, got {}", self.anomaly.device_swap.window_hours),
            ));
        }
        // Written as a negated comparison so NaN is rejected too.
        if !(self.anomaly.impossible_travel.max_speed_kmh > 0.0) {
            return Err(AnalysisError::invalid(
                "anomaly.impossible_travel.max_speed_kmh",
                format!(
                    "must be positive, got {}",
                    self.anomaly.impossible_travel.max_speed_kmh
                ),
            ));
        }
        if !(self.anomaly.burst.k >= 0.0) || !self.anomaly.burst.k.is_finite() {
            return Err(AnalysisError::invalid(
                "anomaly.burst.k",
                format!("must be a finite non-negative number, got {}", self.anomaly.burst.k),
            ));
        }
        if self.anomaly.burst.min_active_hours < 2 {
            return Err(AnalysisError::invalid(
                "anomaly.burst.min_active_hours",
                format!(
                    "must be at least 2, got {}",
                    self.anomaly.burst.min_active_hours
                ),
            ));
        }
        if self.anomaly.dormancy.threshold_days <= 0 {
            return Err(AnalysisError::invalid(
                "anomaly.dormancy.threshold_days",
                format!("must be positive, got {}", self.anomaly.dormancy.threshold_days),
            ));
        }

        let max_minutes = MAX_SPAN_DAYS * 24 * 60;
        at_most("chains.gap_minutes", self.chains.gap_minutes, max_minutes, "minutes")?;
        at_most("location.dwell_cap_minutes", self.location.dwell_cap_minutes, max_minutes, "minutes")?;
        at_most(
            "location.colocation_bucket_minutes",
            self.location.colocation_bucket_minutes,
            max_minutes,
            "minutes",
        )?;
        at_most(
            "anomaly.device_swap.window_hours",
            self.anomaly.device_swap.window_hours,
            MAX_SPAN_DAYS * 24,
            "hours",
        )?;
        at_most(
            "anomaly.dormancy.threshold_days",
            self.anomaly.dormancy.threshold_days,
            MAX_SPAN_DAYS,
            "days",
        )?;
        Ok(())
    }
}

/// Upper bound on every time-span threshold: ten years.
const MAX_SPAN_DAYS: i64 = 10 * 366;

fn at_most(field: &str, value: i64, max: i64, unit: &str) -> AnalysisResult<()> {
    if value > max {
        return Err(AnalysisError::invalid(
            field,
            format!("must be at most {max} {unit}, got {value}"),
        ));
    }
    Ok(())
}
