//! The analysis engine — one complete pass over a record snapshot.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Validate filter (configuration was validated in `new`)
//!   2. Filter the snapshot
//!   3. Parse timestamps once; build party / subscriber / device / SIM indices
//!   4. Graph builder
//!   5. Chain detector
//!   6. Fingerprint engine      (numbers, devices, SIMs)
//!   7. Location resolver       (timelines, tower visits, co-location,
//!                               device associations, tower activity)
//!   8. Anomaly rules           (registration order, see anomaly_detector.rs)
//!   9. Cross-source links      (over the filter's source selection)
//!  10. Content classification  (only when a classifier is attached)
//!
//! RULES:
//!   - Stages 4–7 read only the indices and the snapshot. With
//!     `execution.parallel` they run on scoped threads; the report is
//!     identical to the sequential pass.
//!   - Per-record faults are counted in PassDiagnostics, never raised.
//!   - A pass either returns a complete report or an error; callers swap
//!     reports whole.

use crate::{
    anomaly_detector::{AnomalyDetector, AnomalyInput, AnomalyReport, AnomalyRule},
    chain_detector::{count_clamped_calls, detect_all, ConversationChain},
    classification::{classify_messages, ClassificationOutcome, ContentClassifier},
    clock::AnalysisClock,
    config::AnalysisConfig,
    device_association::DeviceAssociationTable,
    error::{AnalysisError, AnalysisResult},
    filter::RecordFilter,
    fingerprint::{compute_all, BehavioralFingerprint},
    graph_builder::{EntityGraph, GraphBuildOptions, GraphBuilder, GraphDiagnostics},
    link_analysis::{link_analysis, LinkAnalysisResult},
    location_resolver::{resolve_all, tower_visits, ColocationIndex, ColocationPair, LocationEvent, TowerLookup, TowerVisit},
    record::InteractionRecord,
    temporal_index::{IndexDiagnostics, TemporalIndex, TimedRecord},
    timeline::{unified_timeline, TimelineEvent, TimelineQuery},
    tower_activity::{tower_activity, TowerActivity},
    types::{EntityId, EntityKind, LocationId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassDiagnostics {
    pub records_in: usize,
    pub filtered_out: usize,
    /// Dropped by a date-bounded filter because the timestamp was unreadable.
    pub filter_unparsable_timestamps: usize,
    pub analysed: usize,
    /// Excluded from every time-dependent stage.
    pub unparsable_timestamps: usize,
    pub party_index: IndexDiagnostics,
    pub graph: GraphDiagnostics,
    /// Calls whose end time saturated because the duration was out of range.
    pub clamped_call_durations: usize,
    pub unresolved_location_events: usize,
    pub anomaly_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub graph: EntityGraph,
    pub graph_trimmed: bool,
    pub hubs: Vec<EntityId>,
    pub chains: Vec<ConversationChain>,
    pub fingerprints: BTreeMap<EntityId, BehavioralFingerprint>,
    pub device_fingerprints: BTreeMap<EntityId, BehavioralFingerprint>,
    pub sim_fingerprints: BTreeMap<EntityId, BehavioralFingerprint>,
    pub location_events: BTreeMap<EntityId, Vec<LocationEvent>>,
    pub tower_visits: BTreeMap<EntityId, Vec<TowerVisit>>,
    pub colocations: Vec<ColocationPair>,
    pub device_associations: DeviceAssociationTable,
    pub tower_activity: BTreeMap<LocationId, TowerActivity>,
    pub anomalies: Vec<AnomalyReport>,
    pub links: Vec<LinkAnalysisResult>,
    pub content: ClassificationOutcome,
    pub diagnostics: PassDiagnostics,
}

struct Indices<'a> {
    party: TemporalIndex<'a>,
    subscriber: TemporalIndex<'a>,
    device: TemporalIndex<'a>,
    sim: TemporalIndex<'a>,
}

struct FingerprintSet {
    numbers: BTreeMap<EntityId, BehavioralFingerprint>,
    devices: BTreeMap<EntityId, BehavioralFingerprint>,
    sims: BTreeMap<EntityId, BehavioralFingerprint>,
}

struct LocationSet {
    timelines: BTreeMap<EntityId, Vec<LocationEvent>>,
    visits: BTreeMap<EntityId, Vec<TowerVisit>>,
    colocations: Vec<ColocationPair>,
    associations: DeviceAssociationTable,
    towers: BTreeMap<LocationId, TowerActivity>,
}

pub struct AnalysisEngine {
    config: AnalysisConfig,
    clock: AnalysisClock,
    detector: AnomalyDetector,
    graph_options: GraphBuildOptions,
    classifier: Option<Box<dyn ContentClassifier>>,
}

impl AnalysisEngine {
    /// Validates `config` and registers the enabled anomaly rules.
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate()?;
        let clock = config.clock()?;
        let detector = AnomalyDetector::from_config(&config.anomaly);
        Ok(Self {
            config,
            clock,
            detector,
            graph_options: GraphBuildOptions::default(),
            classifier: None,
        })
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_graph_options(mut self, options: GraphBuildOptions) -> Self {
        self.graph_options = options;
        self
    }

    /// Append a rule after the built-in ones.
    pub fn register_rule(&mut self, rule: Box<dyn AnomalyRule>) {
        self.detector.register(rule);
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn clock(&self) -> AnalysisClock {
        self.clock
    }

    /// One full pass. Nothing from an earlier pass is reused.
    pub fn run(
        &self,
        records: &[InteractionRecord],
        towers: &TowerLookup,
        filter: &RecordFilter,
    ) -> AnalysisResult<AnalysisReport> {
        filter.validate()?;

        let filtered = filter.apply(records, &self.clock);
        let (timed, undated) = TimedRecord::partition(filtered.records.iter().copied(), &self.clock);
        if !undated.is_empty() {
            log::warn!(
                "{} records with unreadable timestamps excluded from time-dependent analysis",
                undated.len()
            );
        }

        let clamped_calls = count_clamped_calls(&timed);
        if clamped_calls > 0 {
            log::warn!("{clamped_calls} calls carry durations past the representable end of time; end times clamped");
        }

        let indices = Indices {
            party: TemporalIndex::by_party(&timed),
            subscriber: TemporalIndex::by_subscriber(&timed),
            device: TemporalIndex::by_device(&timed),
            sim: TemporalIndex::by_sim(&timed),
        };
        log::debug!(
            "indexed {} parties, {} devices, {} SIMs",
            indices.party.len(),
            indices.device.len(),
            indices.sim.len()
        );

        let ((graph, graph_diagnostics), chains, fingerprints, locations) = if self.config.execution.parallel {
            self.fan_out_parallel(&timed, &undated, &indices, towers)?
        } else {
            (
                self.graph_stage(&timed, &undated),
                self.chain_stage(&indices),
                self.fingerprint_stage(&indices, towers),
                self.location_stage(&timed, &indices, towers),
            )
        };

        let anomalies = self.detector.detect(&AnomalyInput {
            party_index: &indices.party,
            associations: &locations.associations,
            timelines: &locations.timelines,
            fingerprints: &fingerprints.numbers,
            clock: &self.clock,
        });

        let links = link_analysis(filtered.records.iter().copied(), &filter.source_ids);

        let content = classify_messages(filtered.records.iter().copied(), self.classifier.as_deref());
        if self.classifier.is_none() {
            log::debug!("no content classifier attached; skipping message classification");
        }

        let diagnostics = PassDiagnostics {
            records_in: records.len(),
            filtered_out: filtered.filtered_out,
            filter_unparsable_timestamps: filtered.unparsable_timestamps,
            analysed: filtered.records.len(),
            unparsable_timestamps: undated.len(),
            party_index: indices.party.diagnostics(),
            graph: graph_diagnostics,
            clamped_call_durations: clamped_calls,
            unresolved_location_events: locations
                .timelines
                .values()
                .flatten()
                .filter(|e| !e.is_resolved())
                .count(),
            anomaly_rules: self.detector.rule_names().into_iter().map(str::to_string).collect(),
        };

        log::info!(
            "pass complete: {} records analysed, {} nodes, {} chains, {} anomalies",
            diagnostics.analysed,
            graph.node_count(),
            chains.len(),
            anomalies.len()
        );

        Ok(AnalysisReport {
            graph_trimmed: graph.is_trimmed(self.config.graph.max_display_nodes),
            hubs: graph.hubs(self.config.graph.hub_degree_threshold),
            graph,
            chains,
            fingerprints: fingerprints.numbers,
            device_fingerprints: fingerprints.devices,
            sim_fingerprints: fingerprints.sims,
            location_events: locations.timelines,
            tower_visits: locations.visits,
            colocations: locations.colocations,
            device_associations: locations.associations,
            tower_activity: locations.towers,
            anomalies,
            links,
            content,
            diagnostics,
        })
    }

    /// Chronological activity of one number or IMEI across the snapshot.
    pub fn timeline(&self, records: &[InteractionRecord], query: &TimelineQuery) -> Vec<TimelineEvent> {
        unified_timeline(records, &self.clock, query)
    }

    // ── Stages ─────────────────────────────────────────────────────────

    fn graph_stage(
        &self,
        timed: &[TimedRecord<'_>],
        undated: &[&InteractionRecord],
    ) -> (EntityGraph, GraphDiagnostics) {
        let mut builder = GraphBuilder::new(&self.graph_options);
        for item in timed {
            builder.fold(item.record, Some(item.at));
        }
        for record in undated {
            builder.fold(record, None);
        }
        builder.finish()
    }

    fn chain_stage(&self, indices: &Indices<'_>) -> Vec<ConversationChain> {
        detect_all(&indices.party, self.config.chains.gap_minutes, self.config.chains.min_depth)
    }

    fn fingerprint_stage(&self, indices: &Indices<'_>, towers: &TowerLookup) -> FingerprintSet {
        let cfg = &self.config.fingerprint;
        FingerprintSet {
            numbers: compute_all(&indices.party, EntityKind::Number, &self.clock, cfg, towers),
            devices: compute_all(&indices.device, EntityKind::Device, &self.clock, cfg, towers),
            sims: compute_all(&indices.sim, EntityKind::Sim, &self.clock, cfg, towers),
        }
    }

    fn location_stage(&self, timed: &[TimedRecord<'_>], indices: &Indices<'_>, towers: &TowerLookup) -> LocationSet {
        let cfg = &self.config.location;
        let timelines = resolve_all(&indices.subscriber, towers, cfg.dwell_cap_minutes);
        let visits = timelines
            .iter()
            .map(|(entity, events)| (entity.clone(), tower_visits(events)))
            .collect();
        let colocations =
            ColocationIndex::build(&timelines, self.clock, cfg.colocation_bucket_minutes).candidate_pairs();
        LocationSet {
            timelines,
            visits,
            colocations,
            associations: DeviceAssociationTable::build(&indices.sim, &indices.device),
            towers: tower_activity(timed, &self.clock, towers),
        }
    }

    fn fan_out_parallel(
        &self,
        timed: &[TimedRecord<'_>],
        undated: &[&InteractionRecord],
        indices: &Indices<'_>,
        towers: &TowerLookup,
    ) -> AnalysisResult<(
        (EntityGraph, GraphDiagnostics),
        Vec<ConversationChain>,
        FingerprintSet,
        LocationSet,
    )> {
        std::thread::scope(|scope| {
            let graph = scope.spawn(|| self.graph_stage(timed, undated));
            let chains = scope.spawn(|| self.chain_stage(indices));
            let fingerprints = scope.spawn(|| self.fingerprint_stage(indices, towers));
            let locations = self.location_stage(timed, indices, towers);
            Ok((
                graph.join().map_err(|_| stage_panicked("graph"))?,
                chains.join().map_err(|_| stage_panicked("chains"))?,
                fingerprints.join().map_err(|_| stage_panicked("fingerprints"))?,
                locations,
            ))
        })
    }
}

fn stage_panicked(stage: &str) -> AnalysisError {
    AnalysisError::Other(anyhow::anyhow!("{stage} stage panicked"))
}
