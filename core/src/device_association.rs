//! SIM ↔ device association table.
//!
//! Built from the SIM and device temporal indices of a pass. Each side
//! keeps its observations in time order, so change histories fall out
//! of a single scan.

use crate::{
    temporal_index::TemporalIndex,
    types::{EntityId, RecordId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub at: DateTime<Utc>,
    /// The device seen with a SIM, or the SIM seen in a device.
    pub counterpart: EntityId,
    pub record_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationChange {
    pub at: DateTime<Utc>,
    pub previous: EntityId,
    pub new: EntityId,
    pub record_id: RecordId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAssociationTable {
    pub by_sim: BTreeMap<EntityId, Vec<Observation>>,
    pub by_device: BTreeMap<EntityId, Vec<Observation>>,
}

impl DeviceAssociationTable {
    /// Only records carrying both a SIM and a device contribute.
    pub fn build(sims: &TemporalIndex<'_>, devices: &TemporalIndex<'_>) -> Self {
        let by_sim = sims
            .iter()
            .map(|(sim, history)| {
                let observations = history
                    .iter()
                    .filter_map(|item| {
                        item.record.device().map(|device| Observation {
                            at: item.at,
                            counterpart: device.to_string(),
                            record_id: item.record.id.clone(),
                        })
                    })
                    .collect::<Vec<_>>();
                (sim.clone(), observations)
            })
            .filter(|(_, obs)| !obs.is_empty())
            .collect();
        let by_device = devices
            .iter()
            .map(|(device, history)| {
                let observations = history
                    .iter()
                    .filter_map(|item| {
                        item.record.sim().map(|sim| Observation {
                            at: item.at,
                            counterpart: sim.to_string(),
                            record_id: item.record.id.clone(),
                        })
                    })
                    .collect::<Vec<_>>();
                (device.clone(), observations)
            })
            .filter(|(_, obs)| !obs.is_empty())
            .collect();
        Self { by_sim, by_device }
    }

    pub fn devices_for_sim(&self, sim: &str) -> BTreeSet<&str> {
        distinct(self.by_sim.get(sim))
    }

    pub fn sims_for_device(&self, device: &str) -> BTreeSet<&str> {
        distinct(self.by_device.get(device))
    }

    pub fn changes_for_sim(&self, sim: &str) -> Vec<AssociationChange> {
        changes(self.by_sim.get(sim))
    }

    pub fn changes_for_device(&self, device: &str) -> Vec<AssociationChange> {
        changes(self.by_device.get(device))
    }
}

fn distinct(observations: Option<&Vec<Observation>>) -> BTreeSet<&str> {
    observations
        .map(|obs| obs.iter().map(|o| o.counterpart.as_str()).collect())
        .unwrap_or_default()
}

fn changes(observations: Option<&Vec<Observation>>) -> Vec<AssociationChange> {
    let Some(observations) = observations else {
        return Vec::new();
    };
    observations
        .windows(2)
        .filter(|pair| pair[0].counterpart != pair[1].counterpart)
        .map(|pair| AssociationChange {
            at: pair[1].at,
            previous: pair[0].counterpart.clone(),
            new: pair[1].counterpart.clone(),
            record_id: pair[1].record_id.clone(),
        })
        .collect()
}
