use crate::zones::{Evaluation, Zone};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Latest occupancy of one source's zones
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyState {
    pub source_id: String,
    pub zone_occupancy: BTreeMap<String, bool>,
    pub occupied_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl OccupancyState {
    pub fn from_evaluation(source_id: impl Into<String>, evaluation: &Evaluation) -> Self {
        Self {
            source_id: source_id.into(),
            zone_occupancy: evaluation.occupancy.clone(),
            occupied_count: evaluation.occupied_count(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_occupied(&self, zone_id: &str) -> bool {
        self.zone_occupancy.get(zone_id).copied().unwrap_or(false)
    }
}

/// One live [`OccupancyState`] per source. Last writer wins; no history.
#[derive(Default)]
pub struct OccupancyBoard {
    states: RwLock<HashMap<String, OccupancyState>>,
}

impl OccupancyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state for its source, returning the previous one
    pub fn publish(&self, state: OccupancyState) -> Option<OccupancyState> {
        self.states.write().insert(state.source_id.clone(), state)
    }

    pub fn get(&self, source_id: &str) -> Option<OccupancyState> {
        self.states.read().get(source_id).cloned()
    }

    pub fn clear(&self, source_id: &str) {
        self.states.write().remove(source_id);
    }
}

/// One space in a [`ParkingStatus`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStatus {
    pub id: String,
    pub space_number: u32,
    pub is_occupied: bool,
}

/// Per-source parking summary in the camelCase layout dashboards consume
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingStatus {
    pub camera_id: String,
    pub total_spaces: usize,
    pub occupied_spaces: usize,
    pub free_spaces: usize,
    pub spaces: Vec<SpaceStatus>,
    pub last_update: Option<DateTime<Utc>>,
}

impl ParkingStatus {
    /// Summarize `zones` against the latest state. Without a state every
    /// space is reported free. Zones missing from the state (added after it
    /// was evaluated) are reported free as well.
    pub fn build(source_id: &str, zones: &[Zone], state: Option<&OccupancyState>) -> Self {
        let spaces: Vec<SpaceStatus> = zones
            .iter()
            .map(|zone| SpaceStatus {
                id: zone.id.clone(),
                space_number: zone.space_number,
                is_occupied: state.map(|s| s.is_occupied(&zone.id)).unwrap_or(false),
            })
            .collect();

        let occupied_spaces = spaces.iter().filter(|space| space.is_occupied).count();

        Self {
            camera_id: source_id.to_string(),
            total_spaces: spaces.len(),
            occupied_spaces,
            free_spaces: spaces.len() - occupied_spaces,
            spaces,
            last_update: state.map(|s| s.timestamp),
        }
    }
}
