use super::geometry::{contains, Point};
use super::zone::Zone;
use crate::detector::Detection;
use serde::Serialize;
use std::collections::BTreeMap;

/// Where one detection landed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub class: String,
    pub confidence: f32,
    pub centroid: Point,
    /// First zone (in configured order) containing the centroid
    pub zone_id: Option<String>,
}

/// Result of evaluating one frame's detections against a zone set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evaluation {
    /// Every zone id of the evaluated set; `true` when occupied
    pub occupancy: BTreeMap<String, bool>,
    /// Classes assigned to each zone
    pub assignments: BTreeMap<String, Vec<String>>,
    /// One entry per detection, in detection order
    pub placements: Vec<Placement>,
}

impl Evaluation {
    pub fn occupied_count(&self) -> usize {
        self.occupancy.values().filter(|occupied| **occupied).count()
    }

    pub fn is_occupied(&self, zone_id: &str) -> bool {
        self.occupancy.get(zone_id).copied().unwrap_or(false)
    }

    /// Detections whose centroid fell outside every zone
    pub fn unassigned(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter().filter(|p| p.zone_id.is_none())
    }
}

/// Assigns detections to zones by bounding-box centroid
#[derive(Debug, Clone, Copy)]
pub struct ZoneEvaluator {
    boundary_epsilon: f64,
}

impl Default for ZoneEvaluator {
    fn default() -> Self {
        Self {
            boundary_epsilon: 1e-9,
        }
    }
}

impl ZoneEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerance for treating a centroid as lying on a zone edge
    pub fn with_boundary_epsilon(mut self, epsilon: f64) -> Self {
        self.boundary_epsilon = epsilon.abs();
        self
    }

    /// Occupancy is pre-seeded `false` for every zone. Each detection goes to
    /// the first zone containing its centroid; later zones are not checked.
    pub fn evaluate(&self, detections: &[Detection], zones: &[Zone]) -> Evaluation {
        let mut evaluation = Evaluation {
            occupancy: zones.iter().map(|z| (z.id.clone(), false)).collect(),
            assignments: zones.iter().map(|z| (z.id.clone(), Vec::new())).collect(),
            placements: Vec::with_capacity(detections.len()),
        };

        for detection in detections {
            let centroid = detection.centroid();
            let zone = zones
                .iter()
                .find(|zone| contains(&zone.coordinates, centroid, self.boundary_epsilon));

            if let Some(zone) = zone {
                evaluation.occupancy.insert(zone.id.clone(), true);
                evaluation
                    .assignments
                    .entry(zone.id.clone())
                    .or_default()
                    .push(detection.class.clone());
            }

            evaluation.placements.push(Placement {
                class: detection.class.clone(),
                confidence: detection.confidence,
                centroid,
                zone_id: zone.map(|z| z.id.clone()),
            });
        }

        evaluation
    }
}
