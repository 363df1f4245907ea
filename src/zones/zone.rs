use super::geometry::Point;
use crate::error::ZoneError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One monitored parking space.
///
/// Serialized in the zone file's camelCase layout:
/// `{"id": "zone-1", "spaceNumber": 1, "coordinates": [{"x": 52, "y": 364}, ...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub space_number: u32,
    pub coordinates: Vec<Point>,
}

impl Zone {
    pub fn new(id: impl Into<String>, space_number: u32, coordinates: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            space_number,
            coordinates,
        }
    }

    pub fn validate(&self) -> Result<(), ZoneError> {
        if self.id.trim().is_empty() {
            return Err(ZoneError::EmptyId);
        }

        if self.coordinates.len() < 3 {
            return Err(ZoneError::TooFewPoints {
                zone_id: self.id.clone(),
                points: self.coordinates.len(),
            });
        }

        if !self.coordinates.iter().all(Point::is_finite) {
            return Err(ZoneError::NonFiniteCoordinate {
                zone_id: self.id.clone(),
            });
        }

        Ok(())
    }
}

/// Validate every zone and reject duplicate ids within the set
pub fn validate_zone_set(zones: &[Zone]) -> Result<(), ZoneError> {
    let mut seen = HashSet::new();
    for zone in zones {
        zone.validate()?;
        if !seen.insert(zone.id.as_str()) {
            return Err(ZoneError::DuplicateId(zone.id.clone()));
        }
    }
    Ok(())
}
