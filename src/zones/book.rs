use super::store::ZoneStore;
use super::zone::{validate_zone_set, Zone};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// In-memory zone sets per source, backed by a [`ZoneStore`].
///
/// Sets are replaced wholesale; readers hold an `Arc` to the set that was
/// active when they looked it up.
pub struct ZoneBook {
    store: Arc<dyn ZoneStore>,
    sets: RwLock<HashMap<String, Arc<Vec<Zone>>>>,
}

impl ZoneBook {
    pub fn new(store: Arc<dyn ZoneStore>) -> Self {
        Self {
            store,
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Load every persisted set. Invalid sets are skipped with a warning.
    pub async fn preload(&self) -> Result<usize> {
        let persisted = self.store.load_all().await?;
        let mut loaded = 0;

        let mut sets = self.sets.write();
        for (source_id, zones) in persisted {
            if let Err(e) = validate_zone_set(&zones) {
                warn!("Ignoring stored zones for '{}': {}", source_id, e);
                continue;
            }
            sets.insert(source_id, Arc::new(zones));
            loaded += 1;
        }

        info!("Loaded zone sets for {} source(s)", loaded);
        Ok(loaded)
    }

    /// Current zone set for `source_id`; empty when none is configured
    pub fn zones(&self, source_id: &str) -> Arc<Vec<Zone>> {
        self.sets
            .read()
            .get(source_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Validate, replace in memory, then persist.
    ///
    /// A validation error leaves the current set untouched. A persistence
    /// error is returned after the in-memory set has been replaced.
    pub async fn sync(&self, source_id: &str, zones: Vec<Zone>) -> Result<()> {
        validate_zone_set(&zones)?;

        let zones = Arc::new(zones);
        self.sets
            .write()
            .insert(source_id.to_string(), Arc::clone(&zones));
        info!("Zone set for '{}' replaced ({} zone(s))", source_id, zones.len());

        self.store.save(source_id, &zones).await
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sets.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
