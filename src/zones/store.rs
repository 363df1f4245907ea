use super::zone::Zone;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Zone persistence keyed by source id
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Zones for one source; empty when none were saved
    async fn load(&self, source_id: &str) -> Result<Vec<Zone>>;

    async fn save(&self, source_id: &str, zones: &[Zone]) -> Result<()>;

    /// Every saved zone set
    async fn load_all(&self) -> Result<HashMap<String, Vec<Zone>>>;
}

/// All zone sets in one JSON document keyed by source id.
///
/// Writes go to a sibling temp file that is renamed over the document.
pub struct JsonFileZoneStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileZoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<String, Vec<Zone>>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Zone file {} does not exist yet", self.path.display());
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &BTreeMap<String, Vec<Zone>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let content = serde_json::to_string_pretty(document)?;
        fs::write(&temp, content).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ZoneStore for JsonFileZoneStore {
    async fn load(&self, source_id: &str) -> Result<Vec<Zone>> {
        let mut document = self.read_document().await?;
        Ok(document.remove(source_id).unwrap_or_default())
    }

    async fn save(&self, source_id: &str, zones: &[Zone]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.insert(source_id.to_string(), zones.to_vec());
        self.write_document(&document).await?;

        info!(
            "Saved {} zone(s) for '{}' to {}",
            zones.len(),
            source_id,
            self.path.display()
        );
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<String, Vec<Zone>>> {
        Ok(self.read_document().await?.into_iter().collect())
    }
}

/// In-memory zone store
#[derive(Default)]
pub struct MemoryZoneStore {
    sets: Mutex<HashMap<String, Vec<Zone>>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn load(&self, source_id: &str) -> Result<Vec<Zone>> {
        Ok(self.sets.lock().get(source_id).cloned().unwrap_or_default())
    }

    async fn save(&self, source_id: &str, zones: &[Zone]) -> Result<()> {
        self.sets
            .lock()
            .insert(source_id.to_string(), zones.to_vec());
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<String, Vec<Zone>>> {
        Ok(self.sets.lock().clone())
    }
}
