use crate::camera::{CameraSource, SourceDescriptor, SourceFactory};
use crate::error::{RegistryError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Process-wide set of camera sources, one live instance per id.
///
/// Lock order is `live` then `descriptors`. Construction happens under the
/// `live` lock, so concurrent first lookups of an id build exactly one source.
pub struct SourceRegistry {
    factory: Arc<dyn SourceFactory>,
    live: Mutex<HashMap<String, Arc<CameraSource>>>,
    descriptors: Mutex<HashMap<String, SourceDescriptor>>,
    shutdown_wait: Duration,
}

impl SourceRegistry {
    pub fn new(factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            factory,
            live: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(HashMap::new()),
            shutdown_wait: Duration::from_secs(3),
        }
    }

    /// How long [`shutdown`](Self::shutdown) waits for each capture task
    pub fn with_shutdown_wait(mut self, wait: Duration) -> Self {
        self.shutdown_wait = wait;
        self
    }

    /// Record the descriptor used when `id` is first looked up.
    ///
    /// Identical re-registration is a no-op. A different descriptor is
    /// accepted only while no live instance exists for `id`.
    pub fn register(&self, id: &str, descriptor: SourceDescriptor) -> Result<()> {
        validate_id(id)?;

        let live = self.live.lock();
        let mut descriptors = self.descriptors.lock();

        if descriptors.get(id) == Some(&descriptor) {
            return Ok(());
        }

        if live.contains_key(id) {
            return Err(RegistryError::AlreadyLive(id.to_string()).into());
        }

        debug!("Registered camera source '{}': {:?}", id, descriptor);
        descriptors.insert(id.to_string(), descriptor);
        Ok(())
    }

    /// Live source for `id`, created from its registered descriptor on first use
    pub fn get(&self, id: &str) -> Result<Arc<CameraSource>> {
        self.get_or_create(id, || Err(RegistryError::UnknownSource(id.to_string()).into()))
    }

    /// Live source for `id`. When nothing is registered yet, `provider`
    /// supplies the descriptor, which is then recorded.
    pub fn get_or_create<F>(&self, id: &str, provider: F) -> Result<Arc<CameraSource>>
    where
        F: FnOnce() -> Result<SourceDescriptor>,
    {
        validate_id(id)?;

        let mut live = self.live.lock();
        if let Some(source) = live.get(id) {
            return Ok(Arc::clone(source));
        }

        let mut descriptors = self.descriptors.lock();
        let descriptor = match descriptors.get(id) {
            Some(descriptor) => descriptor.clone(),
            None => {
                let descriptor = provider()?;
                descriptors.insert(id.to_string(), descriptor.clone());
                descriptor
            }
        };
        drop(descriptors);

        let source = Arc::new(self.factory.create(id, &descriptor)?);
        info!("Camera source '{}' is live ({})", id, source.mode());
        live.insert(id.to_string(), Arc::clone(&source));

        Ok(source)
    }

    /// Release and forget the live instance for `id`. The descriptor stays
    /// registered, so the next lookup builds a fresh source.
    pub fn release(&self, id: &str) -> bool {
        let removed = self.live.lock().remove(id);
        match removed {
            Some(source) => {
                source.release();
                true
            }
            None => false,
        }
    }

    /// Release every live source and wait for their capture tasks
    pub async fn shutdown(&self) {
        let sources: Vec<Arc<CameraSource>> = self.live.lock().drain().map(|(_, s)| s).collect();
        if sources.is_empty() {
            return;
        }

        info!("Shutting down {} camera source(s)", sources.len());
        for source in sources {
            source.shutdown(self.shutdown_wait).await;
        }
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.lock().contains_key(id)
    }

    /// Registered ids with their descriptors, sorted by id
    pub fn list(&self) -> Vec<(String, SourceDescriptor)> {
        let mut entries: Vec<_> = self
            .descriptors
            .lock()
            .iter()
            .map(|(id, descriptor)| (id.clone(), descriptor.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RegistryError::InvalidId(format!("{:?}", id)).into());
    }
    Ok(())
}
