use super::{ComponentState, ParkwatchApp};
use crate::error::Result;
use crate::feed::FeedOrchestrator;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl ParkwatchApp {
    /// Load persisted zones and mark components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing parkwatch components");

        let mut states = self.component_states.lock().await;
        states.insert("zones".to_string(), ComponentState::Stopped);
        states.insert("cameras".to_string(), ComponentState::Stopped);
        states.insert("monitors".to_string(), ComponentState::Stopped);
        drop(states);

        self.set_component_state("zones", ComponentState::Starting)
            .await;
        match self.zones.preload().await {
            Ok(count) => {
                self.set_component_state("zones", ComponentState::Running)
                    .await;
                debug!("{} zone set(s) available", count);
            }
            Err(e) => {
                self.set_component_state("zones", ComponentState::Failed)
                    .await;
                error!("Failed to load zones: {}", e);
                return Err(e);
            }
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Bring every configured camera live and, with a detector, start one
    /// occupancy monitor per camera
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting parkwatch");

        self.set_component_state("cameras", ComponentState::Starting)
            .await;
        let camera_ids: Vec<String> = self.config.cameras.iter().map(|c| c.id.clone()).collect();
        for id in &camera_ids {
            if let Err(e) = self.registry.get(id) {
                self.set_component_state("cameras", ComponentState::Failed)
                    .await;
                error!("Failed to start camera '{}': {}", id, e);
                return Err(e);
            }
        }
        self.set_component_state("cameras", ComponentState::Running)
            .await;
        info!("{} camera source(s) live", camera_ids.len());

        if !self.feeds.has_detector() {
            warn!("Occupancy monitors disabled: no detector configured");
            return Ok(());
        }

        self.set_component_state("monitors", ComponentState::Starting)
            .await;
        for id in camera_ids {
            let token = self.cancellation_token.child_token();
            let handle = tokio::spawn(monitor(self.feeds.clone(), id, token));
            self.monitors.push(handle);
        }
        self.set_component_state("monitors", ComponentState::Running)
            .await;

        info!("Parkwatch started successfully");
        Ok(())
    }
}

/// Keep occupancy current without a viewer; frames are never rendered
async fn monitor(feeds: FeedOrchestrator, source_id: String, token: CancellationToken) {
    let updates = match feeds.updates(&source_id, token) {
        Ok(updates) => updates,
        Err(e) => {
            error!("Monitor for '{}' could not start: {}", source_id, e);
            return;
        }
    };
    futures::pin_mut!(updates);

    while let Some(state) = updates.next().await {
        debug!(
            "'{}' at {}: {} occupied",
            source_id, state.timestamp, state.occupied_count
        );
    }

    debug!("Monitor for '{}' finished", source_id);
}
