use super::{ComponentState, ParkwatchApp};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl ParkwatchApp {
    /// Stop monitors, then release every camera source
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        self.set_component_state("monitors", ComponentState::Stopping)
            .await;
        let monitors = std::mem::take(&mut self.monitors);
        let mut monitors_ok = true;
        for handle in monitors {
            match timeout(MONITOR_STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Monitor task failed: {}", e);
                    monitors_ok = false;
                }
                Err(_) => {
                    warn!("Monitor task did not stop within {:?}", MONITOR_STOP_TIMEOUT);
                    monitors_ok = false;
                }
            }
        }
        if monitors_ok {
            self.set_component_state("monitors", ComponentState::Stopped)
                .await;
        } else {
            self.set_component_state("monitors", ComponentState::Failed)
                .await;
            exit_code = 1;
        }

        self.set_component_state("cameras", ComponentState::Stopping)
            .await;
        self.registry.shutdown().await;
        self.set_component_state("cameras", ComponentState::Stopped)
            .await;

        self.set_component_state("zones", ComponentState::Stopped)
            .await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
