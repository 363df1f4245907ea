use super::capture::CaptureState;
use super::descriptor::{AuthBinding, SourceDescriptor};
use super::mode::AcquisitionMode;
use super::snapshot::OnDemandStrategy;
use crate::frame::FrameData;
use image::RgbImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of [`CameraSource::read`]
#[derive(Debug, Clone)]
pub enum FrameRead {
    /// A frame acquired for this read (or the latest cached one for
    /// continuous sources)
    Fresh(FrameData),
    /// Nothing new; carries the last good frame when one exists
    Unavailable { previous: Option<FrameData> },
}

impl FrameRead {
    pub fn is_ok(&self) -> bool {
        matches!(self, FrameRead::Fresh(_))
    }

    /// The fresh frame, if this read succeeded
    pub fn fresh(self) -> Option<FrameData> {
        match self {
            FrameRead::Fresh(frame) => Some(frame),
            FrameRead::Unavailable { .. } => None,
        }
    }

    /// The fresh frame, or the previous one as fallback
    pub fn into_frame(self) -> Option<FrameData> {
        match self {
            FrameRead::Fresh(frame) => Some(frame),
            FrameRead::Unavailable { previous } => previous,
        }
    }
}

/// Latest-frame slot. The lock is held only to swap or clone the `Option`.
#[derive(Default)]
pub(crate) struct FrameSlot {
    last: Mutex<Option<FrameData>>,
    next_id: AtomicU64,
}

impl FrameSlot {
    pub(crate) fn publish(&self, image: RgbImage) -> FrameData {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = FrameData::new(id, SystemTime::now(), image);
        *self.last.lock() = Some(frame.clone());
        frame
    }

    pub(crate) fn latest(&self) -> Option<FrameData> {
        self.last.lock().clone()
    }
}

const STATE_STRUCTURED: u8 = 1;
const STATE_MANUAL: u8 = 2;

/// Per-source acquisition counters
#[derive(Default)]
pub(crate) struct SourceCounters {
    frames_captured: AtomicU64,
    failed_reads: AtomicU64,
    capture_state: AtomicU8,
    task_running: AtomicBool,
}

impl SourceCounters {
    pub(crate) fn record_frame(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_state(&self, state: CaptureState) {
        let value = match state {
            CaptureState::StructuredDecode => STATE_STRUCTURED,
            CaptureState::ManualFallback => STATE_MANUAL,
        };
        self.capture_state.store(value, Ordering::Relaxed);
    }

    pub(crate) fn set_task_running(&self, running: bool) {
        self.task_running.store(running, Ordering::Relaxed);
    }

    fn state(&self) -> Option<CaptureState> {
        match self.capture_state.load(Ordering::Relaxed) {
            STATE_STRUCTURED => Some(CaptureState::StructuredDecode),
            STATE_MANUAL => Some(CaptureState::ManualFallback),
            _ => None,
        }
    }
}

/// Point-in-time view of a source's acquisition
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub failed_reads: u64,
    /// `None` for on-demand sources
    pub capture_state: Option<CaptureState>,
    pub capture_task_running: bool,
    pub running: bool,
    pub last_frame_age_ms: Option<u64>,
}

/// Strategy selected from the acquisition mode at construction
pub(crate) enum Acquisition {
    Continuous {
        task: Mutex<Option<JoinHandle<()>>>,
    },
    OnDemand(OnDemandStrategy),
}

/// One camera behind a single `read()` contract.
pub struct CameraSource {
    id: String,
    descriptor: SourceDescriptor,
    mode: AcquisitionMode,
    auth: AuthBinding,
    slot: Arc<FrameSlot>,
    counters: Arc<SourceCounters>,
    token: CancellationToken,
    acquisition: Acquisition,
}

impl CameraSource {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: String,
        descriptor: SourceDescriptor,
        mode: AcquisitionMode,
        auth: AuthBinding,
        slot: Arc<FrameSlot>,
        counters: Arc<SourceCounters>,
        token: CancellationToken,
        acquisition: Acquisition,
    ) -> Self {
        Self {
            id,
            descriptor,
            mode,
            auth,
            slot,
            counters,
            token,
            acquisition,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> &AcquisitionMode {
        &self.mode
    }

    pub fn auth(&self) -> &AuthBinding {
        &self.auth
    }

    /// Read a frame.
    ///
    /// Continuous sources answer from the cache without blocking; on-demand
    /// sources perform one bounded fetch. A released source no longer
    /// acquires and only hands back its last frame.
    pub async fn read(&self) -> FrameRead {
        if self.token.is_cancelled() {
            return FrameRead::Unavailable {
                previous: self.slot.latest(),
            };
        }

        match &self.acquisition {
            Acquisition::Continuous { .. } => match self.slot.latest() {
                Some(frame) => FrameRead::Fresh(frame),
                None => FrameRead::Unavailable { previous: None },
            },
            Acquisition::OnDemand(strategy) => strategy.read(&self.slot, &self.counters).await,
        }
    }

    /// Most recent successfully acquired frame, whatever the mode
    pub fn last_frame(&self) -> Option<FrameData> {
        self.slot.latest()
    }

    /// Stop acquisition. Cooperative: the capture task exits at its next
    /// cancellation check.
    pub fn release(&self) {
        if !self.token.is_cancelled() {
            info!("Releasing camera source '{}'", self.id);
            self.token.cancel();
        }
    }

    /// Release and wait (bounded) for the capture task to finish
    pub async fn shutdown(&self, wait: Duration) {
        self.release();

        let task = match &self.acquisition {
            Acquisition::Continuous { task } => task.lock().take(),
            Acquisition::OnDemand(_) => None,
        };

        if let Some(task) = task {
            match tokio::time::timeout(wait, task).await {
                Ok(Ok(())) => debug!("Capture task for '{}' completed", self.id),
                Ok(Err(e)) => error!("Capture task for '{}' failed: {}", self.id, e),
                Err(_) => warn!(
                    "Capture task for '{}' did not stop within {:?}",
                    self.id, wait
                ),
            }
        }
    }

    /// Liveness: false once released
    pub fn is_opened(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.counters.frames_captured.load(Ordering::Relaxed),
            failed_reads: self.counters.failed_reads.load(Ordering::Relaxed),
            capture_state: self.counters.state(),
            capture_task_running: self.counters.task_running.load(Ordering::Relaxed),
            running: self.is_opened(),
            last_frame_age_ms: self.slot.latest().map(|frame| frame.age_ms()),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSource")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("auth", &self.auth)
            .field("running", &self.is_opened())
            .finish()
    }
}
