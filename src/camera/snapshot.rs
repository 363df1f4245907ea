use super::descriptor::AuthBinding;
use super::http::CameraHttpClient;
use super::source::{FrameRead, FrameSlot, SourceCounters};
use crate::codec::Codec;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Fetches one encoded image per call.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Bytes>;

    fn describe(&self) -> String;
}

/// Snapshot fetcher for HTTP picture endpoints
pub struct HttpSnapshotFetcher {
    url: String,
    client: CameraHttpClient,
}

impl HttpSnapshotFetcher {
    pub fn new(url: impl Into<String>, auth: AuthBinding, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: CameraHttpClient::with_timeout(auth, timeout)?,
        })
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        let response = self.client.get(&self.url).await?;
        Ok(response.bytes().await?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// On-demand acquisition: no background task, one fetch per read.
pub(crate) struct OnDemandStrategy {
    fetcher: Arc<dyn SnapshotFetcher>,
    codec: Arc<dyn Codec>,
}

impl OnDemandStrategy {
    pub(crate) fn new(fetcher: Arc<dyn SnapshotFetcher>, codec: Arc<dyn Codec>) -> Self {
        Self { fetcher, codec }
    }

    /// Fetch and decode. Failures return the last good frame as fallback.
    pub(crate) async fn read(&self, slot: &FrameSlot, counters: &SourceCounters) -> FrameRead {
        match self.fetcher.fetch().await {
            Ok(payload) => match self.codec.decode(&payload) {
                Some(image) => {
                    let frame = slot.publish(image);
                    counters.record_frame();
                    trace!("Snapshot {} decoded from {}", frame.id, self.fetcher.describe());
                    return FrameRead::Fresh(frame);
                }
                None => {
                    warn!(
                        "Snapshot from {} could not be decoded ({} bytes)",
                        self.fetcher.describe(),
                        payload.len()
                    );
                }
            },
            Err(e) => {
                warn!("Snapshot fetch from {} failed: {}", self.fetcher.describe(), e);
            }
        }

        counters.record_failure();
        FrameRead::Unavailable {
            previous: slot.latest(),
        }
    }
}
