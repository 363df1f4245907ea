use super::descriptor::{AuthBinding, AuthMode, SourceDescriptor};
use serde::Serialize;
use std::fmt;

/// Markers that identify a continuous video endpoint outright
const STREAM_PATH_MARKERS: &[&str] = &["mjpegfeed", "/video"];
/// Markers that identify a single-image endpoint
const SNAPSHOT_MARKERS: &[&str] = &["/picture", "snapshot", ".jpg", ".jpeg"];
/// Weaker stream hints checked when neither list above matched
const STREAM_KEYWORDS: &[&str] = &["video", "stream", "mjpeg", "live", "rtsp://"];

/// Acquisition strategy selected once when a source is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Local capture device (/dev/videoN); continuous, never authenticated
    LocalDevice { index: u32 },
    /// Live stream kept open by a background capture task
    Continuous { url: String },
    /// One HTTP fetch per read
    OnDemand { url: String },
}

impl AcquisitionMode {
    /// Classify a device index or URL.
    pub fn classify(url_or_index: &str) -> Self {
        let trimmed = url_or_index.trim();

        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<u32>() {
                return AcquisitionMode::LocalDevice { index };
            }
        }

        let url = trimmed.to_string();
        let lower = trimmed.to_ascii_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if contains_any(STREAM_PATH_MARKERS) {
            AcquisitionMode::Continuous { url }
        } else if contains_any(SNAPSHOT_MARKERS) {
            AcquisitionMode::OnDemand { url }
        } else if contains_any(STREAM_KEYWORDS) {
            AcquisitionMode::Continuous { url }
        } else {
            AcquisitionMode::OnDemand { url }
        }
    }

    pub fn is_continuous(&self) -> bool {
        !matches!(self, AcquisitionMode::OnDemand { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AcquisitionMode::LocalDevice { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            AcquisitionMode::LocalDevice { .. } => None,
            AcquisitionMode::Continuous { url } | AcquisitionMode::OnDemand { url } => Some(url),
        }
    }

    /// Bind credentials for this mode. Local devices never carry any.
    pub fn resolve_auth(&self, descriptor: &SourceDescriptor) -> AuthBinding {
        if self.is_local() || !descriptor.requires_auth {
            return AuthBinding::None;
        }

        let (Some(user), Some(password)) = (&descriptor.user, &descriptor.password) else {
            return AuthBinding::None;
        };

        if user.is_empty() || password.is_empty() {
            return AuthBinding::None;
        }

        match descriptor.auth_mode {
            AuthMode::None => AuthBinding::None,
            AuthMode::Basic => AuthBinding::Basic {
                user: user.clone(),
                password: password.clone(),
            },
            AuthMode::Digest => AuthBinding::Digest {
                user: user.clone(),
                password: password.clone(),
            },
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::LocalDevice { index } => write!(f, "local device /dev/video{}", index),
            AcquisitionMode::Continuous { url } => write!(f, "continuous stream {}", url),
            AcquisitionMode::OnDemand { url } => write!(f, "on-demand snapshot {}", url),
        }
    }
}

/// Embed bound credentials as URL userinfo, for decoders that take a bare URI.
pub fn credentials_uri(url: &str, auth: &AuthBinding) -> String {
    let Some((user, password)) = auth.credentials() else {
        return url.to_string();
    };

    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.set_username(user).is_err() || parsed.set_password(Some(password)).is_err() {
                return url.to_string();
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
