use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP authentication scheme requested for a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Basic,
    #[default]
    Digest,
}

/// How to reach one camera. Immutable once a source has been built from it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Local device index ("0") or stream/snapshot URL
    pub url_or_index: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub requires_auth: bool,
}

impl SourceDescriptor {
    /// Descriptor for an unauthenticated device index or URL
    pub fn open(url_or_index: impl Into<String>) -> Self {
        Self {
            url_or_index: url_or_index.into(),
            auth_mode: AuthMode::None,
            user: None,
            password: None,
            requires_auth: false,
        }
    }

    /// Descriptor for a camera behind Basic or Digest authentication
    pub fn authenticated(
        url: impl Into<String>,
        auth_mode: AuthMode,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url_or_index: url.into(),
            auth_mode,
            user: Some(user.into()),
            password: Some(password.into()),
            requires_auth: true,
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("url_or_index", &self.url_or_index)
            .field("auth_mode", &self.auth_mode)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("requires_auth", &self.requires_auth)
            .finish()
    }
}

/// Credentials actually bound to a source after auth resolution
#[derive(Clone, PartialEq, Eq)]
pub enum AuthBinding {
    None,
    Basic { user: String, password: String },
    Digest { user: String, password: String },
}

impl AuthBinding {
    pub fn is_none(&self) -> bool {
        matches!(self, AuthBinding::None)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self {
            AuthBinding::None => None,
            AuthBinding::Basic { user, password } | AuthBinding::Digest { user, password } => {
                Some((user.as_str(), password.as_str()))
            }
        }
    }
}

impl fmt::Debug for AuthBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthBinding::None => write!(f, "None"),
            AuthBinding::Basic { user, .. } => write!(f, "Basic({})", user),
            AuthBinding::Digest { user, .. } => write!(f, "Digest({})", user),
        }
    }
}
