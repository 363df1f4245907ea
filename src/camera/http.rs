use super::descriptor::AuthBinding;
use crate::error::{CameraError, ParkwatchError, Result};
use crate::framer::{ChunkStream, StreamConnector};
use async_trait::async_trait;
use bytes::Bytes;
use digest_auth::AuthContext;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, trace};

/// HTTP client bound to one camera's credentials.
///
/// Basic credentials are sent up front. Digest credentials answer the
/// `401` challenge of a first unauthenticated request.
#[derive(Clone)]
pub struct CameraHttpClient {
    client: Client,
    auth: AuthBinding,
}

impl CameraHttpClient {
    /// Client whose whole request (headers and body) is bounded by `timeout`
    pub fn with_timeout(auth: AuthBinding, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, auth })
    }

    /// Client for long-lived streaming bodies; only connecting is bounded
    pub fn streaming(auth: AuthBinding, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client, auth })
    }

    pub fn auth(&self) -> &AuthBinding {
        &self.auth
    }

    /// GET `url` with the bound credentials. Non-success statuses are errors.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = match &self.auth {
            AuthBinding::None => self.client.get(url).send().await?,
            AuthBinding::Basic { user, password } => {
                self.client
                    .get(url)
                    .basic_auth(user, Some(password))
                    .send()
                    .await?
            }
            AuthBinding::Digest { user, password } => {
                let challenge = self.client.get(url).send().await?;
                if challenge.status() == StatusCode::UNAUTHORIZED {
                    let header = digest_header(url, &challenge, user, password)?;
                    trace!("Answering digest challenge from {}", url);
                    self.client
                        .get(url)
                        .header(AUTHORIZATION, header)
                        .send()
                        .await?
                } else {
                    challenge
                }
            }
        };

        if !response.status().is_success() {
            return Err(CameraError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        Ok(response)
    }
}

fn digest_header(url: &str, challenge: &Response, user: &str, password: &str) -> Result<String> {
    let digest_error = |details: String| -> ParkwatchError {
        CameraError::DigestAuth {
            url: url.to_string(),
            details,
        }
        .into()
    };

    let www_authenticate = challenge
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| digest_error("missing WWW-Authenticate header".to_string()))?;

    let parsed = Url::parse(url).map_err(|e| digest_error(e.to_string()))?;
    let uri = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    let mut prompt =
        digest_auth::parse(www_authenticate).map_err(|e| digest_error(e.to_string()))?;
    let context = AuthContext::new(user, password, uri.as_str());
    let answer = prompt
        .respond(&context)
        .map_err(|e| digest_error(e.to_string()))?;

    Ok(answer.to_header_string())
}

/// Opens raw multipart MJPEG connections for the manual fallback path.
pub struct HttpStreamConnector {
    url: String,
    client: CameraHttpClient,
    connect_timeout: Duration,
    chunk_timeout: Duration,
}

impl HttpStreamConnector {
    pub fn new(
        url: impl Into<String>,
        auth: AuthBinding,
        connect_timeout: Duration,
        chunk_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: CameraHttpClient::streaming(auth, connect_timeout)?,
            connect_timeout,
            chunk_timeout,
        })
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn connect(&self) -> Result<Box<dyn ChunkStream>> {
        let response = tokio::time::timeout(self.connect_timeout, self.client.get(&self.url))
            .await
            .map_err(|_| CameraError::Open {
                url: self.url.clone(),
                details: format!("no response within {:?}", self.connect_timeout),
            })??;

        debug!(
            "Raw stream {} answered with content type {:?}",
            self.url,
            response.headers().get(reqwest::header::CONTENT_TYPE)
        );

        Ok(Box::new(HttpChunkStream {
            response,
            chunk_timeout: self.chunk_timeout,
        }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

struct HttpChunkStream {
    response: Response,
    chunk_timeout: Duration,
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match tokio::time::timeout(self.chunk_timeout, self.response.chunk()).await {
            Ok(chunk) => Ok(chunk?),
            Err(_) => Err(CameraError::CaptureStream {
                details: format!("no data within {:?}", self.chunk_timeout),
            }
            .into()),
        }
    }
}
