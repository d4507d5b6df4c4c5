//! HTTP artifact store
//!
//! Uploads each object with `PUT {base_url}/{key}`, every key segment
//! percent-encoded. Works with any store that
//! accepts plain PUTs: a bucket with a write policy, a WebDAV share, or a
//! gateway in front of an object store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::errors::PlatformError;
use crate::store::ArtifactStore;

/// HTTP store options
#[derive(Debug, Clone)]
pub struct Options {
    /// Base URL objects are written below
    pub base_url: String,

    /// Bearer token sent with every upload
    pub token: Option<SecretString>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Artifact store speaking plain HTTP PUT
pub struct HttpStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpStore {
    pub fn new(options: &Options) -> Result<Self, PlatformError> {
        if options.base_url.is_empty() {
            return Err(PlatformError::ConfigError("store base URL is not configured".to_string()));
        }
        let base_url = Url::parse(&options.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                PlatformError::ConfigError(format!("invalid store base URL: {}", options.base_url))
            })?;
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("sitemesh/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: options.token.clone(),
        })
    }

    /// URL of the object under `key`
    pub fn object_url(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(key.split('/'));
        }
        url
    }
}

#[async_trait]
impl ArtifactStore for HttpStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PlatformError> {
        let url = self.object_url(key);
        debug!("PUT {} ({})", url, content_type);

        let mut request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::StoreError(format!("{}: {}", key, e)))?;

        if !response.status().is_success() {
            return Err(PlatformError::StoreError(format!(
                "{}: store answered {}",
                key,
                response.status()
            )));
        }
        Ok(())
    }
}
