//! HTTP transport for the realtime trip-update feed.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use super::decode::{FeedFormat, decode_feed};
use super::error::FeedError;
use super::types::FeedBatch;

/// Hard cap on a single feed payload.
pub const MAX_FEED_BYTES: usize = 50 * 1024 * 1024;

/// Default query parameter carrying an API key.
pub const DEFAULT_KEY_PARAM: &str = "api_key";

/// Anything that can fetch and decode one realtime batch.
///
/// Implemented over HTTP for production and by scripted fakes in tests.
pub trait FeedSource {
    fn fetch(&self) -> impl Future<Output = Result<FeedBatch, FeedError>> + Send;
}

/// How the feed authenticates requests.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    #[default]
    None,
    /// Key appended as a query parameter.
    ApiKey {
        #[serde(default = "default_key_param")]
        param: String,
        key: String,
    },
    /// HTTP basic authentication.
    Basic { username: String, password: String },
}

fn default_key_param() -> String {
    DEFAULT_KEY_PARAM.to_string()
}

impl Credential {
    pub fn api_key(key: impl Into<String>) -> Self {
        Credential::ApiKey {
            param: default_key_param(),
            key: key.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credential::None => request,
            Credential::ApiKey { param, key } => request.query(&[(param.as_str(), key.as_str())]),
            Credential::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => write!(f, "None"),
            Credential::ApiKey { param, .. } => f
                .debug_struct("ApiKey")
                .field("param", param)
                .field("key", &"<redacted>")
                .finish(),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Fetches the feed over HTTP(S) and decodes it.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    http: reqwest::Client,
    url: String,
    format: FeedFormat,
    credential: Credential,
}

impl HttpFeedSource {
    /// Create a source with the given per-request timeout.
    pub fn new(
        url: impl Into<String>,
        format: FeedFormat,
        credential: Credential,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            format,
            credential,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format(&self) -> FeedFormat {
        self.format
    }

    fn accept(&self) -> HeaderValue {
        match self.format {
            FeedFormat::Protobuf => HeaderValue::from_static("application/x-protobuf"),
            FeedFormat::Json => HeaderValue::from_static("application/json"),
        }
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self) -> impl Future<Output = Result<FeedBatch, FeedError>> + Send {
        async move {
            let request = self.http.get(&self.url).header(ACCEPT, self.accept());
            let response = self.credential.apply(request).send().await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(FeedError::Unauthorized);
            }
            if !status.is_success() {
                let message = status.canonical_reason().unwrap_or_default().to_string();
                return Err(FeedError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            if let Some(len) = response.content_length()
                && len as usize > MAX_FEED_BYTES
            {
                return Err(FeedError::TooLarge { bytes: len as usize });
            }

            let bytes = response.bytes().await?;
            if bytes.len() > MAX_FEED_BYTES {
                return Err(FeedError::TooLarge { bytes: bytes.len() });
            }

            let batch = decode_feed(self.format, &bytes, Utc::now())?;
            debug!(bytes = bytes.len(), trips = batch.trips.len(), "decoded realtime feed");
            Ok(batch)
        }
    }
}
