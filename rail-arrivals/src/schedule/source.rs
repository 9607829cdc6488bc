//! Where static schedule archives come from.

use std::future::Future;
use std::time::Duration;

use tracing::info;

use super::error::ScheduleError;

/// Anything that can produce the bytes of a GTFS zip archive.
///
/// This abstraction allows the store to be tested without network access.
pub trait ScheduleSource {
    /// Fetch the full archive.
    fn fetch_archive(&self) -> impl Future<Output = Result<Vec<u8>, ScheduleError>> + Send;
}

/// Downloads the archive over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpScheduleSource {
    http: reqwest::Client,
    url: String,
}

impl HttpScheduleSource {
    /// Create a source for `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScheduleError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ScheduleSource for HttpScheduleSource {
    fn fetch_archive(&self) -> impl Future<Output = Result<Vec<u8>, ScheduleError>> + Send {
        async move {
            info!(url = %self.url, "downloading static schedule");

            let response = self.http.get(&self.url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ScheduleError::Status {
                    status: status.as_u16(),
                });
            }

            let bytes = response.bytes().await?;
            info!(bytes = bytes.len(), "downloaded static schedule");
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let source = HttpScheduleSource::new(
            "https://example.com/gtfs.zip",
            Duration::from_secs(60),
        );
        assert_eq!(source.unwrap().url(), "https://example.com/gtfs.zip");
    }
}
