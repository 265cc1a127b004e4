//! Network side of the downloader.

use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{StatusCode, header};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Answer to a metadata-only request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMeta {
    /// The origin answered "not modified" to the conditional request
    pub not_modified: bool,
    pub content_length: Option<u64>,
}

/// Fetches media from an origin.
#[async_trait]
pub trait MediaClient: Send + Sync {
    /// HEAD-equivalent request. `if_modified_since` is sent as a conditional
    /// header when set.
    async fn head(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
        timeout: Duration,
    ) -> Result<RemoteMeta>;

    /// Stream the resource into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64>;
}

/// [`MediaClient`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpMediaClient {
    client: reqwest::Client,
}

impl HttpMediaClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// RFC 7231 IMF-fixdate.
fn http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl MediaClient for HttpMediaClient {
    async fn head(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
        timeout: Duration,
    ) -> Result<RemoteMeta> {
        let mut request = self.client.head(url).timeout(timeout);
        if let Some(since) = if_modified_since {
            request = request.header(header::IF_MODIFIED_SINCE, http_date(since));
        }
        let response = request.send().await?;
        let not_modified = response.status() == StatusCode::NOT_MODIFIED;
        let response = if not_modified {
            response
        } else {
            response.error_for_status()?
        };

        // Response::content_length reports the (empty) body of a HEAD reply
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(RemoteMeta {
            not_modified,
            content_length,
        })
    }

    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::media(url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
