// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
///
/// One client is built per run and shared by sources and the downloader.
/// `timeout_secs` bounds every request; media requests override it with
/// their own per-request timeout.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?;
    Ok(client)
}
