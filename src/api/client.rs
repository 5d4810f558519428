//! HTTP client options derived from [`Settings`].
//!
//! Requests themselves are made by an external HTTP client; this module maps
//! the `api` group onto the options it consumes and computes the retry
//! backoff schedule.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;

/// Growth factor between consecutive retry delays.
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Options handed to the HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiClientOptions {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(serialize_with = "as_secs")]
    pub timeout: Duration,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Verify TLS certificates.
    pub verify: bool,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(serialize_with = "as_secs")]
    pub retry_delay: Duration,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl ApiClientOptions {
    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exponential backoff: one delay per retry, doubling each time.
    pub fn retry_delays(&self) -> Vec<Duration> {
        (0..self.max_retries)
            .map(|attempt| self.retry_delay.mul_f64(BACKOFF_MULTIPLIER.powi(attempt as i32)))
            .collect()
    }
}

/// Maps the `api` group onto [`ApiClientOptions`].
pub fn api_client_options(settings: &Settings) -> ApiClientOptions {
    let api = &settings.api;
    ApiClientOptions {
        base_url: api.base_url.clone(),
        timeout: Duration::from_secs(api.timeout),
        headers: api.default_headers.clone(),
        verify: api.validate_ssl,
        max_retries: api.max_retries,
        retry_delay: Duration::from_secs_f64(api.retry_delay),
    }
}
