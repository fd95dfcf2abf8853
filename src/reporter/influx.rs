//! InfluxDB v2 write API client

use crate::config::Config;
use anyhow::{Context, Result};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Network-level failure to reach the backend. Always retryable.
#[derive(Error, Debug)]
#[error("backend unreachable: {0}")]
pub struct TransportError(pub String);

/// Response to one write attempt that made it to the backend.
#[derive(Debug, Clone)]
pub struct WriteReply {
    pub status: u16,
    /// Backend rate-limit hint, when present
    pub retry_after: Option<Duration>,
    /// Response body, for error context
    pub body: String,
}

/// The backend seam: submit one line-protocol entry, report what the
/// backend said. Any store speaking a point-write protocol can sit
/// behind this.
#[allow(async_fn_in_trait)]
pub trait PointWriter {
    async fn write_point(&self, line: &str) -> Result<WriteReply, TransportError>;
}

pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    auth_header: String,
}

impl InfluxWriter {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let write_url = format!("{}/api/v2/write", config.influx_url.trim_end_matches('/'));

        Ok(Self {
            client,
            write_url,
            org: config.influx_org.clone(),
            bucket: config.influx_bucket.clone(),
            auth_header: format!("Token {}", config.influx_token.reveal()),
        })
    }
}

impl PointWriter for InfluxWriter {
    async fn write_point(&self, line: &str) -> Result<WriteReply, TransportError> {
        debug!("writing point to {}: {}", self.write_url, line);

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line.to_string())
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        Ok(WriteReply {
            status,
            retry_after,
            body,
        })
    }
}
