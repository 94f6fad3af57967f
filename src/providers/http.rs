//! Bundled HTTP measurement provider
//!
//! A minimal collaborator behind the `MeasurementProvider` trait: one
//! bounded timed transfer per direction against configurable endpoints,
//! a HEAD probe for connectivity, and request latency as the ping
//! estimate. It deliberately implements no ramping protocol; anything
//! smarter can replace it through the trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};

use crate::engine::provider::{MeasurementProvider, ProviderError, ServerInfo, ServerSelection};

const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down?bytes=25000000";
const DEFAULT_UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";
const DEFAULT_UPLOAD_BYTES: usize = 8_000_000;
const USER_AGENT: &str = concat!("speedwatch/", env!("CARGO_PKG_VERSION"));

pub struct HttpMeasurementProvider {
    client: Client,
    download_url: String,
    upload_url: String,
    upload_bytes: usize,
}

impl HttpMeasurementProvider {
    /// Provider against the default public endpoints.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_endpoints(
            timeout,
            DEFAULT_DOWNLOAD_URL.to_string(),
            DEFAULT_UPLOAD_URL.to_string(),
        )
    }

    /// Provider against custom download/upload endpoints.
    pub fn with_endpoints(
        timeout: Duration,
        download_url: String,
        upload_url: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            download_url,
            upload_url,
            upload_bytes: DEFAULT_UPLOAD_BYTES,
        })
    }

    fn server_from_url(&self) -> Result<ServerInfo, ProviderError> {
        let url = Url::parse(&self.download_url)
            .map_err(|e| ProviderError::Protocol(format!("invalid endpoint URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProviderError::Protocol("endpoint URL has no host".to_string()))?;
        Ok(ServerInfo {
            sponsor: host.to_string(),
            name: "HTTP endpoint".to_string(),
            host: host.to_string(),
        })
    }
}

fn map_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Network(format!("request timeout: {e}"))
    } else if e.is_connect() {
        ProviderError::Network(e.to_string())
    } else {
        ProviderError::Protocol(e.to_string())
    }
}

#[async_trait]
impl MeasurementProvider for HttpMeasurementProvider {
    async fn connectivity_probe(&self, timeout: Duration) -> Result<(), ProviderError> {
        self.client
            .head(&self.download_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_request_error)?
            .error_for_status()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<ServerInfo>, ProviderError> {
        Ok(vec![self.server_from_url()?])
    }

    async fn select_best_server(
        &self,
        servers: &[ServerInfo],
    ) -> Result<ServerSelection, ProviderError> {
        let server = servers.first().cloned().ok_or(ProviderError::NoServers)?;

        // Request latency of a HEAD round trip stands in for ping.
        let started = Instant::now();
        self.client
            .head(&self.download_url)
            .send()
            .await
            .map_err(map_request_error)?
            .error_for_status()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!("Selected {} with {latency_ms:.0} ms latency", server.host);
        Ok(ServerSelection { server, latency_ms })
    }

    async fn download(&self) -> Result<f64, ProviderError> {
        let started = Instant::now();
        let body = self
            .client
            .get(&self.download_url)
            .send()
            .await
            .map_err(map_request_error)?
            .error_for_status()
            .map_err(|e| ProviderError::Network(e.to_string()))?
            .bytes()
            .await
            .map_err(map_request_error)?;
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);

        let bps = body.len() as f64 * 8.0 / elapsed;
        debug!("Downloaded {} bytes in {elapsed:.2}s ({bps:.0} bits/s)", body.len());
        Ok(bps)
    }

    async fn upload(&self) -> Result<f64, ProviderError> {
        let payload = vec![0u8; self.upload_bytes];
        let started = Instant::now();
        self.client
            .post(&self.upload_url)
            .body(payload)
            .send()
            .await
            .map_err(map_request_error)?
            .error_for_status()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);

        let bps = self.upload_bytes as f64 * 8.0 / elapsed;
        debug!("Uploaded {} bytes in {elapsed:.2}s ({bps:.0} bits/s)", self.upload_bytes);
        Ok(bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_derived_from_endpoint_host() {
        let provider = HttpMeasurementProvider::new(Duration::from_secs(10)).unwrap();
        let server = provider.server_from_url().unwrap();
        assert_eq!(server.host, "speed.cloudflare.com");
        assert_eq!(server.describe(), "speed.cloudflare.com (HTTP endpoint)");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let provider = HttpMeasurementProvider::with_endpoints(
            Duration::from_secs(10),
            "not a url".to_string(),
            "also not".to_string(),
        )
        .unwrap();
        assert!(provider.server_from_url().is_err());
    }
}
