//! Measurement provider seam
//!
//! The engine drives an external measurement provider through this narrow
//! interface. The wire protocol behind it (server discovery, throughput
//! sampling) is the provider's concern; the engine only sees servers,
//! raw bits-per-second figures, and a latency estimate.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a measurement provider. The engine converts these
/// into invalid test results; it never propagates them to callers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unable to retrieve speedtest configuration")]
    Config,

    #[error("No servers found")]
    NoServers,

    #[error("Connection error: {0}")]
    Network(String),

    #[error("Timeout: operation did not complete within {0:.0} seconds")]
    Timeout(f64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Human-readable descriptor of a measurement server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub sponsor: String,
    pub name: String,
    pub host: String,
}

impl ServerInfo {
    /// Display form used in results, e.g. "Example ISP (Helsinki)".
    pub fn describe(&self) -> String {
        format!("{} ({})", self.sponsor, self.name)
    }
}

/// A chosen server together with the latency observed while selecting it.
#[derive(Debug, Clone)]
pub struct ServerSelection {
    pub server: ServerInfo,
    pub latency_ms: f64,
}

/// External collaborator performing the actual network measurement.
///
/// Implementations own their network resources and release them when
/// dropped, so the engine holds no cleanup obligations on any exit path.
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Cheap bounded handshake used by the connectivity check.
    async fn connectivity_probe(&self, timeout: Duration) -> Result<(), ProviderError>;

    /// Fetches the list of candidate measurement servers.
    async fn get_servers(&self) -> Result<Vec<ServerInfo>, ProviderError>;

    /// Picks the best server from `servers` and reports its latency.
    async fn select_best_server(
        &self,
        servers: &[ServerInfo],
    ) -> Result<ServerSelection, ProviderError>;

    /// Measures download throughput, in bits per second.
    async fn download(&self) -> Result<f64, ProviderError>;

    /// Measures upload throughput, in bits per second.
    async fn upload(&self) -> Result<f64, ProviderError>;
}
