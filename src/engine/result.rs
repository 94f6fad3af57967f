//! Test result value object

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Outcome of one speed test attempt. Created by the engine when an
/// attempt finishes and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Download throughput in Mbps
    pub download_mbps: f64,
    /// Upload throughput in Mbps
    pub upload_mbps: f64,
    /// Ping latency in milliseconds
    pub ping_ms: f64,
    /// Human-readable descriptor of the server used
    pub server_info: String,
    /// False when the measurement failed or was implausible
    pub is_valid: bool,
    /// Ordered warnings accumulated during the attempt
    pub warnings: Vec<String>,
    /// True when the attempt was cancelled before completing
    pub is_cancelled: bool,
    /// Creation time, seconds since the Unix epoch
    pub timestamp: f64,
}

impl TestResult {
    /// A completed measurement; validity and warnings come from the
    /// validation pass.
    pub fn completed(
        download_mbps: f64,
        upload_mbps: f64,
        ping_ms: f64,
        server_info: String,
        is_valid: bool,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            download_mbps,
            upload_mbps,
            ping_ms,
            server_info,
            is_valid,
            warnings,
            is_cancelled: false,
            timestamp: now_epoch_seconds(),
        }
    }

    /// An attempt that failed outright, carrying the reason as its only
    /// warning.
    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            download_mbps: 0.0,
            upload_mbps: 0.0,
            ping_ms: 0.0,
            server_info: String::new(),
            is_valid: false,
            warnings: vec![warning.into()],
            is_cancelled: false,
            timestamp: now_epoch_seconds(),
        }
    }

    /// An attempt stopped by the cancellation signal. Cancelled results
    /// are never valid.
    pub fn cancelled() -> Self {
        Self {
            download_mbps: 0.0,
            upload_mbps: 0.0,
            ping_ms: 0.0,
            server_info: String::new(),
            is_valid: false,
            warnings: Vec::new(),
            is_cancelled: true,
            timestamp: now_epoch_seconds(),
        }
    }
}

fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
