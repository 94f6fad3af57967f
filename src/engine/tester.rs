//! Core speed test engine
//!
//! Drives one measurement attempt against the provider as a sequential
//! state machine with progress notifications and cooperative
//! cancellation. Every provider call is bounded by the configured
//! timeout; every provider error is converted into an invalid result
//! instead of propagating.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::SpeedTestConfig;
use crate::engine::provider::{MeasurementProvider, ProviderError};
use crate::engine::result::TestResult;
use crate::engine::validation::validate_raw_measurement;

/// Stages of one test attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStage {
    Idle,
    Initializing,
    FetchingServers,
    SelectingServer,
    Downloading,
    Uploading,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl TestStage {
    /// Stage label delivered to progress callbacks.
    pub fn label(&self) -> &'static str {
        match self {
            TestStage::Idle => "Idle",
            TestStage::Initializing => "Initializing speed test...",
            TestStage::FetchingServers => "Fetching server list...",
            TestStage::SelectingServer => "Selecting best server...",
            TestStage::Downloading => "Testing download speed...",
            TestStage::Uploading => "Testing upload speed...",
            TestStage::Finalizing => "Processing results...",
            TestStage::Completed => "Test completed!",
            TestStage::Cancelled => "Test cancelled",
            TestStage::Failed => "Test failed",
        }
    }

    /// Nominal progress fraction, or None for indeterminate stages.
    pub fn progress(&self) -> Option<f64> {
        match self {
            TestStage::Idle => None,
            TestStage::Initializing => Some(0.1),
            TestStage::FetchingServers => Some(0.2),
            TestStage::SelectingServer => Some(0.3),
            TestStage::Downloading => Some(0.4),
            TestStage::Uploading => Some(0.7),
            TestStage::Finalizing => Some(0.9),
            TestStage::Completed => Some(1.0),
            TestStage::Cancelled | TestStage::Failed => None,
        }
    }
}

/// Progress notification callback: `(stage_label, fraction_or_indeterminate)`.
pub type ProgressCallback = Box<dyn Fn(&str, Option<f64>) + Send + Sync>;

/// Orchestrates one test attempt against a measurement provider.
///
/// All methods take `&self`, so an engine wrapped in `Arc` can be driven
/// from one task and cancelled from another.
pub struct SpeedTestEngine {
    config: Arc<SpeedTestConfig>,
    provider: Arc<dyn MeasurementProvider>,
    progress_callback: Mutex<Option<ProgressCallback>>,
    cancel_flag: AtomicBool,
}

impl SpeedTestEngine {
    pub fn new(config: Arc<SpeedTestConfig>, provider: Arc<dyn MeasurementProvider>) -> Self {
        Self {
            config,
            provider,
            progress_callback: Mutex::new(None),
            cancel_flag: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SpeedTestConfig {
        &self.config
    }

    /// Registers the progress callback, replacing any previous one.
    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        *self.progress_callback.lock().unwrap() = Some(callback);
    }

    /// Signals cancellation. Idempotent; takes effect at the next stage
    /// boundary or backoff-sleep tick.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Clears the cancellation signal before a new logical test. Owners
    /// call this once per test, not per attempt, so a cancel fired
    /// between retry attempts stays effective.
    pub fn reset(&self) {
        self.cancel_flag.store(false, Ordering::SeqCst);
    }

    /// Invokes the progress callback under its lock. A panicking callback
    /// is logged and never aborts the test in progress.
    fn update_progress(&self, stage: TestStage) {
        let guard = self.progress_callback.lock().unwrap();
        if let Some(callback) = guard.as_ref() {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                callback(stage.label(), stage.progress())
            }));
            if outcome.is_err() {
                error!("Progress callback panicked during stage {stage:?}");
            }
        }
    }

    /// Reports whether the provider is reachable within the configured
    /// connectivity timeout. Every error maps to `false`.
    pub async fn check_connectivity(&self) -> bool {
        let timeout = Duration::from_secs_f64(self.config.connectivity_check_timeout);
        match tokio::time::timeout(timeout, self.provider.connectivity_probe(timeout)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Connectivity probe failed: {e}");
                false
            }
            Err(_) => {
                debug!(
                    "Connectivity probe timed out after {:.0}s",
                    self.config.connectivity_check_timeout
                );
                false
            }
        }
    }

    /// Executes one full test attempt. Provider errors become an invalid
    /// result carrying the reason; they never propagate.
    pub async fn run_once(&self) -> TestResult {
        match self.run_stages().await {
            Ok(result) => result,
            Err(e) => {
                warn!("Speed test attempt failed: {e}");
                TestResult::failed(e.to_string())
            }
        }
    }

    /// Wraps a provider call in the configured per-operation timeout.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let timeout = Duration::from_secs_f64(self.config.speedtest_timeout);
        match tokio::time::timeout(timeout, operation).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout(self.config.speedtest_timeout)),
        }
    }

    /// The state machine proper. The cancellation signal is checked
    /// before every stage transition; once observed, no further stage
    /// runs and no further stage progress is emitted.
    async fn run_stages(&self) -> Result<TestResult, ProviderError> {
        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::Initializing);

        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::FetchingServers);
        let servers = self.bounded(self.provider.get_servers()).await?;
        if servers.is_empty() {
            return Err(ProviderError::NoServers);
        }

        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::SelectingServer);
        let selection = self.bounded(self.provider.select_best_server(&servers)).await?;
        let server_info = selection.server.describe();
        debug!("Using server: {server_info}");

        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::Downloading);
        let download_bps = self.bounded(self.provider.download()).await?;

        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::Uploading);
        let upload_bps = self.bounded(self.provider.upload()).await?;

        if self.is_cancelled() {
            return Ok(self.cancelled_result());
        }
        self.update_progress(TestStage::Finalizing);

        let ping_ms = selection.latency_ms;
        let outcome = validate_raw_measurement(download_bps, upload_bps, ping_ms, &self.config);
        let result = TestResult::completed(
            download_bps / self.config.bits_to_mbps,
            upload_bps / self.config.bits_to_mbps,
            ping_ms,
            server_info,
            outcome.is_valid,
            outcome.warnings,
        );

        info!(
            "Test attempt finished: {:.1}/{:.1} Mbps, {:.0} ms, valid={}",
            result.download_mbps, result.upload_mbps, result.ping_ms, result.is_valid
        );
        self.update_progress(TestStage::Completed);
        Ok(result)
    }

    fn cancelled_result(&self) -> TestResult {
        info!("Speed test cancelled before completion");
        self.update_progress(TestStage::Cancelled);
        TestResult::cancelled()
    }
}
