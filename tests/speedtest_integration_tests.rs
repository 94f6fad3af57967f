//! End-to-end scenarios over the public engine API with a scripted
//! measurement provider.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use speedwatch::config::SpeedTestConfig;
use speedwatch::engine::provider::{
    MeasurementProvider, ProviderError, ServerInfo, ServerSelection,
};
use speedwatch::engine::retry::run_with_retry;
use speedwatch::engine::runner::BackgroundRunner;
use speedwatch::engine::tester::SpeedTestEngine;

/// Scripted provider: fixed raw readings, an optional number of leading
/// failures, and an optional download delay for cancellation tests.
struct ScriptedProvider {
    download_bps: f64,
    upload_bps: f64,
    latency_ms: f64,
    failures_before_success: u32,
    failure: Option<fn() -> ProviderError>,
    download_delay: Duration,
    attempts: AtomicU32,
}

impl ScriptedProvider {
    fn measuring(download_bps: f64, upload_bps: f64, latency_ms: f64) -> Self {
        Self {
            download_bps,
            upload_bps,
            latency_ms,
            failures_before_success: 0,
            failure: None,
            download_delay: Duration::ZERO,
            attempts: AtomicU32::new(0),
        }
    }

    fn failing(failure: fn() -> ProviderError, failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            failure: Some(failure),
            ..Self::measuring(500_000_000.0, 100_000_000.0, 20.0)
        }
    }
}

#[async_trait]
impl MeasurementProvider for ScriptedProvider {
    async fn connectivity_probe(&self, _timeout: Duration) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_servers(&self) -> Result<Vec<ServerInfo>, ProviderError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure {
            if attempt < self.failures_before_success {
                return Err(failure());
            }
        }
        Ok(vec![ServerInfo {
            sponsor: "Example ISP".to_string(),
            name: "Helsinki".to_string(),
            host: "speedtest.example.net".to_string(),
        }])
    }

    async fn select_best_server(
        &self,
        servers: &[ServerInfo],
    ) -> Result<ServerSelection, ProviderError> {
        Ok(ServerSelection {
            server: servers[0].clone(),
            latency_ms: self.latency_ms,
        })
    }

    async fn download(&self) -> Result<f64, ProviderError> {
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        Ok(self.download_bps)
    }

    async fn upload(&self) -> Result<f64, ProviderError> {
        Ok(self.upload_bps)
    }
}

fn engine_over(provider: ScriptedProvider) -> SpeedTestEngine {
    let mut config = SpeedTestConfig::default();
    config.retry_delay = 1.0;
    SpeedTestEngine::new(Arc::new(config), Arc::new(provider))
}

#[tokio::test]
async fn test_scenario_typical_measurement_is_clean() {
    // 500,000,000 / 100,000,000 bits per second and 20 ms against the
    // default ceilings: valid, no warnings, displayed as 500.0/100.0 Mbps.
    let engine = engine_over(ScriptedProvider::measuring(
        500_000_000.0,
        100_000_000.0,
        20.0,
    ));
    let result = run_with_retry(&engine).await;

    assert!(result.is_valid);
    assert!(result.warnings.is_empty());
    assert_eq!(result.download_mbps, 500.0);
    assert_eq!(result.upload_mbps, 100.0);
    assert_eq!(result.ping_ms, 20.0);
}

#[tokio::test]
async fn test_scenario_unusually_fast_download_is_annotated() {
    // 2 Gbps with the 1 Gbps typical ceiling: still valid, one warning
    // naming the observed speed.
    let engine = engine_over(ScriptedProvider::measuring(
        2_000_000_000.0,
        100_000_000.0,
        20.0,
    ));
    let result = run_with_retry(&engine).await;

    assert!(result.is_valid);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("2.0 Gbps"));
}

#[tokio::test]
async fn test_scenario_absurd_ping_is_rejected() {
    // 15000 ms with the 10000 ms reasonable ceiling: invalid.
    let engine = engine_over(ScriptedProvider::measuring(
        500_000_000.0,
        100_000_000.0,
        15_000.0,
    ));
    let result = run_with_retry(&engine).await;

    assert!(!result.is_valid);
    assert!(result.warnings[0].contains("Extremely high ping"));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_exhausted_retries() {
    // Three consecutive retryable failures with max_retries=3 exhaust
    // every attempt.
    let engine = engine_over(ScriptedProvider::failing(
        || ProviderError::Network("connection reset by peer".to_string()),
        u32::MAX,
    ));
    let result = run_with_retry(&engine).await;

    assert!(!result.is_valid);
    assert_eq!(result.warnings, vec!["All retry attempts failed"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers() {
    let engine = engine_over(ScriptedProvider::failing(
        || ProviderError::Network("connection reset by peer".to_string()),
        2,
    ));
    let result = run_with_retry(&engine).await;

    assert!(result.is_valid);
    assert_eq!(result.download_mbps, 500.0);
}

#[tokio::test]
async fn test_non_retryable_failure_returns_immediately() {
    let engine = engine_over(ScriptedProvider::failing(
        || ProviderError::Protocol("invalid input".to_string()),
        u32::MAX,
    ));
    let result = run_with_retry(&engine).await;

    assert!(!result.is_valid);
    assert!(result.warnings[0].contains("invalid input"));
}

#[tokio::test]
async fn test_cancellation_during_download_stage() {
    let engine = Arc::new(engine_over(ScriptedProvider {
        download_delay: Duration::from_millis(300),
        ..ScriptedProvider::measuring(500_000_000.0, 100_000_000.0, 20.0)
    }));

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.set_progress_callback(Box::new(move |label, _progress| {
        sink.lock().unwrap().push(label.to_string());
    }));

    let runner = Arc::clone(&engine);
    let task = tokio::spawn(async move { run_with_retry(&runner).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel();

    let result = task.await.unwrap();
    assert!(result.is_cancelled);
    assert!(!result.is_valid);

    // No later-stage notifications after the cancellation checkpoint.
    let labels = seen.lock().unwrap();
    assert!(labels.iter().any(|l| l.contains("download")));
    assert!(!labels.iter().any(|l| l.contains("upload")));
    assert!(!labels.iter().any(|l| l.contains("Processing")));
}

#[tokio::test]
async fn test_background_runner_contract() {
    let engine = Arc::new(engine_over(ScriptedProvider::measuring(
        500_000_000.0,
        100_000_000.0,
        20.0,
    )));
    let mut runner = BackgroundRunner::new(engine);

    runner.start_test();
    let mut waited = 0;
    while runner.is_running() && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }

    let result = runner.get_result().expect("result should be delivered");
    assert!(result.is_valid);

    let mut saw_completion = false;
    while let Some(update) = runner.get_progress() {
        if update.message.contains("completed") {
            saw_completion = true;
            assert_eq!(update.progress, Some(1.0));
        }
    }
    assert!(saw_completion);
}
