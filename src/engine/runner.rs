//! Background test runner for polling front ends
//!
//! GUI-style callers cannot block on `run_with_retry`, so this runner
//! spawns it on a task and exposes non-blocking progress polling, a
//! single-slot result, and a cooperative cancel with a bounded join
//! wait. The task is detached after the wait, so a slow provider can
//! finish on its own without blocking the owner.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::engine::result::TestResult;
use crate::engine::retry::run_with_retry;
use crate::engine::tester::SpeedTestEngine;

/// Grace period granted to an in-flight test after cancellation.
const CANCEL_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One progress notification, as delivered to the engine callback.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub message: String,
    pub progress: Option<f64>,
}

/// Runs retry-controlled tests on a background task.
pub struct BackgroundRunner {
    engine: Arc<SpeedTestEngine>,
    progress_rx: UnboundedReceiver<ProgressUpdate>,
    progress_tx: UnboundedSender<ProgressUpdate>,
    result_slot: Arc<Mutex<Option<TestResult>>>,
    task: Option<JoinHandle<()>>,
}

impl BackgroundRunner {
    pub fn new(engine: Arc<SpeedTestEngine>) -> Self {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            progress_rx,
            progress_tx,
            result_slot: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    /// Starts a test unless one is already running.
    pub fn start_test(&mut self) {
        if self.is_running() {
            return;
        }

        let sender = self.progress_tx.clone();
        self.engine.set_progress_callback(Box::new(move |message, progress| {
            let _ = sender.send(ProgressUpdate {
                message: message.to_string(),
                progress,
            });
        }));

        let engine = Arc::clone(&self.engine);
        let slot = Arc::clone(&self.result_slot);
        self.task = Some(tokio::spawn(async move {
            let result = run_with_retry(&engine).await;
            *slot.lock().unwrap() = Some(result);
        }));
    }

    /// Latest progress update, if one is queued. Never blocks.
    pub fn get_progress(&mut self) -> Option<ProgressUpdate> {
        self.progress_rx.try_recv().ok()
    }

    /// Takes the finished result out of the slot, if the test completed.
    pub fn get_result(&self) -> Option<TestResult> {
        self.result_slot.lock().unwrap().take()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the in-flight test and waits up to five seconds for the
    /// task to observe the signal. A task that overruns the wait is
    /// detached, not aborted.
    pub async fn cancel_test(&mut self) {
        self.engine.cancel();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(CANCEL_JOIN_TIMEOUT, task).await.is_err() {
                warn!("Cancelled test did not exit within the grace period, detaching");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeedTestConfig;
    use crate::engine::provider::{
        MeasurementProvider, ProviderError, ServerInfo, ServerSelection,
    };
    use async_trait::async_trait;

    struct SlowProvider {
        download_delay: Duration,
    }

    #[async_trait]
    impl MeasurementProvider for SlowProvider {
        async fn connectivity_probe(&self, _timeout: Duration) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_servers(&self) -> Result<Vec<ServerInfo>, ProviderError> {
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
                latency_ms: 20.0,
            })
        }

        async fn download(&self) -> Result<f64, ProviderError> {
            tokio::time::sleep(self.download_delay).await;
            Ok(500_000_000.0)
        }

        async fn upload(&self) -> Result<f64, ProviderError> {
            Ok(100_000_000.0)
        }
    }

    fn runner_with_delay(delay: Duration) -> BackgroundRunner {
        let engine = Arc::new(SpeedTestEngine::new(
            Arc::new(SpeedTestConfig::default()),
            Arc::new(SlowProvider { download_delay: delay }),
        ));
        BackgroundRunner::new(engine)
    }

    #[tokio::test]
    async fn test_runner_delivers_progress_and_result() {
        let mut runner = runner_with_delay(Duration::ZERO);
        runner.start_test();

        // Wait for the background task to finish, then drain.
        let mut waited = 0;
        while runner.is_running() && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        let result = runner.get_result().expect("result should be ready");
        assert!(result.is_valid);
        // Result slot is single-shot.
        assert!(runner.get_result().is_none());

        let mut messages = Vec::new();
        while let Some(update) = runner.get_progress() {
            messages.push(update.message);
        }
        assert!(messages.iter().any(|m| m.contains("download")));
        assert!(messages.iter().any(|m| m.contains("completed")));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let mut runner = runner_with_delay(Duration::from_millis(300));
        runner.start_test();
        assert!(runner.is_running());
        runner.start_test(); // no-op
        runner.cancel_test().await;
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_cancel_yields_cancelled_result() {
        let mut runner = runner_with_delay(Duration::from_millis(500));
        runner.start_test();
        tokio::time::sleep(Duration::from_millis(50)).await;
        runner.cancel_test().await;

        let result = runner.get_result().expect("cancelled result should be stored");
        assert!(result.is_cancelled);
        assert!(!result.is_valid);
    }
}
