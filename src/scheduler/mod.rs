//! Scheduled background testing
//!
//! Runs retry-controlled tests on a fixed interval. Firing decisions use
//! a monotonic clock so the schedule survives wall-clock adjustments
//! (DST, NTP slew); wall-clock values are kept for display only. Multiple
//! runners are independently constructible and controllable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::cache;
use crate::config::SpeedTestConfig;
use crate::engine::retry::run_with_retry;
use crate::engine::tester::SpeedTestEngine;
use crate::storage::ResultStore;

/// Sleep bounds for the scheduler loop: responsive to stop requests
/// without busy-looping.
const MIN_SLEEP: Duration = Duration::from_secs(1);
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Bounded wait for the loop to observe a stop request.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler state snapshot. Elapsed time comes from the monotonic
/// reference; the date-time strings are wall-clock display values.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub tests_completed: u64,
    pub tests_failed: u64,
    pub runtime_seconds: Option<f64>,
    pub next_test_time: Option<String>,
    pub start_time: Option<String>,
}

/// State shared between the runner handle and its loop task.
struct SchedulerShared {
    running: AtomicBool,
    stop_notify: Notify,
    tests_completed: AtomicU64,
    tests_failed: AtomicU64,
    start_instant: Mutex<Option<Instant>>,
    start_time: Mutex<Option<DateTime<Local>>>,
    next_test_time: Mutex<Option<DateTime<Local>>>,
}

/// Runs speed tests on a schedule against one engine and one store.
pub struct ScheduledRunner {
    interval: Duration,
    engine: Arc<SpeedTestEngine>,
    store: Arc<ResultStore>,
    config: Arc<SpeedTestConfig>,
    cache_path: Option<PathBuf>,
    shared: Arc<SchedulerShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledRunner {
    pub fn new(
        interval: Duration,
        engine: Arc<SpeedTestEngine>,
        store: Arc<ResultStore>,
        config: Arc<SpeedTestConfig>,
    ) -> Self {
        Self {
            interval,
            engine,
            store,
            config,
            cache_path: cache::default_cache_path(),
            shared: Arc::new(SchedulerShared {
                running: AtomicBool::new(false),
                stop_notify: Notify::new(),
                tests_completed: AtomicU64::new(0),
                tests_failed: AtomicU64::new(0),
                start_instant: Mutex::new(None),
                start_time: Mutex::new(None),
                next_test_time: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Redirects (or with `None` disables) the widget cache file.
    pub fn with_cache_path(mut self, cache_path: Option<PathBuf>) -> Self {
        self.cache_path = cache_path;
        self
    }

    /// Starts the scheduler loop. The first test fires immediately.
    /// No-op when already running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let now = Local::now();
        *self.shared.start_instant.lock().unwrap() = Some(Instant::now());
        *self.shared.start_time.lock().unwrap() = Some(now);
        *self.shared.next_test_time.lock().unwrap() = Some(now);
        self.shared.tests_completed.store(0, Ordering::SeqCst);
        self.shared.tests_failed.store(0, Ordering::SeqCst);

        let interval = self.interval;
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let cache_path = self.cache_path.clone();
        let shared = Arc::clone(&self.shared);

        *self.task.lock().unwrap() = Some(tokio::spawn(async move {
            scheduler_loop(interval, engine, store, config, cache_path, shared).await;
        }));

        info!(
            "Scheduler started - testing every {} minutes",
            self.interval.as_secs() / 60
        );
    }

    /// Signals the loop to stop and waits up to five seconds for it to
    /// exit. No-op when not running.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stop_notify.notify_one();

        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
                warn!("Scheduler loop did not stop within {STOP_TIMEOUT:?}, detaching");
            }
        }
        info!("Scheduler stopped");
    }

    /// Runs one scheduled-style test outside the timer.
    pub async fn run_immediate(&self) {
        info!("Running immediate test");
        run_scheduled_test(
            &self.engine,
            &self.store,
            &self.config,
            self.cache_path.as_deref(),
            &self.shared,
        )
        .await;
    }

    pub fn status(&self) -> SchedulerStatus {
        let runtime_seconds = self
            .shared
            .start_instant
            .lock()
            .unwrap()
            .map(|start| start.elapsed().as_secs_f64());

        SchedulerStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            interval_minutes: self.interval.as_secs() / 60,
            tests_completed: self.shared.tests_completed.load(Ordering::SeqCst),
            tests_failed: self.shared.tests_failed.load(Ordering::SeqCst),
            runtime_seconds,
            next_test_time: self
                .shared
                .next_test_time
                .lock()
                .unwrap()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            start_time: self
                .shared
                .start_time
                .lock()
                .unwrap()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

/// The scheduler loop. Monotonic time decides firing; the loop re-checks
/// the stop signal at every sleep boundary.
async fn scheduler_loop(
    interval: Duration,
    engine: Arc<SpeedTestEngine>,
    store: Arc<ResultStore>,
    config: Arc<SpeedTestConfig>,
    cache_path: Option<PathBuf>,
    shared: Arc<SchedulerShared>,
) {
    let mut next_fire = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        if Instant::now() >= next_fire {
            run_scheduled_test(&engine, &store, &config, cache_path.as_deref(), &shared).await;

            next_fire = Instant::now() + interval;
            let display = Local::now()
                + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
            *shared.next_test_time.lock().unwrap() = Some(display);
            info!("Next test: {}", display.format("%Y-%m-%d %H:%M:%S"));
        }

        let remaining = next_fire.saturating_duration_since(Instant::now());
        let sleep_for = remaining.clamp(MIN_SLEEP, MAX_SLEEP);
        tokio::select! {
            _ = shared.stop_notify.notified() => {}
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    debug!("Scheduler loop exited");
}

/// One scheduled test: connectivity check, retry-controlled run,
/// persistence, widget cache. Runs the test on its own task so an
/// unexpected panic is contained and the loop keeps scheduling.
async fn run_scheduled_test(
    engine: &Arc<SpeedTestEngine>,
    store: &Arc<ResultStore>,
    config: &Arc<SpeedTestConfig>,
    cache_path: Option<&std::path::Path>,
    shared: &Arc<SchedulerShared>,
) {
    let started = Instant::now();
    info!(
        "Starting scheduled test at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    if !engine.check_connectivity().await {
        warn!("No network connection - skipping test");
        shared.tests_failed.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let runner = Arc::clone(engine);
    let outcome = tokio::spawn(async move { run_with_retry(&runner).await }).await;
    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Unexpected error during scheduled test: {e}");
            shared.tests_failed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    };

    if result.is_valid {
        if config.save_results_to_database {
            // A failed save keeps the in-memory result intact; the
            // scheduler only logs and moves on.
            if let Err(e) = store.save(&result) {
                error!("Failed to save result to database: {e:#}");
            }
        }
        shared.tests_completed.fetch_add(1, Ordering::SeqCst);
        info!(
            "Test completed in {:.1}s: {:.1}/{:.1} Mbps, {:.0} ms",
            started.elapsed().as_secs_f64(),
            result.download_mbps,
            result.upload_mbps,
            result.ping_ms
        );
        if !result.warnings.is_empty() {
            warn!("Warnings: {}", result.warnings.join("; "));
        }
    } else {
        shared.tests_failed.fetch_add(1, Ordering::SeqCst);
        let reason = if result.warnings.is_empty() {
            "Unknown error".to_string()
        } else {
            result.warnings.join("; ")
        };
        warn!("Scheduled test failed: {reason}");
    }

    if let Some(path) = cache_path {
        cache::write_widget_cache_to(path, &result);
    }
}
