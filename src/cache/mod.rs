//! Widget cache file
//!
//! Desktop-shell widgets cannot call into the engine, so a small JSON
//! snapshot of the latest result is written after every completed test
//! for out-of-process readers. Cache writes are best-effort: every
//! failure is logged and otherwise ignored.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, warn};
use serde::Serialize;

use crate::engine::result::TestResult;

#[derive(Debug, Serialize)]
struct WidgetCache<'a> {
    status: &'a str,
    download: f64,
    upload: f64,
    ping: f64,
    server: &'a str,
    timestamp: String,
    is_valid: bool,
    warnings: &'a [String],
}

/// Default location of the cache document:
/// `<cache_dir>/speedwatch/widget_cache.json`.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("speedwatch").join("widget_cache.json"))
}

/// Writes the cache snapshot to the default location. Non-fatal.
pub fn write_widget_cache(result: &TestResult) {
    match default_cache_path() {
        Some(path) => write_widget_cache_to(&path, result),
        None => warn!("No cache directory available, skipping widget cache update"),
    }
}

/// Writes the cache snapshot to `path`, creating parent directories as
/// needed. Non-fatal: failures are logged.
pub fn write_widget_cache_to(path: &Path, result: &TestResult) {
    match try_write(path, result) {
        Ok(()) => debug!("Widget cache updated: {}", path.display()),
        Err(e) => warn!("Failed to update widget cache: {e:#}"),
    }
}

fn try_write(path: &Path, result: &TestResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
    }

    let timestamp = format_timestamp(result.timestamp);
    let cache = WidgetCache {
        status: if result.is_valid { "success" } else { "error" },
        download: (result.download_mbps * 10.0).round() / 10.0,
        upload: (result.upload_mbps * 10.0).round() / 10.0,
        ping: result.ping_ms.round(),
        server: &result.server_info,
        timestamp,
        is_valid: result.is_valid,
        warnings: &result.warnings,
    };

    let contents = serde_json::to_string_pretty(&cache)?;
    std::fs::write(path, contents).context("Failed to write cache file")?;
    Ok(())
}

fn format_timestamp(epoch_seconds: f64) -> String {
    let secs = epoch_seconds.trunc() as i64;
    let nanos = (epoch_seconds.fract() * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
