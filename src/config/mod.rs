//! Configuration loading and validation
//!
//! Loads `SpeedTestConfig` from a JSON file merged over compiled-in
//! defaults. Loading never fails hard: a missing file means defaults, a
//! malformed file is logged and replaced by defaults, and an individual
//! field that is out of range, of the wrong type, or logically
//! inconsistent reverts to its own default while the rest of the file is
//! kept.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a configuration field, used by the validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Float,
    Integer,
    Bool,
}

/// Declarative rule for one configuration field. The rule table below is
/// the single source of truth for validation; defaults come from
/// `SpeedTestConfig::default()`.
struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    min: f64,
    max: f64,
}

/// Validation rules for every known configuration key. Bounds are
/// inclusive; booleans carry no range.
const FIELD_RULES: &[FieldRule] = &[
    FieldRule { name: "bits_to_mbps", kind: FieldKind::Float, min: 1e3, max: 1e9 },
    FieldRule { name: "connectivity_check_timeout", kind: FieldKind::Float, min: 1.0, max: 120.0 },
    FieldRule { name: "speedtest_timeout", kind: FieldKind::Float, min: 10.0, max: 600.0 },
    FieldRule { name: "max_retries", kind: FieldKind::Integer, min: 1.0, max: 10.0 },
    FieldRule { name: "retry_delay", kind: FieldKind::Float, min: 1.0, max: 60.0 },
    FieldRule { name: "max_typical_speed_gbps", kind: FieldKind::Float, min: 0.001, max: 100.0 },
    FieldRule { name: "max_reasonable_speed_gbps", kind: FieldKind::Float, min: 0.001, max: 1000.0 },
    FieldRule { name: "max_typical_ping_ms", kind: FieldKind::Float, min: 1.0, max: 60_000.0 },
    FieldRule { name: "max_reasonable_ping_ms", kind: FieldKind::Float, min: 1.0, max: 120_000.0 },
    FieldRule { name: "show_detailed_progress", kind: FieldKind::Bool, min: 0.0, max: 0.0 },
    FieldRule { name: "save_results_to_database", kind: FieldKind::Bool, min: 0.0, max: 0.0 },
];

/// Tunable parameters for speed testing. Immutable after load; share via
/// `Arc` across tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestConfig {
    /// Divisor converting raw bits/s to Mbps
    pub bits_to_mbps: f64,
    /// Timeout for the connectivity probe, in seconds
    pub connectivity_check_timeout: f64,
    /// Per-operation timeout during a speed test, in seconds
    pub speedtest_timeout: f64,
    /// Maximum test attempts, including the first
    pub max_retries: u32,
    /// Base delay between retry attempts, in seconds
    pub retry_delay: f64,
    /// Soft ceiling: speeds above this are annotated but accepted (Gbps)
    pub max_typical_speed_gbps: f64,
    /// Hard ceiling: speeds above this are rejected as measurement errors (Gbps)
    pub max_reasonable_speed_gbps: f64,
    /// Soft ceiling for ping latency (ms)
    pub max_typical_ping_ms: f64,
    /// Hard ceiling for ping latency (ms)
    pub max_reasonable_ping_ms: f64,
    /// Emit per-stage progress detail in front ends
    pub show_detailed_progress: bool,
    /// Persist valid results to the result store
    pub save_results_to_database: bool,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            bits_to_mbps: 1_000_000.0,
            connectivity_check_timeout: 10.0,
            speedtest_timeout: 60.0,
            max_retries: 3,
            retry_delay: 2.0,
            max_typical_speed_gbps: 1.0,
            max_reasonable_speed_gbps: 10.0,
            max_typical_ping_ms: 1000.0,
            max_reasonable_ping_ms: 10_000.0,
            show_detailed_progress: true,
            save_results_to_database: true,
        }
    }
}

impl SpeedTestConfig {
    /// Loads configuration from `path`, merging valid fields over the
    /// defaults. Never fails: every problem degrades to the affected
    /// field's default and a warning in the log.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut config = Self::default();

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return config;
        }

        let contents = match read_locked(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Could not read config file {}: {e}, using defaults", path.display());
                return config;
            }
        };

        let parsed: Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed JSON in {}: {e}, using defaults", path.display());
                return config;
            }
        };

        let Value::Object(map) = parsed else {
            warn!("Config file {} is not a JSON object, using defaults", path.display());
            return config;
        };

        for (key, value) in &map {
            match FIELD_RULES.iter().find(|r| r.name == key.as_str()) {
                Some(rule) => {
                    if let Err(reason) = config.apply_field(rule, value) {
                        warn!("{key}: {reason}, keeping default");
                    }
                }
                None => warn!("Unknown configuration key '{key}' ignored"),
            }
        }

        config.repair_ceilings();
        info!("Configuration loaded from {}", path.display());
        config
    }

    /// Writes a pretty-printed default config to `path` unless the file
    /// already exists. Returns false when it does.
    pub fn create_sample<P: AsRef<Path>>(path: P) -> anyhow::Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        let defaults = serde_json::to_string_pretty(&Self::default())?;
        std::fs::write(path, defaults)?;
        Ok(true)
    }

    /// Validates `value` against `rule` and assigns it on success.
    fn apply_field(&mut self, rule: &FieldRule, value: &Value) -> Result<(), String> {
        match rule.kind {
            FieldKind::Bool => {
                let Some(flag) = value.as_bool() else {
                    return Err(format!("expected a boolean, got {value}"));
                };
                match rule.name {
                    "show_detailed_progress" => self.show_detailed_progress = flag,
                    "save_results_to_database" => self.save_results_to_database = flag,
                    _ => unreachable!("unhandled boolean field {}", rule.name),
                }
            }
            FieldKind::Integer | FieldKind::Float => {
                let Some(number) = value.as_f64() else {
                    return Err(format!("expected a number, got {value}"));
                };
                if rule.kind == FieldKind::Integer && number.fract() != 0.0 {
                    return Err(format!("expected an integer, got {number}"));
                }
                if number < rule.min || number > rule.max {
                    return Err(format!(
                        "value {number} is outside the allowed range [{}, {}]",
                        rule.min, rule.max
                    ));
                }
                match rule.name {
                    "bits_to_mbps" => self.bits_to_mbps = number,
                    "connectivity_check_timeout" => self.connectivity_check_timeout = number,
                    "speedtest_timeout" => self.speedtest_timeout = number,
                    "max_retries" => self.max_retries = number as u32,
                    "retry_delay" => self.retry_delay = number,
                    "max_typical_speed_gbps" => self.max_typical_speed_gbps = number,
                    "max_reasonable_speed_gbps" => self.max_reasonable_speed_gbps = number,
                    "max_typical_ping_ms" => self.max_typical_ping_ms = number,
                    "max_reasonable_ping_ms" => self.max_reasonable_ping_ms = number,
                    _ => unreachable!("unhandled numeric field {}", rule.name),
                }
            }
        }
        Ok(())
    }

    /// Enforces typical < reasonable for both ceiling pairs. The repair is
    /// asymmetric: the typical value reverts to its default, the
    /// reasonable value is kept as given. Single pass.
    fn repair_ceilings(&mut self) {
        let defaults = Self::default();
        if self.max_typical_speed_gbps >= self.max_reasonable_speed_gbps {
            warn!(
                "max_typical_speed_gbps ({}) must be below max_reasonable_speed_gbps ({}), reverting to default",
                self.max_typical_speed_gbps, self.max_reasonable_speed_gbps
            );
            self.max_typical_speed_gbps = defaults.max_typical_speed_gbps;
        }
        if self.max_typical_ping_ms >= self.max_reasonable_ping_ms {
            warn!(
                "max_typical_ping_ms ({}) must be below max_reasonable_ping_ms ({}), reverting to default",
                self.max_typical_ping_ms, self.max_reasonable_ping_ms
            );
            self.max_typical_ping_ms = defaults.max_typical_ping_ms;
        }
    }
}

/// Reads the whole file while holding a shared advisory lock, so a reader
/// never observes a half-written config. Lock failure degrades to an
/// unlocked read.
fn read_locked(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let locked = match fs2::FileExt::lock_shared(&file) {
        Ok(()) => true,
        Err(e) => {
            debug!("Shared lock on {} unavailable: {e}", path.display());
            false
        }
    };
    let mut contents = String::new();
    let read = file.read_to_string(&mut contents);
    if locked {
        let _ = fs2::FileExt::unlock(&file);
    }
    read?;
    Ok(contents)
}
