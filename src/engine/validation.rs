//! Result plausibility validation
//!
//! Tiered policy over raw measurements (bits/s for throughput, ms for
//! ping): negative values and readings above the reasonable ceilings are
//! hard failures that invalidate the result; readings above the typical
//! ceilings only annotate it. The pass is a pure function of its inputs,
//! so re-validating unchanged values yields the same outcome.

use crate::config::SpeedTestConfig;

const BITS_PER_GBPS: f64 = 1_000_000_000.0;

/// Outcome of the validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

/// Validates raw download/upload (bits per second) and ping (ms) against
/// the configured ceilings.
///
/// Hard failures short-circuit with a single warning. Soft warnings are
/// independent of each other and all collected.
pub fn validate_raw_measurement(
    download_bps: f64,
    upload_bps: f64,
    ping_ms: f64,
    config: &SpeedTestConfig,
) -> ValidationOutcome {
    // Hard failure tier: values no real measurement can produce.
    if download_bps < 0.0 || upload_bps < 0.0 || ping_ms < 0.0 {
        return ValidationOutcome {
            is_valid: false,
            warnings: vec!["Invalid negative values detected - measurement failed".to_string()],
        };
    }

    let max_reasonable_bps = config.max_reasonable_speed_gbps * BITS_PER_GBPS;
    if download_bps > max_reasonable_bps || upload_bps > max_reasonable_bps {
        return ValidationOutcome {
            is_valid: false,
            warnings: vec!["Extremely high speeds detected - likely measurement error".to_string()],
        };
    }

    if ping_ms > config.max_reasonable_ping_ms {
        return ValidationOutcome {
            is_valid: false,
            warnings: vec!["Extremely high ping detected - likely measurement error".to_string()],
        };
    }

    // Soft tier: implausible-but-possible readings are annotated only.
    let mut warnings = Vec::new();

    let max_typical_bps = config.max_typical_speed_gbps * BITS_PER_GBPS;
    if download_bps > max_typical_bps || upload_bps > max_typical_bps {
        let speed_gbps = download_bps.max(upload_bps) / BITS_PER_GBPS;
        warnings.push(format!(
            "Unusually high speed ({speed_gbps:.1} Gbps) - please verify results"
        ));
    }

    if ping_ms > config.max_typical_ping_ms {
        warnings.push(format!(
            "High latency ({ping_ms:.0} ms) detected - connection may be slow"
        ));
    }

    if download_bps < 1_000_000.0 && upload_bps < 1_000_000.0 {
        warnings.push("Very low speeds detected - check network connection".to_string());
    }

    ValidationOutcome { is_valid: true, warnings }
}
