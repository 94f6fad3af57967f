//! Measurement engine
//!
//! One test attempt is a sequential state machine over an external
//! measurement provider, with progress notifications, cooperative
//! cancellation, and plausibility validation of the raw readings. The
//! retry controller wraps attempts with exponential backoff; the
//! background runner adapts the same contract for polling front ends.

pub mod provider;
pub mod result;
pub mod retry;
pub mod runner;
pub mod tester;
pub mod validation;

pub use provider::{MeasurementProvider, ProviderError, ServerInfo, ServerSelection};
pub use result::TestResult;
pub use retry::{run_with_retry, RETRYABLE_KEYWORDS};
pub use runner::{BackgroundRunner, ProgressUpdate};
pub use tester::{ProgressCallback, SpeedTestEngine, TestStage};
pub use validation::{validate_raw_measurement, ValidationOutcome};
