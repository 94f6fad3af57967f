//! Bundled measurement providers
//!
//! Anything implementing `engine::MeasurementProvider` can drive the
//! engine; this module ships the default HTTP adapter used by the CLI.

pub mod http;

pub use http::HttpMeasurementProvider;
