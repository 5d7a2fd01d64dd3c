#![deny(missing_docs)]

//! Core library for the Docling conversion service.

/// HTTP routing and request handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Conversion backends and the process-wide converter handle.
pub mod converter;
/// Structured logging and tracing setup.
pub mod logging;
/// Conversion counters.
pub mod metrics;
/// Upload processing flow.
pub mod processing;
/// Temporary staging of uploaded files.
pub mod staging;
