use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing conversion activity since startup.
#[derive(Default)]
pub struct ConversionMetrics {
    documents_converted: AtomicU64,
    conversion_failures: AtomicU64,
    bytes_received: AtomicU64,
}

impl ConversionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload that reached the staging step.
    pub fn record_upload(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a document that was converted and returned as Markdown.
    pub fn record_success(&self) {
        self.documents_converted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload that failed during staging, conversion, or export.
    pub fn record_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_converted: self.documents_converted.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of conversion counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents converted successfully.
    pub documents_converted: u64,
    /// Uploads whose processing ended in an error response.
    pub conversion_failures: u64,
    /// Total upload bytes accepted for processing.
    pub bytes_received: u64,
}
