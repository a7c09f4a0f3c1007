//! Per-operation counters for the stream service client. Every Kinesis action
//! (`DescribeStream`, `GetShardIterator`, `GetRecords`, ...) keeps its own call,
//! failure, and latency totals, plus a tally of the service error codes it saw.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct StreamMetrics {
    operations: Mutex<BTreeMap<&'static str, OperationStats>>,
}

impl StreamMetrics {
    pub(crate) fn record_success(&self, operation: &'static str, latency: Duration) {
        self.with_operation(operation, latency, |_| {});
    }

    pub(crate) fn record_failure(&self, operation: &'static str, latency: Duration) {
        self.with_operation(operation, latency, |stats| stats.errors += 1);
    }

    pub(crate) fn record_service_error(
        &self,
        operation: &'static str,
        code: &str,
        latency: Duration,
    ) {
        self.with_operation(operation, latency, |stats| {
            stats.errors += 1;
            *stats.error_codes.entry(code.to_owned()).or_default() += 1;
        });
    }

    pub(crate) fn record_timeout(&self, operation: &'static str, latency: Duration) {
        self.with_operation(operation, latency, |stats| {
            stats.errors += 1;
            stats.timeouts += 1;
        });
    }

    /// Adds records returned by a completed read to `operation`.
    pub(crate) fn record_records(&self, operation: &'static str, records: usize) {
        self.lock()
            .entry(operation)
            .or_default()
            .records += records as u64;
    }

    pub(crate) fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            operations: self.lock().clone(),
        }
    }

    fn with_operation(
        &self,
        operation: &'static str,
        latency: Duration,
        update: impl FnOnce(&mut OperationStats),
    ) {
        let mut operations = self.lock();
        let stats = operations.entry(operation).or_default();
        stats.requests += 1;
        stats.total_latency += latency;
        update(stats);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<&'static str, OperationStats>> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Totals for a single service operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationStats {
    pub requests: u64,
    pub errors: u64,
    pub timeouts: u64,
    /// Records returned, only tracked for reads.
    pub records: u64,
    pub total_latency: Duration,
    /// Service error codes (e.g. `ProvisionedThroughputExceededException`) and their counts.
    pub error_codes: BTreeMap<String, u64>,
}

impl OperationStats {
    pub fn average_latency(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        self.total_latency / self.requests as u32
    }

    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamMetricsSnapshot {
    pub operations: BTreeMap<&'static str, OperationStats>,
}

impl StreamMetricsSnapshot {
    pub fn operation(&self, name: &str) -> Option<&OperationStats> {
        self.operations.get(name)
    }

    pub fn total_requests(&self) -> u64 {
        self.operations.values().map(|stats| stats.requests).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.operations.values().map(|stats| stats.errors).sum()
    }
}
