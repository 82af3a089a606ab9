//! Operation counting and throughput reporting.
//!
//! [`Metrics`] is a write-mostly sink shared (via `Arc`) between the store
//! and whoever reports on a run. The counter sits behind its own mutex,
//! independent of the store lock, so recording never waits on store
//! traffic beyond the few instructions of the increment itself.
//!
//! Throughput is computed with [`Decimal`] from whole microseconds, so the
//! report is exact to the two decimal places it is rounded to.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use tracing::info;

/// Microseconds per second, the scale used for throughput.
const MICROS_PER_SECOND: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Errors returned by [`Metrics::report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// The collector has not been stopped, so there is no interval to report.
    #[error("metrics collector has not been stopped")]
    NotStopped,
}

/// Thread-safe operation counter with start and stop timestamps.
///
/// The counter is monotonic: nothing decrements it, and it keeps counting
/// after [`stop`](Self::stop).
#[derive(Debug)]
pub struct Metrics {
    /// When collection started.
    started_at: DateTime<Utc>,
    /// Mutable state protected by a mutex.
    inner: Mutex<MetricsInner>,
}

/// Mutable state held inside the mutex.
#[derive(Debug, Default)]
struct MetricsInner {
    /// Completed operations.
    operations: u64,
    /// When collection was last stopped.
    stopped_at: Option<DateTime<Utc>>,
}

/// A throughput report over a stopped interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsReport {
    /// When collection started.
    pub started_at: DateTime<Utc>,
    /// When collection was stopped.
    pub stopped_at: DateTime<Utc>,
    /// `stopped_at - started_at`, clamped at zero.
    pub elapsed: TimeDelta,
    /// Operations counted when the report was taken.
    pub operations: u64,
    /// Operations per second, rounded to two decimal places. Zero when the
    /// interval is empty.
    pub throughput: Decimal,
}

impl Metrics {
    /// Start a collector now.
    pub fn start() -> Self {
        Self::started_at(Utc::now())
    }

    /// Start a collector with an explicit start time.
    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    /// Count one completed operation.
    pub fn increment_operation(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.operations = inner.operations.saturating_add(1);
    }

    /// Operations counted so far.
    pub fn operations(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .operations
    }

    /// When collection started.
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record the end of the measured interval now and return the report.
    ///
    /// Stopping again moves the end of the interval forward.
    pub fn stop(&self) -> MetricsReport {
        self.stop_at(Utc::now())
    }

    /// Record an explicit end of the measured interval and return the report.
    pub fn stop_at(&self, stopped_at: DateTime<Utc>) -> MetricsReport {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.stopped_at = Some(stopped_at);
        build_report(self.started_at, stopped_at, inner.operations)
    }

    /// Report over the interval ending at the last [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::NotStopped`] if the collector was never stopped.
    pub fn report(&self) -> Result<MetricsReport, MetricsError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let stopped_at = inner.stopped_at.ok_or(MetricsError::NotStopped)?;
        Ok(build_report(self.started_at, stopped_at, inner.operations))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::start()
    }
}

impl MetricsReport {
    /// Emit the report as one structured log event.
    pub fn log(&self) {
        info!(
            elapsed_ms = self.elapsed.num_milliseconds(),
            operations = self.operations,
            throughput_ops_per_sec = %self.throughput,
            "Performance metrics"
        );
    }
}

impl core::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} operations in {} ms ({} ops/sec)",
            self.operations,
            self.elapsed.num_milliseconds(),
            self.throughput
        )
    }
}

fn build_report(
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    operations: u64,
) -> MetricsReport {
    let elapsed = stopped_at
        .signed_duration_since(started_at)
        .max(TimeDelta::zero());
    MetricsReport {
        started_at,
        stopped_at,
        elapsed,
        operations,
        throughput: throughput(operations, elapsed),
    }
}

/// `operations / elapsed_seconds`, zero for an empty interval.
fn throughput(operations: u64, elapsed: TimeDelta) -> Decimal {
    let micros = elapsed.num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(operations)
        .checked_mul(MICROS_PER_SECOND)
        .and_then(|scaled| scaled.checked_div(Decimal::from(micros)))
        .map_or(Decimal::ZERO, |ops| ops.round_dp(2))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }

    #[test]
    fn counter_starts_at_zero() {
        let metrics = Metrics::start();
        assert_eq!(metrics.operations(), 0);
    }

    #[test]
    fn report_before_stop_is_an_error() {
        let metrics = Metrics::start();
        assert_eq!(metrics.report(), Err(MetricsError::NotStopped));
    }

    #[test]
    fn throughput_is_operations_per_second() {
        let metrics = Metrics::started_at(at(1_000));
        for _ in 0..10 {
            metrics.increment_operation();
        }
        let report = metrics.stop_at(at(1_004));
        assert_eq!(report.operations, 10);
        assert_eq!(report.elapsed, TimeDelta::seconds(4));
        assert_eq!(report.throughput, Decimal::new(250, 2));
        assert_eq!(metrics.report(), Ok(report));
    }

    #[test]
    fn empty_interval_reports_zero_throughput() {
        let metrics = Metrics::started_at(at(50));
        metrics.increment_operation();
        let report = metrics.stop_at(at(50));
        assert_eq!(report.throughput, Decimal::ZERO);
    }

    #[test]
    fn stop_before_start_clamps_elapsed() {
        let metrics = Metrics::started_at(at(100));
        let report = metrics.stop_at(at(90));
        assert_eq!(report.elapsed, TimeDelta::zero());
    }

    #[test]
    fn counting_continues_after_stop() {
        let metrics = Metrics::started_at(at(0));
        metrics.increment_operation();
        let _ = metrics.stop_at(at(1));
        metrics.increment_operation();
        assert_eq!(metrics.report().map(|r| r.operations), Ok(2));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let metrics = Arc::new(Metrics::start());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let metrics = Arc::clone(&metrics);
                s.spawn(move || {
                    for _ in 0..1_000 {
                        metrics.increment_operation();
                    }
                });
            }
        });
        assert_eq!(metrics.operations(), 8_000);
    }

    #[test]
    fn display_mentions_throughput() {
        let metrics = Metrics::started_at(at(0));
        metrics.increment_operation();
        let report = metrics.stop_at(at(2));
        assert_eq!(report.throughput, Decimal::new(5, 1));
        assert!(report.to_string().starts_with("1 operations in 2000 ms ("));
    }
}
