use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing watcher activity.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    records_fetched: AtomicU64,
    records_dispatched: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    consumer_failures: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle_success(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_cycle_failure(&self, consecutive: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures
            .store(consecutive, Ordering::Relaxed);
    }

    pub fn record_fetched(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.records_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.records_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consumer_failure(&self) {
        self.consumer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            records_dispatched: self.records_dispatched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            consumer_failures: self.consumer_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn records_dispatched(&self) -> u64 {
        self.records_dispatched.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub records_fetched: u64,
    pub records_dispatched: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub consumer_failures: u64,
    pub consecutive_failures: u64,
}

/// Spawns a background task that periodically logs cycle throughput and failure counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "streamwatch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let dispatched_delta = current_snapshot
                        .records_dispatched
                        .saturating_sub(last_snapshot.records_dispatched);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        dispatched_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "streamwatch::metrics",
                        throughput = format!("{throughput:.2}"),
                        cycles = current_snapshot.cycles_completed,
                        failed_cycles = current_snapshot.cycles_failed,
                        consecutive_failures = current_snapshot.consecutive_failures,
                        records_fetched = current_snapshot.records_fetched,
                        records_dispatched = current_snapshot.records_dispatched,
                        fetch_failures = current_snapshot.fetch_failures,
                        decode_failures = current_snapshot.decode_failures,
                        consumer_failures = current_snapshot.consumer_failures,
                        "watcher metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
