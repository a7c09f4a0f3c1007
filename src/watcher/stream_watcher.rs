//! The polling loop.
//!
//! A watcher acquires one trim-horizon cursor per registered stream, then runs
//! poll-and-dispatch cycles forever on a fixed interval. Individual cycle
//! failures are logged and absorbed; the loop only gives up once more than
//! [`MAX_CONSECUTIVE_FAILURES`] cycles in a row have failed.

use crate::runtime::telemetry::Telemetry;
use crate::stream::StreamClient;
use crate::watcher::cursor::{init_cursors, CursorMap};
use crate::watcher::cycle::{run_cycle, CycleReport};
use crate::watcher::error::{CycleFailure, WatchError};
use crate::watcher::registry::Registry;
use crate::watcher::state::{StateTracker, WatcherState};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// Failed cycles tolerated in a row; the next failure is fatal.
pub const MAX_CONSECUTIVE_FAILURES: usize = 10;

pub struct StreamWatcher {
    client: Arc<dyn StreamClient>,
    registry: Arc<Registry>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
    state: Arc<StateTracker>,
}

impl StreamWatcher {
    pub fn new(
        client: Arc<dyn StreamClient>,
        registry: Arc<Registry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            poll_interval,
            shutdown: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
            state: Arc::new(StateTracker::new()),
        }
    }

    /// Stops the loop when `shutdown` is cancelled.
    pub fn with_cancellation_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_state(mut self, state: Arc<StateTracker>) -> Self {
        self.state = state;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn state(&self) -> Arc<StateTracker> {
        self.state.clone()
    }

    /// Runs until cancelled (`Ok`) or until startup or the failure threshold
    /// produces a [`WatchError`].
    pub async fn run(self) -> Result<()> {
        let outcome = self.run_inner().await;
        self.state.transition(WatcherState::Stopped);
        match outcome {
            Ok(()) => {
                tracing::info!("stream watcher stopped");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "stream watcher aborted");
                Err(err.into())
            }
        }
    }

    async fn run_inner(&self) -> Result<(), WatchError> {
        self.state.transition(WatcherState::Starting);
        if self.registry.is_empty() {
            tracing::warn!("no stream subscriptions registered; watcher will idle");
        }

        self.state.transition(WatcherState::InitializingCursors);
        let mut cursors = select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(()),
            cursors = init_cursors(self.client.as_ref(), &self.registry) => {
                cursors.map_err(WatchError::Startup)?
            }
        };

        self.state.transition(WatcherState::Polling);
        tracing::info!(
            streams = self.registry.len(),
            subscriptions = self.registry.subscription_count(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "stream watcher polling"
        );

        let mut consecutive_failures = 0usize;
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            let report = run_cycle(self.client.as_ref(), &self.registry, &cursors).await;
            cursors = self.record_cycle(report, &mut consecutive_failures)?;

            select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn record_cycle(
        &self,
        report: CycleReport,
        consecutive_failures: &mut usize,
    ) -> Result<CursorMap, WatchError> {
        self.telemetry.record_fetched(report.records_fetched as u64);
        self.telemetry
            .record_dispatched(report.records_dispatched as u64);

        let Some(error) = report.error else {
            if *consecutive_failures > 0 {
                tracing::info!(
                    previous_failures = *consecutive_failures,
                    "poll cycle recovered"
                );
            }
            *consecutive_failures = 0;
            self.telemetry.record_cycle_success();
            return Ok(report.cursors);
        };

        *consecutive_failures += 1;
        for failure in error.failures() {
            match failure {
                CycleFailure::Fetch { .. } => self.telemetry.record_fetch_failure(),
                CycleFailure::Decode { .. } => self.telemetry.record_decode_failure(),
                CycleFailure::Consumer { .. } => self.telemetry.record_consumer_failure(),
            }
            tracing::error!(
                stream = %failure.stream(),
                consecutive_failures = *consecutive_failures,
                error = %failure,
                "poll cycle failure"
            );
        }
        self.telemetry
            .record_cycle_failure(*consecutive_failures as u64);

        if *consecutive_failures > MAX_CONSECUTIVE_FAILURES {
            return Err(WatchError::ThresholdExceeded {
                consecutive: *consecutive_failures,
                last: error,
            });
        }
        Ok(report.cursors)
    }
}

/// Spawns a watcher for `registry` on the current runtime.
///
/// The task only completes when `shutdown` is cancelled or the watcher fails fatally.
pub fn start_watcher(
    client: Arc<dyn StreamClient>,
    registry: Arc<Registry>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<Result<()>> {
    let watcher =
        StreamWatcher::new(client, registry, poll_interval).with_cancellation_token(shutdown);
    tokio::spawn(watcher.run())
}
