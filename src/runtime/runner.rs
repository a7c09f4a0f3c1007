use crate::discovery::SubscriptionSource;
use crate::runtime::config::WatcherConfig;
use crate::runtime::telemetry::{self, Telemetry};
use crate::stream::{KinesisClient, StreamClient};
use crate::watcher::error::WatchError;
use crate::watcher::registry::build_registry;
use crate::watcher::state::{StateTracker, WatcherState};
use crate::watcher::stream_watcher::StreamWatcher;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

struct RunHandles {
    run_token: CancellationToken,
    watcher: JoinHandle<Result<()>>,
    metrics: JoinHandle<()>,
}

/// Coordinates the watcher lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner {
    config: WatcherConfig,
    client: Arc<dyn StreamClient>,
    source: Arc<dyn SubscriptionSource>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
    state: Arc<StateTracker>,
    handles: Option<RunHandles>,
}

impl Runner {
    /// Creates a runner talking to the stream service described by `config`.
    pub fn new(config: WatcherConfig, source: impl SubscriptionSource + 'static) -> Result<Self> {
        let client = KinesisClient::from_config(&config).context("failed to build stream client")?;
        Ok(Self::with_client(config, Arc::new(client), source))
    }

    /// Creates a runner over an arbitrary [`StreamClient`].
    pub fn with_client(
        config: WatcherConfig,
        client: Arc<dyn StreamClient>,
        source: impl SubscriptionSource + 'static,
    ) -> Self {
        Self {
            config,
            client,
            source: Arc::new(source),
            shutdown: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
            state: Arc::new(StateTracker::new()),
            handles: None,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn state(&self) -> WatcherState {
        self.state.current()
    }

    pub fn is_running(&self) -> bool {
        self.handles.is_some()
    }

    /// Discovers subscriptions, builds the registry, and spawns the watcher and
    /// metrics reporter. Discovery failures surface as [`WatchError::Startup`].
    pub async fn start(&mut self) -> Result<()> {
        if self.handles.is_some() {
            return Ok(());
        }

        let subscriptions = match self.source.list_subscriptions() {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                self.state.transition(WatcherState::Stopped);
                return Err(WatchError::Startup(
                    err.context("failed to discover stream subscriptions"),
                )
                .into());
            }
        };
        let registry = Arc::new(build_registry(subscriptions));
        tracing::info!(
            endpoint = %self.config.endpoint(),
            streams = ?registry.stream_names().collect::<Vec<_>>(),
            subscriptions = registry.subscription_count(),
            "starting stream watcher"
        );

        let run_token = self.shutdown.child_token();
        let metrics = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            run_token.clone(),
            self.config.metrics_interval(),
        );
        let watcher = StreamWatcher::new(self.client.clone(), registry, self.config.poll_interval())
            .with_cancellation_token(run_token.clone())
            .with_telemetry(self.telemetry.clone())
            .with_state(self.state.clone());

        self.handles = Some(RunHandles {
            run_token,
            watcher: tokio::spawn(watcher.run()),
            metrics,
        });
        Ok(())
    }

    /// Waits for the watcher to finish on its own, which only happens on a fatal error
    /// or when the shutdown token is cancelled elsewhere.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(mut handles) = self.handles.take() else {
            return Ok(());
        };
        let joined = (&mut handles.watcher).await;
        self.finish(handles, joined).await
    }

    /// Stops the watcher gracefully. A cycle already in flight completes first.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut handles) = self.handles.take() else {
            return Ok(());
        };

        self.shutdown.cancel();
        let joined = (&mut handles.watcher).await;
        self.finish(handles, joined).await
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is cancelled
    /// elsewhere, or the watcher fails fatally.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        let Some(mut handles) = self.handles.take() else {
            return Ok(());
        };
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let finished = tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
                None
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
                None
            }
            joined = &mut handles.watcher => Some(joined),
        };

        let joined = match finished {
            Some(joined) => joined,
            None => {
                self.shutdown.cancel();
                (&mut handles.watcher).await
            }
        };
        self.finish(handles, joined).await
    }

    async fn finish(
        &mut self,
        handles: RunHandles,
        joined: std::result::Result<Result<()>, JoinError>,
    ) -> Result<()> {
        handles.run_token.cancel();
        if let Err(err) = handles.metrics.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }
        self.reinitialize_shutdown_token();

        match joined {
            Ok(outcome) => outcome,
            Err(err) => Err(err).context("stream watcher task terminated unexpectedly"),
        }
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
    }
}
