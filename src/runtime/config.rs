use crate::runtime::telemetry;
use crate::stream::options::DEFAULT_REQUEST_TIMEOUT;
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Runtime configuration for the stream watcher.
///
/// All instances must be constructed via [`WatcherConfig::builder`] or [`WatcherConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    host: String,
    port: u16,
    region: String,
    ssl_enabled: bool,
    poll_interval: Duration,
    request_timeout: Duration,
    metrics_interval: Duration,
}

pub struct WatcherConfigParams {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub ssl_enabled: bool,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub metrics_interval: Duration,
}

impl WatcherConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`WatcherConfig::builder`] when optional values should fall back to defaults.
    pub fn new(params: WatcherConfigParams) -> Result<Self> {
        let WatcherConfigParams {
            host,
            port,
            region,
            ssl_enabled,
            poll_interval,
            request_timeout,
            metrics_interval,
        } = params;

        let config = Self {
            host: trimmed_string(host),
            port,
            region: trimmed_string(region),
            ssl_enabled,
            poll_interval,
            request_timeout,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Host of the stream service, optionally carrying an `http://` or `https://` scheme.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether requests use TLS when the host carries no explicit scheme.
    pub fn ssl_enabled(&self) -> bool {
        self.ssl_enabled
    }

    /// Fixed delay applied after every poll cycle.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Per-request timeout applied by the stream client.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Full endpoint URL (`scheme://host:port`) of the stream service.
    pub fn endpoint(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            let scheme = if self.ssl_enabled { "https" } else { "http" };
            format!("{scheme}://{host}:{}", self.port)
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        ensure_not_empty(&self.host, "host")?;
        ensure_not_empty(&self.region, "region")?;

        let bare_host = self
            .host
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        if bare_host.trim_end_matches('/').is_empty() {
            bail!("host must name a server");
        }
        if bare_host.contains("://") {
            bail!("host scheme must be http:// or https://");
        }

        if self.port == 0 {
            bail!("port must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct WatcherConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    region: Option<String>,
    ssl_enabled: Option<bool>,
    poll_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl WatcherConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn ssl_enabled(mut self, enabled: bool) -> Self {
        self.ssl_enabled = Some(enabled);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn poll_interval_millis(self, millis: u64) -> Self {
        self.poll_interval(Duration::from_millis(millis))
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<WatcherConfig> {
        let params = WatcherConfigParams {
            host: self.host.context("host is required")?,
            port: self.port.context("port is required")?,
            region: self.region.context("region is required")?,
            ssl_enabled: self.ssl_enabled.unwrap_or(false),
            poll_interval: self.poll_interval.context("poll_interval is required")?,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        WatcherConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}
