//! JSON deployment descriptor listing functions and the streams they consume.
//!
//! Only the parts the watcher needs are modelled:
//!
//! ```json
//! {
//!   "provider": { "environment": { "STAGE": "local" } },
//!   "custom": {
//!     "offlineKinesisEvents": {
//!       "host": "localhost", "port": 4567, "region": "us-east-1",
//!       "sslEnabled": false, "intervalMillis": 500
//!     }
//!   },
//!   "functions": {
//!     "putEvents": {
//!       "handler": "handlers.putEvents",
//!       "environment": { "TABLE": "events" },
//!       "events": [ { "stream": { "arn": "arn:aws:kinesis:us-east-1:000000000000:stream/events" } } ]
//!     }
//!   }
//! }
//! ```

use crate::runtime::config::{WatcherConfig, WatcherConfigBuilder};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    provider: ProviderSection,
    #[serde(default)]
    custom: CustomSection,
    /// Kept as a raw object so declaration order survives parsing.
    #[serde(default)]
    functions: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderSection {
    #[serde(default)]
    environment: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CustomSection {
    #[serde(default, rename = "offlineKinesisEvents")]
    offline_kinesis_events: Option<OfflineKinesisSettings>,
}

/// The `custom.offlineKinesisEvents` block. Every field is optional here; the
/// resulting [`WatcherConfig`] enforces what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineKinesisSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub region: Option<String>,
    pub ssl_enabled: Option<bool>,
    pub interval_millis: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    handler: String,
    #[serde(default)]
    environment: BTreeMap<String, Value>,
    #[serde(default)]
    events: Vec<Value>,
}

/// One declared function, reduced to what subscription discovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub handler: String,
    pub environment: BTreeMap<String, String>,
    /// Resource identifiers of every stream event, in declaration order.
    pub stream_resources: Vec<String>,
}

impl ServiceDescriptor {
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse service descriptor")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read service descriptor {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("invalid service descriptor {}", path.display()))
    }

    pub fn settings(&self) -> Option<&OfflineKinesisSettings> {
        self.custom.offline_kinesis_events.as_ref()
    }

    /// Provider-level environment shared by every function.
    pub fn provider_environment(&self) -> BTreeMap<String, String> {
        stringify_environment(&self.provider.environment)
    }

    /// Seeds a config builder with whatever the descriptor declares.
    pub fn config_builder(&self) -> WatcherConfigBuilder {
        let mut builder = WatcherConfig::builder();
        let Some(settings) = self.settings() else {
            return builder;
        };
        if let Some(host) = &settings.host {
            builder = builder.host(host.clone());
        }
        if let Some(port) = settings.port {
            builder = builder.port(port);
        }
        if let Some(region) = &settings.region {
            builder = builder.region(region.clone());
        }
        if let Some(ssl_enabled) = settings.ssl_enabled {
            builder = builder.ssl_enabled(ssl_enabled);
        }
        if let Some(interval) = settings.interval_millis {
            builder = builder.poll_interval_millis(interval);
        }
        builder
    }

    pub fn watcher_config(&self) -> Result<WatcherConfig> {
        if self.settings().is_none() {
            bail!("service descriptor has no custom.offlineKinesisEvents block");
        }
        self.config_builder()
            .build()
            .context("invalid custom.offlineKinesisEvents settings")
    }

    /// Functions in declaration order, with provider and function environments
    /// merged (function values win).
    pub fn functions(&self) -> Result<Vec<FunctionSpec>> {
        let provider_environment = self.provider_environment();
        self.functions
            .iter()
            .map(|(name, raw)| {
                let raw: RawFunction = serde_json::from_value(raw.clone())
                    .with_context(|| format!("invalid definition for function {name}"))?;

                let mut environment = provider_environment.clone();
                environment.extend(stringify_environment(&raw.environment));

                let stream_resources = raw
                    .events
                    .iter()
                    .filter_map(|event| event.get("stream"))
                    .map(|stream| stream_resource(name, stream))
                    .collect::<Result<Vec<_>>>()?;

                Ok(FunctionSpec {
                    name: name.clone(),
                    handler: raw.handler,
                    environment,
                    stream_resources,
                })
            })
            .collect()
    }
}

fn stream_resource(function: &str, stream: &Value) -> Result<String> {
    let arn = match stream {
        Value::String(arn) => Some(arn),
        Value::Object(fields) => match fields.get("arn") {
            Some(Value::String(arn)) => Some(arn),
            _ => None,
        },
        _ => None,
    };
    match arn {
        Some(arn) => Ok(arn.clone()),
        None => bail!("stream event of function {function} has no literal arn"),
    }
}

fn stringify_environment(raw: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    raw.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(value) => value.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}
