//! Stream name -> consumer list mapping built once per watcher run.

use crate::watcher::consumer::ConsumerHandle;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Declares that `consumer` wants every batch fetched from `stream_name`.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub stream_name: String,
    pub consumer: ConsumerHandle,
}

impl Subscription {
    pub fn new(stream_name: impl Into<String>, consumer: ConsumerHandle) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer,
        }
    }

    /// Builds a subscription from a resource identifier such as
    /// `arn:aws:kinesis:us-east-1:000000000000:stream/orders`.
    pub fn from_resource_id(resource_id: &str, consumer: ConsumerHandle) -> Result<Self> {
        match stream_name_from_resource(resource_id) {
            Some(name) => Ok(Self::new(name, consumer)),
            None => bail!("resource identifier {resource_id:?} does not name a stream"),
        }
    }
}

/// Returns the trailing path segment of `resource_id`, or `None` when it is empty.
pub fn stream_name_from_resource(resource_id: &str) -> Option<&str> {
    let name = resource_id.trim().rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Immutable mapping from stream name to the consumers subscribed to it.
///
/// Streams without subscribers are never present, and consumers of a stream keep
/// their declaration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    streams: BTreeMap<String, Vec<ConsumerHandle>>,
}

impl Registry {
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn consumers(&self, stream: &str) -> &[ConsumerHandle] {
        self.streams
            .get(stream)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, stream: &str) -> bool {
        self.streams.contains_key(stream)
    }

    /// Number of streams being watched.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Total number of subscriptions across every stream.
    pub fn subscription_count(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }
}

/// Groups `subscriptions` by stream name, preserving declaration order per stream.
pub fn build_registry<I>(subscriptions: I) -> Registry
where
    I: IntoIterator<Item = Subscription>,
{
    let mut streams: BTreeMap<String, Vec<ConsumerHandle>> = BTreeMap::new();
    for subscription in subscriptions {
        tracing::debug!(
            stream = %subscription.stream_name,
            function = subscription.consumer.function_name(),
            "registering stream consumer"
        );
        streams
            .entry(subscription.stream_name)
            .or_default()
            .push(subscription.consumer);
    }
    Registry { streams }
}
