use crate::watcher::consumer::{consumer_fn, Consumer, InvocationContext, StreamEvent};
use anyhow::Result;
use core::future::Future;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps handler strings declared in a descriptor (e.g. `handlers.putEvents`) to
/// in-process consumers.
#[derive(Clone, Default)]
pub struct ConsumerCatalog {
    handlers: BTreeMap<String, Arc<dyn Consumer>>,
}

impl ConsumerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `consumer` under `handler`, replacing any previous entry.
    pub fn register(mut self, handler: impl Into<String>, consumer: impl Consumer) -> Self {
        self.insert(handler, Arc::new(consumer));
        self
    }

    pub fn register_fn<F, Fut>(self, handler: impl Into<String>, func: F) -> Self
    where
        F: Fn(&StreamEvent, &InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(handler, consumer_fn(func))
    }

    pub fn insert(&mut self, handler: impl Into<String>, consumer: Arc<dyn Consumer>) {
        let handler = handler.into();
        if self.handlers.insert(handler.clone(), consumer).is_some() {
            tracing::warn!(handler = %handler, "replacing previously registered handler");
        }
    }

    pub fn resolve(&self, handler: &str) -> Option<Arc<dyn Consumer>> {
        self.handlers.get(handler).cloned()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for ConsumerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCatalog")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
