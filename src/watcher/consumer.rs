//! Uniform invocation of subscriber functions.
//!
//! A [`Consumer`] receives every record fetched for its stream in one cycle as a
//! single [`StreamEvent`]. [`invoke`] awaits the consumer and folds both
//! explicit failures and panics into an `Err`, so the dispatch cycle can
//! aggregate outcomes without unwinding through the watcher.

use anyhow::{anyhow, Result};
use core::future::Future;
use core::pin::Pin;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type ConsumerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Event handed to consumers: the ordered, decoded records of one fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "Records")]
    pub records: Vec<Value>,
}

impl StreamEvent {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-function settings threaded through every invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub function_name: String,
    pub handler: String,
    pub environment: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn new(function_name: impl Into<String>) -> Self {
        let function_name = function_name.into();
        Self {
            handler: function_name.clone(),
            function_name,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Looks up a variable from the function's configured environment.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }
}

/// Trait implemented by functions subscribed to a stream.
pub trait Consumer: Send + Sync + 'static {
    /// Handles one batch. Returning `Err` marks the invocation as failed.
    fn handle<'a>(
        &'a self,
        event: &'a StreamEvent,
        context: &'a InvocationContext,
    ) -> ConsumerFuture<'a>;
}

/// Adapts a closure into a [`Consumer`].
pub struct FnConsumer<F> {
    func: F,
}

impl<F, Fut> Consumer for FnConsumer<F>
where
    F: Fn(&StreamEvent, &InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle<'a>(
        &'a self,
        event: &'a StreamEvent,
        context: &'a InvocationContext,
    ) -> ConsumerFuture<'a> {
        Box::pin((self.func)(event, context))
    }
}

/// Wraps `func` so it can be registered as a consumer.
///
/// The returned future must own whatever it needs from the borrowed event and context.
pub fn consumer_fn<F, Fut>(func: F) -> FnConsumer<F>
where
    F: Fn(&StreamEvent, &InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnConsumer { func }
}

/// Shared, cloneable reference to a consumer plus its invocation context.
#[derive(Clone)]
pub struct ConsumerHandle {
    consumer: Arc<dyn Consumer>,
    context: Arc<InvocationContext>,
}

impl ConsumerHandle {
    pub fn new(function_name: impl Into<String>, consumer: impl Consumer) -> Self {
        Self::with_context(InvocationContext::new(function_name), Arc::new(consumer))
    }

    pub fn with_context(context: InvocationContext, consumer: Arc<dyn Consumer>) -> Self {
        Self {
            consumer,
            context: Arc::new(context),
        }
    }

    pub fn function_name(&self) -> &str {
        &self.context.function_name
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("function", &self.context.function_name)
            .field("handler", &self.context.handler)
            .finish()
    }
}

/// Presents `event` to the consumer behind `handle` and waits for completion.
pub async fn invoke(handle: &ConsumerHandle, event: &StreamEvent) -> Result<()> {
    let context = handle.context.as_ref();
    let call = AssertUnwindSafe(async { handle.consumer.handle(event, context).await });

    match call.catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow!(
            "consumer {} panicked: {}",
            context.function_name,
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
