//! Local stream watcher: polls Kinesis-compatible streams and dispatches each
//! fetched batch to the in-process consumers subscribed to it.

pub mod discovery;
pub mod runtime;
pub mod stream;
pub mod watcher;

pub use discovery::{ConsumerCatalog, DescriptorSource, ServiceDescriptor, SubscriptionSource};
pub use runtime::config::{WatcherConfig, WatcherConfigBuilder, WatcherConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use stream::{
    Cursor, FetchResult, KinesisClient, RawRecord, Shard, StartPosition, StreamClient,
    StreamClientOptions, StreamError, FETCH_LIMIT,
};
pub use watcher::{
    build_registry, consumer_fn, start_watcher, Consumer, ConsumerFuture, ConsumerHandle,
    CycleError, CycleFailure, InvocationContext, Registry, StreamEvent, StreamWatcher,
    Subscription, WatchError, WatcherState, MAX_CONSECUTIVE_FAILURES,
};
