//! Stream service plumbing: the black-box client contract consumed by the
//! watcher, an HTTP implementation of the Kinesis JSON protocol, request
//! signing, and client-side metrics.

pub mod client;
pub mod metrics;
pub mod options;
pub mod signing;
pub mod types;

pub use client::{KinesisClient, StreamClient, StreamError, FETCH_LIMIT};
pub use metrics::{OperationStats, StreamMetricsSnapshot};
pub use options::StreamClientOptions;
pub use types::{Cursor, FetchResult, RawRecord, Shard, StartPosition};
