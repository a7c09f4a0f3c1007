//! Stream polling core: registry, cursors, the poll-and-dispatch cycle, and the
//! long-running loop that drives them.

pub mod consumer;
pub mod cursor;
pub mod cycle;
pub mod error;
pub mod registry;
pub mod state;
pub mod stream_watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use consumer::{
    consumer_fn, invoke, Consumer, ConsumerFuture, ConsumerHandle, FnConsumer, InvocationContext,
    StreamEvent,
};
pub use cursor::{advance, init_cursors, CursorMap};
pub use cycle::{dispatch, poll, run_cycle, CycleReport, DispatchOutcome, PollOutcome};
pub use error::{CycleError, CycleFailure, WatchError};
pub use registry::{build_registry, stream_name_from_resource, Registry, Subscription};
pub use state::{StateTracker, WatcherState};
pub use stream_watcher::{start_watcher, StreamWatcher, MAX_CONSECUTIVE_FAILURES};
