//! One poll cycle: fetch every stream concurrently, decode and fan the batches
//! out to every interested consumer concurrently, then derive the next cursors.
//!
//! Cursor advancement only depends on the fetch phase. Decode and consumer
//! failures are reported but never hold back the read position, so delivery is
//! at-least-once and a failing consumer cannot wedge its stream.

use crate::stream::{FetchResult, StreamClient, FETCH_LIMIT};
use crate::watcher::consumer::{invoke, ConsumerHandle, StreamEvent};
use crate::watcher::cursor::{advance, CursorMap};
use crate::watcher::error::{CycleError, CycleFailure};
use crate::watcher::registry::Registry;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;

/// Successful fetches of one cycle plus the streams whose fetch failed.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub results: BTreeMap<String, FetchResult>,
    pub failures: Vec<CycleFailure>,
}

impl PollOutcome {
    pub fn records_fetched(&self) -> usize {
        self.results.values().map(|result| result.records.len()).sum()
    }
}

/// Result of running the consumers for one cycle.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Records delivered, counted once per stream regardless of consumer count.
    pub records_dispatched: usize,
    pub invocations: usize,
    pub failures: Vec<CycleFailure>,
}

/// Everything the watcher needs after a cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cursors: CursorMap,
    pub records_fetched: usize,
    pub records_dispatched: usize,
    pub invocations: usize,
    pub error: Option<CycleError>,
}

/// Issues one bounded fetch per stream, all outstanding at once.
pub async fn poll(client: &dyn StreamClient, cursors: &CursorMap) -> PollOutcome {
    tracing::debug!(
        streams = ?cursors.keys().collect::<Vec<_>>(),
        "polling streams"
    );

    for (stream, cursor) in cursors {
        if cursor.is_none() {
            tracing::warn!(stream = %stream, "cursor for stream is closed");
        }
    }

    let fetches = cursors.iter().map(|(stream, cursor)| async move {
        let result = client.fetch(cursor.as_ref(), FETCH_LIMIT).await;
        (stream, result)
    });

    let mut outcome = PollOutcome::default();
    for (stream, result) in join_all(fetches).await {
        match result {
            Ok(result) => {
                tracing::debug!(
                    stream = %stream,
                    records = result.records.len(),
                    "stream returned records"
                );
                outcome.results.insert(stream.clone(), result);
            }
            Err(source) => {
                outcome.failures.push(CycleFailure::Fetch {
                    stream: stream.clone(),
                    source,
                });
            }
        }
    }
    outcome
}

/// Decodes each fetched batch and invokes every consumer registered for its stream.
///
/// All invocations across all streams run concurrently and are awaited to completion;
/// one failure never short-circuits the others.
pub async fn dispatch(
    results: &BTreeMap<String, FetchResult>,
    registry: &Registry,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let mut batches: Vec<(&str, StreamEvent, &[ConsumerHandle])> = Vec::new();

    for (stream, result) in results {
        match decode_batch(stream, result) {
            Ok(event) => {
                let consumers = registry.consumers(stream);
                if !event.is_empty() {
                    tracing::info!(
                        stream = %stream,
                        records = event.len(),
                        consumers = consumers.len(),
                        "dispatching records"
                    );
                }
                outcome.records_dispatched += event.len();
                batches.push((stream.as_str(), event, consumers));
            }
            Err(failure) => outcome.failures.push(failure),
        }
    }

    let invocations = batches.iter().flat_map(|(stream, event, consumers)| {
        consumers.iter().map(move |handle| async move {
            let result = invoke(handle, event).await;
            (*stream, handle, result)
        })
    });

    for (stream, handle, result) in join_all(invocations).await {
        outcome.invocations += 1;
        if let Err(source) = result {
            outcome.failures.push(CycleFailure::Consumer {
                stream: stream.to_owned(),
                function: handle.function_name().to_owned(),
                source,
            });
        }
    }

    outcome
}

/// Runs poll, dispatch, and cursor advancement for one cycle.
pub async fn run_cycle(
    client: &dyn StreamClient,
    registry: &Registry,
    cursors: &CursorMap,
) -> CycleReport {
    let polled = poll(client, cursors).await;
    let dispatched = dispatch(&polled.results, registry).await;
    let next = advance(cursors, &polled.results);

    let records_fetched = polled.records_fetched();
    let mut failures = polled.failures;
    failures.extend(dispatched.failures);

    CycleReport {
        cursors: next,
        records_fetched,
        records_dispatched: dispatched.records_dispatched,
        invocations: dispatched.invocations,
        error: CycleError::new(failures),
    }
}

fn decode_batch(stream: &str, result: &FetchResult) -> Result<StreamEvent, CycleFailure> {
    let mut records = Vec::with_capacity(result.records.len());
    for record in &result.records {
        let value: Value =
            serde_json::from_slice(&record.data).map_err(|source| CycleFailure::Decode {
                stream: stream.to_owned(),
                sequence_number: record.sequence_number.clone(),
                source,
            })?;
        records.push(value);
    }
    Ok(StreamEvent::new(records))
}
