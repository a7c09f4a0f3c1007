use crate::stream::{Cursor, FetchResult, Shard, StartPosition, StreamClient};
use anyhow::{anyhow, Result};
use futures::future::{ready, BoxFuture};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted responses for a single fetch.
pub(crate) enum FakeFetch {
    Ok(FetchResult),
    Err(&'static str),
}

/// In-memory [`StreamClient`] whose fetch answers are scripted per cursor.
///
/// Unscripted fetches return an empty batch and echo the cursor back.
#[derive(Default)]
pub(crate) struct FakeStreamClient {
    state: Mutex<FakeState>,
    fetch_delay: Option<Duration>,
}

#[derive(Default)]
struct FakeState {
    shards: HashMap<String, Vec<Shard>>,
    describe_failures: HashSet<String>,
    responses: HashMap<Option<String>, VecDeque<FakeFetch>>,
    fail_all_fetches: bool,
    fetched: Vec<Option<Cursor>>,
}

impl FakeStreamClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_stream(self, stream: &str, shard_ids: &[&str]) -> Self {
        self.state.lock().unwrap().shards.insert(
            stream.to_owned(),
            shard_ids.iter().map(|id| Shard::new(*id)).collect(),
        );
        self
    }

    /// Every fetch sleeps for `delay` before answering.
    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub(crate) fn fail_describe(self, stream: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .describe_failures
            .insert(stream.to_owned());
        self
    }

    pub(crate) fn script(&self, cursor: Option<&str>, response: FakeFetch) {
        self.state
            .lock()
            .unwrap()
            .responses
            .entry(cursor.map(str::to_owned))
            .or_default()
            .push_back(response);
    }

    pub(crate) fn set_fail_all_fetches(&self, fail: bool) {
        self.state.lock().unwrap().fail_all_fetches = fail;
    }

    pub(crate) fn fetched(&self) -> Vec<Option<Cursor>> {
        self.state.lock().unwrap().fetched.clone()
    }
}

impl StreamClient for FakeStreamClient {
    fn describe_shards<'a>(&'a self, stream: &'a str) -> BoxFuture<'a, Result<Vec<Shard>>> {
        let state = self.state.lock().unwrap();
        let outcome = if state.describe_failures.contains(stream) {
            Err(anyhow!("describe {stream} refused"))
        } else {
            state
                .shards
                .get(stream)
                .cloned()
                .ok_or_else(|| anyhow!("stream {stream} not found"))
        };
        Box::pin(ready(outcome))
    }

    fn get_cursor<'a>(
        &'a self,
        stream: &'a str,
        shard_id: &'a str,
        position: StartPosition,
    ) -> BoxFuture<'a, Result<Cursor>> {
        let cursor = Cursor::new(format!(
            "{stream}/{shard_id}/{}",
            position.as_iterator_type()
        ));
        Box::pin(ready(Ok(cursor)))
    }

    fn fetch<'a>(
        &'a self,
        cursor: Option<&'a Cursor>,
        _limit: usize,
    ) -> BoxFuture<'a, Result<FetchResult>> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(cursor.cloned());

        let outcome = if state.fail_all_fetches {
            Err(anyhow!("stream service unavailable"))
        } else {
            let key = cursor.map(|cursor| cursor.as_str().to_owned());
            match state
                .responses
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
            {
                Some(FakeFetch::Ok(result)) => Ok(result),
                Some(FakeFetch::Err(message)) => Err(anyhow!(message)),
                None => Ok(FetchResult::empty(cursor.cloned())),
            }
        };
        match self.fetch_delay {
            Some(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                outcome
            }),
            None => Box::pin(ready(outcome)),
        }
    }
}
