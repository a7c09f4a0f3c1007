//! Cursor acquisition and per-cycle replacement.

use crate::stream::{Cursor, FetchResult, StartPosition, StreamClient};
use crate::watcher::registry::Registry;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::collections::BTreeMap;

/// Current read position per stream. `None` marks a cursor the service reported closed.
pub type CursorMap = BTreeMap<String, Option<Cursor>>;

/// Acquires a trim-horizon cursor on the first shard of every registered stream.
///
/// Streams are initialised concurrently; any failure aborts the whole startup.
pub async fn init_cursors(client: &dyn StreamClient, registry: &Registry) -> Result<CursorMap> {
    let pending = registry.stream_names().map(|stream| async move {
        let cursor = init_stream_cursor(client, stream)
            .await
            .with_context(|| format!("failed to initialize cursor for stream {stream}"))?;
        Ok::<_, anyhow::Error>((stream.to_owned(), Some(cursor)))
    });

    let cursors: CursorMap = try_join_all(pending).await?.into_iter().collect();
    tracing::info!(streams = cursors.len(), "initialized stream cursors");
    Ok(cursors)
}

async fn init_stream_cursor(client: &dyn StreamClient, stream: &str) -> Result<Cursor> {
    let shards = client.describe_shards(stream).await?;
    let shard = shards
        .first()
        .with_context(|| format!("stream {stream} has no shards"))?;
    if shards.len() > 1 {
        tracing::warn!(
            stream,
            shards = shards.len(),
            shard_id = %shard.shard_id,
            "stream has multiple shards; only the first is polled"
        );
    }

    let cursor = client
        .get_cursor(stream, &shard.shard_id, StartPosition::TrimHorizon)
        .await?;
    tracing::debug!(stream, shard_id = %shard.shard_id, "acquired trim-horizon cursor");
    Ok(cursor)
}

/// Derives the cursor map for the next cycle.
///
/// Every stream with a fetch result takes that result's `next_cursor` verbatim, including
/// `None`; streams whose fetch failed keep their previous cursor.
pub fn advance(current: &CursorMap, results: &BTreeMap<String, FetchResult>) -> CursorMap {
    current
        .iter()
        .map(|(stream, cursor)| {
            let next = match results.get(stream) {
                Some(result) => result.next_cursor.clone(),
                None => cursor.clone(),
            };
            (stream.clone(), next)
        })
        .collect()
}
