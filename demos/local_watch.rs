//! Watches a stream on a local Kinesis emulator and logs every batch.
//!
//! ```text
//! STREAMWATCH_HOST=localhost STREAMWATCH_PORT=4567 STREAMWATCH_REGION=us-east-1 \
//! STREAMWATCH_STREAM=events cargo run --example local_watch
//! ```
//!
//! Optional: `STREAMWATCH_INTERVAL_MILLIS` (default 1000), `STREAMWATCH_SSL`,
//! `STREAMWATCH_SEED` (number of sample records to publish before watching).

use std::env;

use anyhow::{Context, Result};
use serde_json::json;
use streamwatch::{
    consumer_fn, init_tracing, ConsumerHandle, InvocationContext, KinesisClient, Runner,
    StreamEvent, Subscription, WatcherConfig,
};

fn env_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} must be set"))
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let stream = env_var("STREAMWATCH_STREAM")?;
    let interval_millis = match env::var("STREAMWATCH_INTERVAL_MILLIS") {
        Ok(value) => value
            .parse()
            .context("STREAMWATCH_INTERVAL_MILLIS must be an integer")?,
        Err(_) => 1_000,
    };
    let config = WatcherConfig::builder()
        .host(env_var("STREAMWATCH_HOST")?)
        .port(
            env_var("STREAMWATCH_PORT")?
                .parse()
                .context("STREAMWATCH_PORT must be a port number")?,
        )
        .region(env_var("STREAMWATCH_REGION")?)
        .ssl_enabled(env_flag("STREAMWATCH_SSL"))
        .poll_interval_millis(interval_millis)
        .build()?;

    let client = KinesisClient::from_config(&config)?;
    client.ensure_stream(&stream).await?;

    let seed: usize = env::var("STREAMWATCH_SEED")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    for index in 0..seed {
        client
            .put_record(&stream, &json!({ "index": index, "source": "local_watch" }), "demo")
            .await?;
    }

    let logger = consumer_fn(|event: &StreamEvent, context: &InvocationContext| {
        if !event.is_empty() {
            tracing::info!(
                function = %context.function_name,
                records = %serde_json::Value::Array(event.records.clone()),
                "handled batch"
            );
        }
        async { Ok(()) }
    });

    let subscriptions = vec![Subscription::new(
        stream.as_str(),
        ConsumerHandle::new("logRecords", logger),
    )];
    let mut runner = Runner::new(config, subscriptions)?;
    runner.run_until_ctrl_c().await
}
