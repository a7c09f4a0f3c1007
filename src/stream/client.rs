//! Stream service client contract and an HTTP implementation speaking the
//! Kinesis `2013-12-02` JSON protocol, as served by local emulators. Houses
//! the `StreamClient` trait consumed by the watcher, the `KinesisClient`, and
//! the typed `StreamError`.

use crate::runtime::config::WatcherConfig;
use crate::stream::metrics::{StreamMetrics, StreamMetricsSnapshot};
use crate::stream::options::StreamClientOptions;
use crate::stream::signing::{build_signed_headers, SigningRequest};
use crate::stream::types::{Cursor, FetchResult, RawRecord, Shard, StartPosition};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Upper bound on records requested by a single fetch.
pub const FETCH_LIMIT: usize = 100;

const TARGET_PREFIX: &str = "Kinesis_20131202";
const ACTIVE_STATUS: &str = "ACTIVE";
const RESOURCE_IN_USE: &str = "ResourceInUseException";
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ACTIVE_POLL_ATTEMPTS: usize = 100;

#[derive(Debug)]
pub enum StreamError {
    Timeout {
        operation: &'static str,
    },
    Service {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl StreamError {
    /// Service error code (e.g. `ResourceNotFoundException`), if the service answered.
    pub fn code(&self) -> Option<&str> {
        match self {
            StreamError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Timeout { operation } => {
                write!(f, "stream operation {operation} timed out")
            }
            StreamError::Service {
                operation,
                status,
                code,
                message,
            } => write!(
                f,
                "stream operation {operation} failed (status={status}, code={code}, message={message})"
            ),
            StreamError::InvalidResponse { operation, reason } => {
                write!(f, "stream operation {operation} returned an invalid response: {reason}")
            }
        }
    }
}

impl std::error::Error for StreamError {}

/// Black-box stream service API consumed by the watcher.
///
/// Implementations must be cheap to share; the watcher issues calls for every
/// stream concurrently from a single task.
pub trait StreamClient: Send + Sync {
    /// Lists the shards of `stream` in service order.
    fn describe_shards<'a>(&'a self, stream: &'a str) -> BoxFuture<'a, Result<Vec<Shard>>>;

    /// Acquires a cursor for `shard_id` positioned according to `position`.
    fn get_cursor<'a>(
        &'a self,
        stream: &'a str,
        shard_id: &'a str,
        position: StartPosition,
    ) -> BoxFuture<'a, Result<Cursor>>;

    /// Fetches at most `limit` records starting at `cursor`.
    ///
    /// A `None` cursor is forwarded as-is; the service decides the outcome.
    fn fetch<'a>(
        &'a self,
        cursor: Option<&'a Cursor>,
        limit: usize,
    ) -> BoxFuture<'a, Result<FetchResult>>;
}

#[derive(Debug, Clone)]
pub struct KinesisClient {
    endpoint: Url,
    host: Arc<String>,
    region: Arc<String>,
    client: reqwest::Client,
    options: StreamClientOptions,
    metrics: Arc<StreamMetrics>,
}

impl StreamClient for KinesisClient {
    fn describe_shards<'a>(&'a self, stream: &'a str) -> BoxFuture<'a, Result<Vec<Shard>>> {
        Box::pin(async move {
            let description = self.describe_stream(stream).await?;
            Ok(description
                .shards
                .into_iter()
                .map(|shard| Shard::new(shard.shard_id))
                .collect())
        })
    }

    fn get_cursor<'a>(
        &'a self,
        stream: &'a str,
        shard_id: &'a str,
        position: StartPosition,
    ) -> BoxFuture<'a, Result<Cursor>> {
        Box::pin(self.get_shard_iterator(stream, shard_id, position))
    }

    fn fetch<'a>(
        &'a self,
        cursor: Option<&'a Cursor>,
        limit: usize,
    ) -> BoxFuture<'a, Result<FetchResult>> {
        Box::pin(self.get_records(cursor, limit))
    }
}

impl KinesisClient {
    pub fn new(endpoint: &str, region: impl Into<String>) -> Result<Self> {
        Self::with_options(endpoint, region, StreamClientOptions::default())
    }

    pub fn with_options(
        endpoint: &str,
        region: impl Into<String>,
        options: StreamClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid stream endpoint {endpoint}"))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => bail!("stream endpoint {endpoint} has no host"),
        };
        let region = region.into();
        if region.trim().is_empty() {
            bail!("region cannot be empty");
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| anyhow!("failed to build stream HTTP client: {err}"))?;

        Ok(Self {
            endpoint,
            host: Arc::new(host),
            region: Arc::new(region),
            client,
            options,
            metrics: Arc::new(StreamMetrics::default()),
        })
    }

    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        config.validate()?;
        let options = StreamClientOptions {
            request_timeout: config.request_timeout(),
            ..StreamClientOptions::default()
        };
        Self::with_options(&config.endpoint(), config.region(), options)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn metrics(&self) -> StreamMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Creates `stream` with a single shard unless it already exists, then waits for it
    /// to become active. Returns `true` when the stream was created by this call.
    pub async fn ensure_stream(&self, stream: &str) -> Result<bool> {
        const OPERATION: &str = "CreateStream";

        let created = match self
            .call::<_, EmptyOutput>(
                OPERATION,
                &CreateStreamInput {
                    stream_name: stream,
                    shard_count: 1,
                },
            )
            .await
        {
            Ok(_) => {
                tracing::info!(stream, "created stream");
                true
            }
            Err(err)
                if err
                    .downcast_ref::<StreamError>()
                    .and_then(StreamError::code)
                    == Some(RESOURCE_IN_USE) =>
            {
                tracing::info!(stream, "stream already exists");
                false
            }
            Err(err) => return Err(err),
        };

        for _ in 0..ACTIVE_POLL_ATTEMPTS {
            let description = self.describe_stream(stream).await?;
            if description.stream_status.as_deref() == Some(ACTIVE_STATUS) {
                return Ok(created);
            }
            sleep(ACTIVE_POLL_INTERVAL).await;
        }

        bail!("stream {stream} did not become active")
    }

    /// Appends `payload`, serialized as JSON, to `stream`. Returns the sequence number.
    pub async fn put_record<T: Serialize + ?Sized>(
        &self,
        stream: &str,
        payload: &T,
        partition_key: &str,
    ) -> Result<String> {
        let bytes = serde_json::to_vec(payload).context("failed to serialize record payload")?;
        let data = BASE64_STANDARD.encode(bytes);
        let output: PutRecordOutput = self
            .call(
                "PutRecord",
                &PutRecordInput {
                    stream_name: stream,
                    data: &data,
                    partition_key,
                },
            )
            .await?;

        tracing::debug!(
            stream,
            shard_id = %output.shard_id,
            sequence_number = %output.sequence_number,
            "record appended"
        );
        Ok(output.sequence_number)
    }

    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription> {
        let output: DescribeStreamOutput = self
            .call(
                "DescribeStream",
                &DescribeStreamInput {
                    stream_name: stream,
                },
            )
            .await?;
        Ok(output.stream_description)
    }

    async fn get_shard_iterator(
        &self,
        stream: &str,
        shard_id: &str,
        position: StartPosition,
    ) -> Result<Cursor> {
        const OPERATION: &str = "GetShardIterator";

        let output: GetShardIteratorOutput = self
            .call(
                OPERATION,
                &GetShardIteratorInput {
                    stream_name: stream,
                    shard_id,
                    shard_iterator_type: position.as_iterator_type(),
                },
            )
            .await?;

        output.shard_iterator.map(Cursor::new).ok_or_else(|| {
            StreamError::InvalidResponse {
                operation: OPERATION,
                reason: format!("no shard iterator returned for {stream}/{shard_id}"),
            }
            .into()
        })
    }

    async fn get_records(&self, cursor: Option<&Cursor>, limit: usize) -> Result<FetchResult> {
        const OPERATION: &str = "GetRecords";

        let output: GetRecordsOutput = self
            .call(
                OPERATION,
                &GetRecordsInput {
                    shard_iterator: cursor.map(Cursor::as_str),
                    limit,
                },
            )
            .await?;

        let mut records = Vec::with_capacity(output.records.len());
        for record in output.records {
            let data = BASE64_STANDARD.decode(record.data.as_bytes()).map_err(|err| {
                StreamError::InvalidResponse {
                    operation: OPERATION,
                    reason: format!(
                        "record {} carries invalid base64 data: {err}",
                        record.sequence_number
                    ),
                }
            })?;
            records.push(RawRecord::new(
                record.sequence_number,
                record.partition_key,
                data,
            ));
        }

        self.metrics.record_records(OPERATION, records.len());
        tracing::trace!(
            records = records.len(),
            millis_behind_latest = output.millis_behind_latest.unwrap_or_default(),
            "GetRecords completed"
        );

        Ok(FetchResult::new(
            records,
            output.next_shard_iterator.map(Cursor::new),
        ))
    }

    async fn call<I, O>(&self, operation: &'static str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input)
            .with_context(|| format!("failed to serialize {operation} request"))?;
        let target = format!("{TARGET_PREFIX}.{operation}");
        let headers = build_signed_headers(
            &SigningRequest {
                access_key_id: &self.options.access_key_id,
                secret_access_key: &self.options.secret_access_key,
                region: &self.region,
                host: &self.host,
                target: &target,
                body: &body,
            },
            Utc::now(),
        )?;

        let start = Instant::now();
        let exchange = async {
            let response = self
                .client
                .post(self.endpoint.clone())
                .headers(headers)
                .body(body)
                .send()
                .await
                .with_context(|| format!("stream operation {operation} request failed"))?;
            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("failed to read {operation} response body"))?;
            Ok::<_, anyhow::Error>((status, bytes))
        };

        let (status, bytes) = match timeout(self.options.request_timeout, exchange).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                self.metrics.record_failure(operation, start.elapsed());
                return Err(err);
            }
            Err(_) => {
                self.metrics.record_timeout(operation, start.elapsed());
                return Err(StreamError::Timeout { operation }.into());
            }
        };

        if !status.is_success() {
            let error = map_service_error(operation, status.as_u16(), &bytes);
            self.metrics.record_service_error(
                operation,
                error.code().unwrap_or("Unknown"),
                start.elapsed(),
            );
            return Err(error.into());
        }

        let payload: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        match serde_json::from_slice(payload) {
            Ok(output) => {
                self.metrics.record_success(operation, start.elapsed());
                tracing::trace!(operation, "stream operation completed");
                Ok(output)
            }
            Err(err) => {
                self.metrics.record_failure(operation, start.elapsed());
                Err(StreamError::InvalidResponse {
                    operation,
                    reason: err.to_string(),
                }
                .into())
            }
        }
    }
}

fn map_service_error(operation: &'static str, status: u16, body: &[u8]) -> StreamError {
    let parsed: ServiceErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let code = parsed
        .kind
        .as_deref()
        .map(|kind| kind.rsplit('#').next().unwrap_or(kind).to_owned())
        .unwrap_or_else(|| "UnknownError".to_owned());
    let message = parsed
        .message
        .or(parsed.message_upper)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    StreamError::Service {
        operation,
        status,
        code,
        message,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateStreamInput<'a> {
    stream_name: &'a str,
    shard_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamInput<'a> {
    stream_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamOutput {
    stream_description: StreamDescription,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StreamDescription {
    #[serde(default)]
    shards: Vec<ShardDescription>,
    #[serde(default)]
    stream_status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShardDescription {
    shard_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetShardIteratorInput<'a> {
    stream_name: &'a str,
    shard_id: &'a str,
    shard_iterator_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetShardIteratorOutput {
    #[serde(default)]
    shard_iterator: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetRecordsInput<'a> {
    shard_iterator: Option<&'a str>,
    limit: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRecordsOutput {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(default)]
    next_shard_iterator: Option<String>,
    #[serde(default)]
    millis_behind_latest: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRecord {
    data: String,
    #[serde(default)]
    partition_key: String,
    sequence_number: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordInput<'a> {
    stream_name: &'a str,
    data: &'a str,
    partition_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordOutput {
    shard_id: String,
    sequence_number: String,
}

#[derive(Deserialize)]
struct EmptyOutput {}

#[derive(Deserialize, Default)]
struct ServiceErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    message: Option<String>,
    #[serde(rename = "Message")]
    message_upper: Option<String>,
}
