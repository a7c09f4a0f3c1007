use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const TARGET_PREFIX: &str = "Kinesis_20131202.";
const SHARD_ID: &str = "shardId-000000000000";

/// In-memory Kinesis emulator state shared between the HTTP server and tests.
#[derive(Clone, Default)]
pub struct MockKinesis {
    inner: Arc<RwLock<MockKinesisInner>>,
    get_records_failures: Arc<AtomicUsize>,
    get_records_calls: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockKinesisInner {
    streams: HashMap<String, MockStream>,
}

struct MockStream {
    shard_count: usize,
    pending_describes: usize,
    records: Vec<StoredRecord>,
}

struct StoredRecord {
    sequence_number: String,
    partition_key: String,
    data: String,
}

impl MockKinesis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already active stream.
    pub fn create_stream(&self, name: &str, shard_count: usize) {
        let mut inner = self.inner.write().expect("mock kinesis poisoned");
        inner.streams.insert(
            name.to_owned(),
            MockStream {
                shard_count: shard_count.max(1),
                pending_describes: 0,
                records: Vec::new(),
            },
        );
    }

    /// Appends `payload` serialized as JSON to `stream`.
    pub fn put_json(&self, stream: &str, payload: &Value) {
        self.put_raw(stream, payload.to_string().as_bytes());
    }

    pub fn put_raw(&self, stream: &str, data: &[u8]) {
        let mut inner = self.inner.write().expect("mock kinesis poisoned");
        let stream = inner
            .streams
            .get_mut(stream)
            .expect("stream must exist before records are added");
        let sequence_number = format!("{:020}", stream.records.len() + 1);
        stream.records.push(StoredRecord {
            sequence_number,
            partition_key: "test".to_owned(),
            data: BASE64_STANDARD.encode(data),
        });
    }

    pub fn record_count(&self, stream: &str) -> usize {
        self.inner
            .read()
            .expect("mock kinesis poisoned")
            .streams
            .get(stream)
            .map(|stream| stream.records.len())
            .unwrap_or(0)
    }

    /// Makes the next `count` GetRecords calls fail with an internal error.
    pub fn fail_next_get_records(&self, count: usize) {
        self.get_records_failures.store(count, Ordering::SeqCst);
    }

    pub fn get_records_calls(&self) -> usize {
        self.get_records_calls.load(Ordering::SeqCst)
    }

    fn handle(&self, operation: &str, input: &Value) -> Result<Value, (StatusCode, Value)> {
        match operation {
            "CreateStream" => self.handle_create(input),
            "DescribeStream" => self.handle_describe(input),
            "GetShardIterator" => self.handle_get_shard_iterator(input),
            "GetRecords" => self.handle_get_records(input),
            "PutRecord" => self.handle_put_record(input),
            other => Err(client_error(
                "UnknownOperationException",
                format!("unsupported operation {other}"),
            )),
        }
    }

    fn handle_create(&self, input: &Value) -> Result<Value, (StatusCode, Value)> {
        let name = required_str(input, "StreamName")?;
        let shard_count = input
            .get("ShardCount")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize;
        let mut inner = self.inner.write().expect("mock kinesis poisoned");
        if inner.streams.contains_key(name) {
            return Err(client_error(
                "ResourceInUseException",
                format!("Stream {name} already exists"),
            ));
        }
        inner.streams.insert(
            name.to_owned(),
            MockStream {
                shard_count: shard_count.max(1),
                pending_describes: 1,
                records: Vec::new(),
            },
        );
        Ok(json!({}))
    }

    fn handle_describe(&self, input: &Value) -> Result<Value, (StatusCode, Value)> {
        let name = required_str(input, "StreamName")?;
        let mut inner = self.inner.write().expect("mock kinesis poisoned");
        let stream = inner.streams.get_mut(name).ok_or_else(|| not_found(name))?;

        let status = if stream.pending_describes > 0 {
            stream.pending_describes -= 1;
            "CREATING"
        } else {
            "ACTIVE"
        };
        let shards: Vec<Value> = (0..stream.shard_count)
            .map(|index| json!({ "ShardId": format!("shardId-{index:012}") }))
            .collect();

        Ok(json!({
            "StreamDescription": {
                "StreamName": name,
                "StreamStatus": status,
                "Shards": shards,
                "HasMoreShards": false,
            }
        }))
    }

    fn handle_get_shard_iterator(&self, input: &Value) -> Result<Value, (StatusCode, Value)> {
        let name = required_str(input, "StreamName")?;
        let shard_id = required_str(input, "ShardId")?;
        let kind = required_str(input, "ShardIteratorType")?;
        let inner = self.inner.read().expect("mock kinesis poisoned");
        let stream = inner.streams.get(name).ok_or_else(|| not_found(name))?;

        let position = match kind {
            "TRIM_HORIZON" => 0,
            "LATEST" => stream.records.len(),
            other => {
                return Err(client_error(
                    "InvalidArgumentException",
                    format!("unsupported iterator type {other}"),
                ))
            }
        };
        Ok(json!({ "ShardIterator": format!("{name}|{shard_id}|{position}") }))
    }

    fn handle_get_records(&self, input: &Value) -> Result<Value, (StatusCode, Value)> {
        self.get_records_calls.fetch_add(1, Ordering::SeqCst);
        let remaining_failures = self.get_records_failures.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.get_records_failures
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "__type": "InternalFailure", "message": "injected failure" }),
            ));
        }

        let iterator = match input.get("ShardIterator") {
            Some(Value::String(iterator)) => iterator.clone(),
            _ => {
                return Err(client_error(
                    "ValidationException",
                    "ShardIterator must not be null",
                ))
            }
        };
        let limit = input.get("Limit").and_then(Value::as_u64).unwrap_or(10_000) as usize;

        let mut parts = iterator.splitn(3, '|');
        let (Some(name), Some(shard_id), Some(position)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(client_error(
                "InvalidArgumentException",
                format!("malformed shard iterator {iterator}"),
            ));
        };
        let position: usize = position.parse().map_err(|_| {
            client_error(
                "InvalidArgumentException",
                format!("malformed shard iterator {iterator}"),
            )
        })?;

        let inner = self.inner.read().expect("mock kinesis poisoned");
        let stream = inner.streams.get(name).ok_or_else(|| not_found(name))?;
        let records: Vec<Value> = if shard_id == SHARD_ID {
            stream
                .records
                .iter()
                .skip(position)
                .take(limit)
                .map(|record| {
                    json!({
                        "SequenceNumber": record.sequence_number,
                        "PartitionKey": record.partition_key,
                        "Data": record.data,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };
        let next = position + records.len();

        Ok(json!({
            "Records": records,
            "NextShardIterator": format!("{name}|{shard_id}|{next}"),
            "MillisBehindLatest": 0,
        }))
    }

    fn handle_put_record(&self, input: &Value) -> Result<Value, (StatusCode, Value)> {
        let name = required_str(input, "StreamName")?;
        let data = required_str(input, "Data")?;
        let partition_key = required_str(input, "PartitionKey")?;
        let mut inner = self.inner.write().expect("mock kinesis poisoned");
        let stream = inner.streams.get_mut(name).ok_or_else(|| not_found(name))?;

        let sequence_number = format!("{:020}", stream.records.len() + 1);
        stream.records.push(StoredRecord {
            sequence_number: sequence_number.clone(),
            partition_key: partition_key.to_owned(),
            data: data.to_owned(),
        });
        Ok(json!({ "ShardId": SHARD_ID, "SequenceNumber": sequence_number }))
    }
}

pub struct MockKinesisServer {
    url: String,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockKinesisServer {
    pub async fn start(kinesis: MockKinesis) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock Kinesis listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let kinesis = kinesis.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(kinesis.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock Kinesis server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            port: addr.port(),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    kinesis: MockKinesis,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "__type": "UnsupportedOperation", "message": "POST only" }),
        ));
    }

    let signed = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("AWS4-HMAC-SHA256 Credential="))
        .unwrap_or(false);
    if !signed {
        return Ok(respond(
            StatusCode::BAD_REQUEST,
            json!({ "__type": "MissingAuthenticationTokenException", "message": "unsigned request" }),
        ));
    }

    let operation = req
        .headers()
        .get("x-amz-target")
        .and_then(|value| value.to_str().ok())
        .and_then(|target| target.strip_prefix(TARGET_PREFIX))
        .map(str::to_owned);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(respond(
                StatusCode::BAD_REQUEST,
                json!({ "__type": "SerializationException", "message": err.to_string() }),
            ))
        }
    };
    let input: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(respond(
                StatusCode::BAD_REQUEST,
                json!({ "__type": "SerializationException", "message": err.to_string() }),
            ))
        }
    };

    let Some(operation) = operation else {
        return Ok(respond(
            StatusCode::BAD_REQUEST,
            json!({ "__type": "UnknownOperationException", "message": "missing target" }),
        ));
    };

    Ok(match kinesis.handle(&operation, &input) {
        Ok(output) => respond(StatusCode::OK, output),
        Err((status, error)) => respond(status, error),
    })
}

fn respond(status: StatusCode, payload: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(payload.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/x-amz-json-1.1"),
    );
    response
}

fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, (StatusCode, Value)> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| client_error("ValidationException", format!("{field} is required")))
}

fn client_error(kind: &str, message: impl Into<String>) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({ "__type": kind, "message": message.into() }),
    )
}

fn not_found(stream: &str) -> (StatusCode, Value) {
    client_error(
        "ResourceNotFoundException",
        format!("Stream {stream} under account 000000000000 not found."),
    )
}
