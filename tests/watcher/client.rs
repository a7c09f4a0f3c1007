use crate::support::mock_kinesis::{MockKinesis, MockKinesisServer};
use anyhow::Result;
use serde_json::json;
use streamwatch::{KinesisClient, StartPosition, StreamClient, StreamError, FETCH_LIMIT};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ensure_stream_creates_once() -> Result<()> {
    let kinesis = MockKinesis::new();
    let server = MockKinesisServer::start(kinesis.clone()).await?;
    let client = KinesisClient::new(server.url(), "us-east-1")?;

    assert!(client.ensure_stream("orders").await?);
    assert!(!client.ensure_stream("orders").await?);

    let shards = client.describe_shards("orders").await?;
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].shard_id, "shardId-000000000000");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_pages_through_records_and_keeps_cursor_alive() -> Result<()> {
    let kinesis = MockKinesis::new();
    kinesis.create_stream("orders", 1);
    let server = MockKinesisServer::start(kinesis.clone()).await?;
    let client = KinesisClient::new(server.url(), "us-east-1")?;

    for id in 1..=3 {
        client
            .put_record("orders", &json!({ "id": id }), "orders")
            .await?;
    }
    assert_eq!(kinesis.record_count("orders"), 3);

    let cursor = client
        .get_cursor("orders", "shardId-000000000000", StartPosition::TrimHorizon)
        .await?;
    let first = client.fetch(Some(&cursor), 2).await?;
    assert_eq!(first.records.len(), 2);
    assert_eq!(first.records[0].data, br#"{"id":1}"#.to_vec());

    let second = client.fetch(first.next_cursor.as_ref(), FETCH_LIMIT).await?;
    assert_eq!(second.records.len(), 1);
    assert_eq!(second.records[0].sequence_number, "00000000000000000003");

    let drained = client.fetch(second.next_cursor.as_ref(), FETCH_LIMIT).await?;
    assert!(drained.records.is_empty());
    assert!(drained.next_cursor.is_some());

    let metrics = client.metrics();
    assert_eq!(metrics.total_errors(), 0);
    assert!(metrics.total_requests() >= 7);
    let reads = metrics
        .operation("GetRecords")
        .expect("reads should be tracked");
    assert_eq!(reads.requests, 3);
    assert_eq!(reads.records, 3);
    assert_eq!(
        metrics.operation("PutRecord").map(|stats| stats.requests),
        Some(3)
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_errors_are_typed() -> Result<()> {
    let kinesis = MockKinesis::new();
    let server = MockKinesisServer::start(kinesis.clone()).await?;
    let client = KinesisClient::new(server.url(), "us-east-1")?;

    let err = client.describe_shards("missing").await.unwrap_err();
    let stream_error = err
        .downcast_ref::<StreamError>()
        .expect("service failure should be a StreamError");
    assert_eq!(stream_error.code(), Some("ResourceNotFoundException"));

    let err = client.fetch(None, FETCH_LIMIT).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<StreamError>().and_then(StreamError::code),
        Some("ValidationException")
    );

    kinesis.create_stream("orders", 1);
    kinesis.fail_next_get_records(1);
    let cursor = client
        .get_cursor("orders", "shardId-000000000000", StartPosition::TrimHorizon)
        .await?;
    let err = client.fetch(Some(&cursor), FETCH_LIMIT).await.unwrap_err();
    match err.downcast_ref::<StreamError>() {
        Some(StreamError::Service { status, code, .. }) => {
            assert_eq!(*status, 500);
            assert_eq!(code, "InternalFailure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let metrics = client.metrics();
    assert_eq!(metrics.total_errors(), 3);
    let reads = metrics
        .operation("GetRecords")
        .expect("reads should be tracked");
    assert_eq!(reads.error_codes.get("ValidationException"), Some(&1));
    assert_eq!(reads.error_codes.get("InternalFailure"), Some(&1));
    assert_eq!(
        metrics
            .operation("DescribeStream")
            .and_then(|stats| stats.error_codes.get("ResourceNotFoundException")),
        Some(&1)
    );

    server.shutdown().await;
    Ok(())
}
