//! Integration tests for batch jobs

use super::*;
use inferra_client::{BatchStatus, CreateBatchRequest, InferraError, ListParams};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_json, query_param};

#[tokio::test]
async fn test_create_batch() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/batch")
        .and(body_json(json!({
            "input_file_id": "file-input",
            "completion_window": "24h"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("batch-1", "validating")))
        .expect(1)
        .mount(&server)
        .await;

    let batch = client(&server)
        .batch()
        .create(CreateBatchRequest::new("file-input"))
        .await
        .unwrap();

    assert_eq!(batch.id, "batch-1");
    assert_eq!(batch.status, BatchStatus::Validating);
    assert_eq!(batch.request_counts.total, 2);
}

#[tokio::test]
async fn test_retrieve_list_and_cancel() {
    let server = MockServer::start().await;

    mock_with_auth("GET", "/batch/batch-1")
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("batch-1", "in_progress")))
        .mount(&server)
        .await;

    mock_with_auth("GET", "/batch")
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            batch_body("batch-1", "in_progress"),
            batch_body("batch-2", "completed")
        ])))
        .mount(&server)
        .await;

    mock_with_auth("POST", "/batch/batch-1/cancel")
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("batch-1", "cancelling")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let batches = client.batch();

    assert_eq!(
        batches.retrieve("batch-1").await.unwrap().status,
        BatchStatus::InProgress
    );

    let listed = batches.list(ListParams::default().limit(2)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[1].is_done());

    let cancelled = batches.cancel("batch-1").await.unwrap();
    assert_eq!(cancelled.status, BatchStatus::Cancelling);
}

#[tokio::test]
async fn test_wait_for_completion_polls() {
    let server = MockServer::start().await;

    mock_with_auth("GET", "/batch/batch-1")
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("batch-1", "in_progress")))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    let mut done = batch_body("batch-1", "completed");
    done["output_file_id"] = json!("file-out");
    mock_with_auth("GET", "/batch/batch-1")
        .respond_with(ResponseTemplate::new(200).set_body_json(done))
        .mount(&server)
        .await;

    let batch = client(&server)
        .batch()
        .wait_for_completion_with("batch-1", Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.output_file_id.as_deref(), Some("file-out"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_wait_for_completion_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/batch/batch-slow"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(batch_body("batch-slow", "in_progress")),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .batch()
        .wait_for_completion_with(
            "batch-slow",
            Duration::from_millis(50),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

    match err {
        InferraError::PollTimeout { batch_id, waited } => {
            assert_eq!(batch_id, "batch-slow");
            assert!(waited >= Duration::from_millis(50));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
