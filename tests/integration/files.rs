//! Integration tests for file storage

use super::*;
use inferra_client::types::files::DEFAULT_PURPOSE;
use inferra_client::{FileContent, FileListParams, FileSource, InferraError};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string_contains, header, header_regex, query_param};

#[tokio::test]
async fn test_upload_records_as_multipart() {
    let server = MockServer::start().await;

    mock_with_auth("POST", "/files")
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("name=\"purpose\""))
        .and(body_string_contains("filename=\"batch.jsonl\""))
        .and(body_string_contains(r#"{"custom_id":"req-1"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("file-abc")))
        .expect(1)
        .mount(&server)
        .await;

    let file = client(&server)
        .files()
        .upload(
            FileSource::records(vec![json!({"custom_id": "req-1"})]),
            DEFAULT_PURPOSE,
        )
        .await
        .unwrap();

    assert_eq!(file.id, "file-abc");
    assert_eq!(file.size, 64);
}

#[tokio::test]
async fn test_upload_from_path() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("requests.jsonl");
    std::fs::write(&input, "{\"custom_id\":\"a\"}\n").unwrap();

    mock_with_auth("POST", "/files")
        .and(body_string_contains("filename=\"requests.jsonl\""))
        .and(body_string_contains("application/jsonl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("file-path")))
        .expect(1)
        .mount(&server)
        .await;

    let file = client(&server)
        .files()
        .upload(FileSource::path(&input), DEFAULT_PURPOSE)
        .await
        .unwrap();

    assert_eq!(file.id, "file-path");
}

#[tokio::test]
async fn test_upload_missing_path_is_io_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .files()
        .upload(FileSource::path("/definitely/not/here.jsonl"), DEFAULT_PURPOSE)
        .await
        .unwrap_err();

    assert!(matches!(err, InferraError::Io { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_download_text() {
    let server = MockServer::start().await;

    mock_with_auth("GET", "/files/file-out/content")
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{\"id\":1}\n{\"id\":2}\n", "application/jsonl"),
        )
        .mount(&server)
        .await;

    let content = client(&server).files().download("file-out").await.unwrap();

    assert_eq!(content.as_text(), Some("{\"id\":1}\n{\"id\":2}\n"));
}

#[tokio::test]
async fn test_download_binary() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/file-bin/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xde, 0xad, 0xbe, 0xef]))
        .mount(&server)
        .await;

    let content = client(&server).files().download("file-bin").await.unwrap();

    assert_eq!(content, FileContent::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
}

#[tokio::test]
async fn test_download_to_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("results.jsonl");
    let payload = "{\"custom_id\":\"a\",\"response\":{}}\n".repeat(100);

    mock_with_auth("GET", "/files/file-out/content")
        .respond_with(ResponseTemplate::new(200).set_body_raw(payload.clone(), "application/jsonl"))
        .mount(&server)
        .await;

    let written = client(&server)
        .files()
        .download_to("file-out", &target)
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), payload);
}

#[tokio::test]
async fn test_retrieve_delete_and_list() {
    let server = MockServer::start().await;

    mock_with_auth("GET", "/files/file-1")
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("file-1")))
        .mount(&server)
        .await;

    mock_with_auth("DELETE", "/files/file-1")
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    mock_with_auth("GET", "/files")
        .and(query_param("purpose", "batch"))
        .and(query_param("limit", "10"))
        .and(query_param("after", "file-0"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [file_body("file-1"), file_body("file-2")]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let files = client.files();

    assert_eq!(files.retrieve("file-1").await.unwrap().filename, "batch.jsonl");
    files.delete("file-1").await.unwrap();

    let listed = files
        .list(
            FileListParams::default()
                .purpose("batch")
                .limit(10)
                .after("file-0"),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = listed.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["file-1", "file-2"]);
}
