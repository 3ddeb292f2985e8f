//! HTTP API tests
//!
//! Drives the JSON routes with reqwest against an in-process server backed by
//! the memory gateway, plus a smoke test of the spawned binary.

mod common;

use common::{BinaryServer, TestServer, MIB};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn init(client: &reqwest::Client, server: &TestServer, key: &str, size: u64) -> Value {
    let resp = client
        .post(format!("{}/uploads", server.endpoint()))
        .json(&json!({
            "key": key,
            "size": size,
            "content_type": "video/mp4",
            "owner": { "folder": "f-1", "principal": "u-9" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json().await.unwrap()
}

fn part_list(count: u64) -> Value {
    let parts: Vec<Value> = (1..=count)
        .map(|n| json!({ "part_number": n, "etag": format!("\"etag-{}\"", n) }))
        .collect();
    json!({ "parts": parts })
}

#[tokio::test]
async fn test_init_complete_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let initiated = init(&client, &server, "media/clip.mp4", 120 * MIB).await;
    assert_eq!(initiated["part_count"], 3);
    assert_eq!(initiated["part_size"], 50 * MIB);
    let urls = initiated["parts"].as_array().unwrap();
    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0]["part_number"], 1);
    assert!(urls[2]["url"].as_str().unwrap().contains("partNumber=3"));

    let handle = initiated["handle"].as_str().unwrap();
    let resp = client
        .post(format!("{}/uploads/{}/complete", server.endpoint(), handle))
        .json(&part_list(3))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let done: Value = resp.json().await.unwrap();
    assert_eq!(done["key"], "media/clip.mp4");
    assert_eq!(done["url"], "http://objects.test/media/clip.mp4");
    assert_eq!(done["content_type"], "video/mp4");
    assert_eq!(done["owner"]["folder"], "f-1");
    assert_eq!(done["owner"]["principal"], "u-9");
    assert_eq!(server.orchestrator.pending_count(), 0);
}

#[tokio::test]
async fn test_second_completion_is_not_found() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let initiated = init(&client, &server, "a.bin", MIB).await;
    let url = format!(
        "{}/uploads/{}/complete",
        server.endpoint(),
        initiated["handle"].as_str().unwrap()
    );

    let first = client.post(&url).json(&part_list(1)).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client.post(&url).json(&part_list(1)).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["code"], "NoSuchUpload");
}

#[tokio::test]
async fn test_abort_is_always_no_content() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let initiated = init(&client, &server, "a.bin", MIB).await;
    let url = format!(
        "{}/uploads/{}",
        server.endpoint(),
        initiated["handle"].as_str().unwrap()
    );

    let first = client.delete(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.gateway.open_count(), 0);

    let again = client.delete(&url).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::NO_CONTENT);

    let unknown = client
        .delete(format!("{}/uploads/never-issued", server.endpoint()))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.gateway.aborted().len(), 1);
}

#[tokio::test]
async fn test_empty_part_list_is_rejected_and_releases_session() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let initiated = init(&client, &server, "a.bin", MIB).await;
    let resp = client
        .post(format!(
            "{}/uploads/{}/complete",
            server.endpoint(),
            initiated["handle"].as_str().unwrap()
        ))
        .json(&json!({ "parts": [] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "EmptyPartList");
    assert_eq!(server.gateway.open_count(), 0);
}

#[tokio::test]
async fn test_invalid_init_requests() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = format!("{}/uploads", server.endpoint());

    let zero = client
        .post(&url)
        .json(&json!({ "key": "a.bin", "size": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
    let body: Value = zero.json().await.unwrap();
    assert_eq!(body["code"], "InvalidArgument");

    let too_big = client
        .post(&url)
        .json(&json!({ "key": "a.bin", "size": 6u64 * 1024 * 1024 * MIB }))
        .send()
        .await
        .unwrap();
    assert_eq!(too_big.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let malformed = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["code"], "MalformedBody");

    assert!(server.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    init(&client, &server, "a.bin", MIB).await;

    let health: Value = client
        .get(format!("{}/health", server.endpoint()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["backend"], "memory");
    assert_eq!(health["pending_uploads"], 1);

    let metrics = client
        .get(format!("{}/metrics", server.endpoint()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("upload_sessions_initiated_total 1"));
    assert!(metrics.contains("upload_sessions_pending 1"));
    assert!(metrics.contains("operation=\"init_upload\""));
}

#[tokio::test]
async fn test_binary_serves_health() {
    let server = BinaryServer::memory().await;

    let resp = reqwest::get(format!("{}/health", server.endpoint()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["pending_uploads"], 0);
}
