//! HTTP API tests
//!
//! Exercises the router with `tower::ServiceExt::oneshot`, no socket needed.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use voxpipe::adapters::{MemoryObjectStore, ObjectStore, Precondition};
use voxpipe::server::{create_router, REQUEST_ID_HEADER};

const BOUNDARY: &str = "voxpipe-test-boundary";

fn app() -> (Arc<MemoryObjectStore>, Router) {
    let store = Arc::new(MemoryObjectStore::new(signer()));
    let state = app_state(
        store.clone(),
        FakeTranscriber::text("hola"),
        FakeAnalyzer::replying(STRUCTURED_REPLY),
    );
    (store, create_router(state))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart(fields: &[(String, String)], file: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"memo.mp3\"\r\nContent-Type: audio/mpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/objects")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_, router) = app();

    let (status, _, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (_, router) = app();
    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "req-abc")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = send(&router, request).await;
    assert_eq!(headers[REQUEST_ID_HEADER], "req-abc");

    let (_, headers, _) = send(&router, get("/health")).await;
    assert!(!headers[REQUEST_ID_HEADER].is_empty());
}

#[tokio::test]
async fn test_upload_link() {
    let (_, router) = app();

    let (status, _, body) = send(
        &router,
        post_json(
            "/upload-link",
            json!({ "file_name": "memo.mp3", "content_type": "audio/mpeg", "file_size": 1024 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let grant = json_body(&body);
    assert_eq!(grant["success"], true);
    assert_eq!(grant["upload_url"], format!("{}/objects", BASE_URL));
    assert!(grant["file_key"].as_str().unwrap().starts_with("uploads/"));
    assert_eq!(grant["fields"]["key"], grant["file_key"]);
}

#[tokio::test]
async fn test_upload_link_rejects_invalid_request() {
    let (store, router) = app();

    let (status, _, body) = send(
        &router,
        post_json(
            "/upload-link",
            json!({ "file_name": "doc.pdf", "content_type": "application/pdf", "file_size": 10 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("audio"));
    assert_eq!(store.call_count(), 0);

    let request = Request::builder()
        .method("POST")
        .uri("/upload-link")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["success"], false);
}

#[tokio::test]
async fn test_status_of_unknown_job_is_pending() {
    let (_, router) = app();

    let (status, _, body) = send(&router, get(&format!("/status/{}", UPLOAD_KEY))).await;

    assert_eq!(status, StatusCode::OK);
    let view = json_body(&body);
    assert_eq!(view["status"], "PENDING");
    assert_eq!(view["progress"], 0);
    assert_eq!(view["file_key"], UPLOAD_KEY);
    assert_eq!(view["polling_recommended"], true);
    assert!(view["timestamp_consulta"].is_string());
    assert!(view.get("stale").is_none());
}

#[tokio::test]
async fn test_status_without_key() {
    let (_, router) = app();

    for uri in ["/status", "/status/%20"] {
        let (status, _, body) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json_body(&body)["error"], "fileKey parameter required");
    }
}

#[tokio::test]
async fn test_status_with_malformed_key() {
    let (store, router) = app();

    for uri in [
        "/status/uploads/a//b.mp3",
        "/status/uploads/x/../y.mp3",
        "/status/uploads/%5Ca.mp3",
    ] {
        let (status, _, body) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json_body(&body)["error"], "fileKey parameter required");
    }
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_event_processed_inline() {
    let (_, router) = app();
    let event = json!({ "bucket": BUCKET, "key": UPLOAD_KEY });

    let (status, _, body) = send(&router, post_json("/events?wait=true", event)).await;

    assert_eq!(status, StatusCode::OK);
    let responses = json_body(&body);
    assert_eq!(responses[0]["statusCode"], 200);
    assert!(responses[0]["body"]["resultado_key"].is_string());

    let (_, _, body) = send(&router, get(&format!("/status/{}", UPLOAD_KEY))).await;
    let view = json_body(&body);
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["polling_recommended"], false);
    assert!(view["resultado_download_url"].is_string());
    assert!(view["transcripcion_download_url"].is_string());
}

#[tokio::test]
async fn test_event_accepted_in_background() {
    let (store, router) = app();
    let event = json!({ "bucket": BUCKET, "key": UPLOAD_KEY });

    let (status, _, body) = send(&router, post_json("/events", event)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["accepted"], 1);
    assert!(wait_for_completion(&store).await);
}

#[tokio::test]
async fn test_background_jobs_drain() {
    let store = Arc::new(MemoryObjectStore::new(signer()));
    let state = app_state(
        store.clone(),
        FakeTranscriber::text("hola"),
        FakeAnalyzer::replying(STRUCTURED_REPLY),
    );
    let jobs = state.jobs.clone();
    let router = create_router(state);
    let event = json!({ "bucket": BUCKET, "key": UPLOAD_KEY });

    let (status, _, _) = send(&router, post_json("/events", event)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    jobs.drain().await;

    assert!(jobs.is_empty());
    let object = store.get(STATUS_KEY).await.unwrap().unwrap();
    let record: Value = serde_json::from_slice(&object.body).unwrap();
    assert_eq!(record["status"], "COMPLETED");
}

#[tokio::test]
async fn test_malformed_event() {
    let (_, router) = app();

    let (status, _, _) = send(&router, post_json("/events", json!({ "Records": [] }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_form_upload_starts_job() {
    let (store, router) = app();

    let (_, _, body) = send(
        &router,
        post_json(
            "/upload-link",
            json!({ "file_name": "memo.mp3", "content_type": "audio/mpeg", "file_size": 11 }),
        ),
    )
    .await;
    let grant = json_body(&body);
    let file_key = grant["file_key"].as_str().unwrap().to_string();
    let fields: Vec<(String, String)> = grant["fields"]
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
        .collect();

    let (status, _, _) = send(&router, multipart(&fields, b"ID3audio...")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let stored = store.get(&file_key).await.unwrap().unwrap();
    assert_eq!(stored.body, b"ID3audio...");
    assert_eq!(stored.content_type, "audio/mpeg");

    let job_id = file_key
        .strip_prefix("uploads/")
        .and_then(|k| k.strip_suffix(".mp3"))
        .unwrap();
    let status_key = format!("processing/{}_status.json", job_id);
    assert!(wait_for_key_completed(&store, &status_key).await);
}

#[tokio::test]
async fn test_form_upload_with_tampered_grant() {
    let (store, router) = app();
    let grant = store_grant(&store);

    let mut fields = grant.clone();
    for field in fields.iter_mut() {
        if field.0 == "key" {
            field.1 = "uploads/somewhere_else.mp3".to_string();
        }
    }
    let (status, _, _) = send(&router, multipart(&fields, b"audio")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let oversized = vec![0u8; 64];
    let (status, _, _) = send(&router, multipart(&grant, &oversized)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn test_download_with_grant() {
    let (store, router) = app();
    store
        .put("results/a_resultado.json", b"{}".to_vec(), "application/json", Precondition::None)
        .await
        .unwrap();
    let grant = store
        .presign_get("results/a_resultado.json", Duration::from_secs(300))
        .unwrap();
    let uri = grant.url.strip_prefix(BASE_URL).unwrap().to_string();

    let (status, headers, body) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body, b"{}");

    let tampered = uri.replace("a_resultado", "b_resultado");
    let (status, _, _) = send(&router, get(&tampered)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_of_missing_object() {
    let (store, router) = app();
    let grant = store
        .presign_get("results/missing.json", Duration::from_secs(300))
        .unwrap();
    let uri = grant.url.strip_prefix(BASE_URL).unwrap().to_string();

    let (status, _, _) = send(&router, get(&uri)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Grant fields for a 32-byte upload
fn store_grant(store: &MemoryObjectStore) -> Vec<(String, String)> {
    store
        .presign_post(
            "uploads/20240101_000000_00000000_memo.mp3",
            "audio/mpeg",
            32,
            Duration::from_secs(600),
        )
        .unwrap()
        .fields
        .into_iter()
        .collect()
}

async fn wait_for_completion(store: &MemoryObjectStore) -> bool {
    wait_for_key_completed(store, STATUS_KEY).await
}

/// Poll a status record until the background job finishes
async fn wait_for_key_completed(store: &MemoryObjectStore, status_key: &str) -> bool {
    let deadline = Utc::now() + chrono::Duration::seconds(5);
    while Utc::now() < deadline {
        if let Some(object) = store.get(status_key).await.unwrap() {
            let record: Value = serde_json::from_slice(&object.body).unwrap();
            if record["status"] == "COMPLETED" {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
