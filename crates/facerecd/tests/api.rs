//! HTTP-level tests for the register / recognize endpoints.
//!
//! The ONNX extractor is swapped for a deterministic fake: the uploaded
//! "image" is a comma-separated list of floats, and `noface` yields no face.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use facerec_core::{Embedding, EmbeddingExtractor, EuclideanMatcher, ExtractError};
use facerec_store::FaceStore;
use facerecd::error::NO_FACE_MESSAGE;
use facerecd::{build_router, spawn_engine, AppState, Config};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "facerec-test-boundary";

struct CsvExtractor;

impl EmbeddingExtractor for CsvExtractor {
    fn extract(&mut self, image_bytes: &[u8]) -> Result<Option<Embedding>, ExtractError> {
        let text = String::from_utf8_lossy(image_bytes);
        if text == "noface" {
            return Ok(None);
        }
        let values: Result<Vec<f32>, _> = text.split(',').map(|v| v.trim().parse()).collect();
        Ok(values.ok().map(Embedding::new))
    }
}

/// Sleeps longer than any test timeout before answering.
struct SlowExtractor;

impl EmbeddingExtractor for SlowExtractor {
    fn extract(&mut self, _image_bytes: &[u8]) -> Result<Option<Embedding>, ExtractError> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(Some(Embedding::new(vec![0.0])))
    }
}

struct TestApp {
    router: Router,
    _dir: TempDir,
}

async fn test_app() -> TestApp {
    test_app_with(Box::new(CsvExtractor), Config::default()).await
}

async fn test_app_with(extractor: Box<dyn EmbeddingExtractor>, config: Config) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = FaceStore::open(dir.path().join("faces.db")).await.unwrap();
    let engine = spawn_engine(extractor).unwrap();
    let state = AppState::new(engine, store, EuclideanMatcher::default());
    TestApp {
        router: build_router(state, &config),
        _dir: dir,
    }
}

fn multipart_body(fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if *name == "file" {
            body.extend_from_slice(
                b"Content-Disposition: form-data; name=\"file\"; filename=\"face.jpg\"\r\n\
                  Content-Type: application/octet-stream\r\n\r\n",
            );
        } else {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
        }
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn post(app: &TestApp, uri: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
    let fields: Vec<(&str, &[u8])> = fields.iter().map(|(n, v)| (*n, v.as_bytes())).collect();
    post_raw(
        app,
        uri,
        &format!("multipart/form-data; boundary={BOUNDARY}"),
        multipart_body(&fields),
    )
    .await
}

async fn post_raw(app: &TestApp, uri: &str, content_type: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn register(app: &TestApp, name: &str, face: &str) -> (StatusCode, Value) {
    post(app, "/register", &[("name", name), ("file", face)]).await
}

async fn recognize(app: &TestApp, face: &str) -> (StatusCode, Value) {
    post(app, "/recognize", &[("file", face)]).await
}

#[tokio::test]
async fn test_register_then_recognize_same_face() {
    let app = test_app().await;

    let (status, body) = register(&app, "Alice", "0.25,-0.5,0.125,1.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Face registered for Alice");

    let (status, body) = recognize(&app, "0.25,-0.5,0.125,1.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["confidence"].as_f64(), Some(1.0));
}

#[tokio::test]
async fn test_recognize_empty_store_is_unknown() {
    let app = test_app().await;

    let (status, body) = recognize(&app, "0.5,0.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["name"], "Unknown");
    assert_eq!(body["confidence"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn test_recognize_picks_closest() {
    let app = test_app().await;
    register(&app, "Alice", "0.0,0.0").await;
    register(&app, "Bob", "0.5,0.0").await;

    let (status, body) = recognize(&app, "0.375,0.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Bob");
    assert_eq!(body["confidence"].as_f64(), Some(0.875));
}

#[tokio::test]
async fn test_recognize_beyond_threshold_reports_negative_confidence() {
    let app = test_app().await;
    register(&app, "Alice", "0.0,0.0").await;

    // distance 1.25
    let (status, body) = recognize(&app, "0.75,1.0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Unknown");
    assert_eq!(body["confidence"].as_f64(), Some(-0.25));
}

#[tokio::test]
async fn test_equal_distance_prefers_first_registered() {
    let app = test_app().await;
    register(&app, "Bob (first photo)", "0.5,0.0").await;
    register(&app, "Bob (second photo)", "0.0,0.5").await;

    let (_, body) = recognize(&app, "0.0,0.0").await;
    assert_eq!(body["name"], "Bob (first photo)");
    assert_eq!(body["confidence"].as_f64(), Some(0.5));
}

#[tokio::test]
async fn test_no_face_is_bad_request() {
    let app = test_app().await;

    let (status, body) = recognize(&app, "noface").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], NO_FACE_MESSAGE);

    let (status, body) = register(&app, "Alice", "noface").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No face detected in the image");

    // nothing was stored
    let (_, body) = recognize(&app, "0.0").await;
    assert_eq!(body["name"], "Unknown");
}

#[tokio::test]
async fn test_missing_fields_are_server_errors() {
    let app = test_app().await;

    let (status, body) = post(&app, "/recognize", &[("name", "Alice")]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "missing form field: file");

    let (status, body) = post(&app, "/register", &[("file", "0.1,0.2")]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "missing form field: name");
}

#[tokio::test]
async fn test_dimension_mismatch_is_server_error() {
    let app = test_app().await;
    register(&app, "Alice", "0.5,0.5").await;

    let (status, body) = recognize(&app, "0.5,0.5,0.5").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("dimension mismatch"), "{message}");
}

#[tokio::test]
async fn test_non_multipart_upload_is_json_server_error() {
    let app = test_app().await;

    for uri in ["/recognize", "/register"] {
        let (status, body) =
            post_raw(&app, uri, "application/json", br#"{"file":"0.1,0.2"}"#.to_vec()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(body["status"], "error");
        assert_ne!(body["message"], NO_FACE_MESSAGE);
    }

    // multipart without a boundary
    let (status, body) = post_raw(&app, "/recognize", "multipart/form-data", Vec::new()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_oversized_upload_is_json_server_error() {
    let config = Config { max_upload_mb: 1, ..Config::default() };
    let app = test_app_with(Box::new(CsvExtractor), config).await;

    let image = vec![b'0'; 2 * 1024 * 1024];
    let body = multipart_body(&[("file", image.as_slice())]);
    let (status, body) = post_raw(
        &app,
        "/recognize",
        &format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().starts_with("invalid multipart body"));
}

#[tokio::test]
async fn test_non_utf8_name_is_json_server_error() {
    let app = test_app().await;

    let body = multipart_body(&[("name", &[0xffu8, 0xfe, 0x41][..]), ("file", &b"0.1,0.2"[..])]);
    let (status, body) = post_raw(
        &app,
        "/register",
        &format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");

    let (_, body) = recognize(&app, "0.1,0.2").await;
    assert_eq!(body["name"], "Unknown");
}

#[tokio::test]
async fn test_non_finite_embedding_does_not_break_recognition() {
    let app = test_app().await;
    register(&app, "Alice", "0.1,0.2").await;

    let (status, body) = register(&app, "Eve", "NaN,0.2").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");

    let (status, body) = recognize(&app, "0.1,0.2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["confidence"].as_f64(), Some(1.0));
}

#[tokio::test]
async fn test_slow_extraction_times_out_with_json_error() {
    let config = Config { request_timeout_secs: 1, ..Config::default() };
    let app = test_app_with(Box::new(SlowExtractor), config).await;

    let (status, body) = recognize(&app, "0.1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "request timed out after 1s");
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = test_app().await;
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/recognize")
        .header(header::ORIGIN, "https://example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
