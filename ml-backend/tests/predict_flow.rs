//! End-to-end /predict runs against fake Label Studio and detector servers.

use axum::extract::Multipart;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::{ImageFormat, RgbImage};
use ml_backend::config::Config;
use ml_backend::handlers::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

const API_KEY: &str = "secret";

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn detections() -> Value {
    json!([
        {"bboxPercent": [10.0, 20.0, 20.0, 30.0], "class": "horse", "score": 80.0},
        {"bboxPercent": [1.0, 2.0, 3.0], "class": "broken", "score": 99.0},
        {"bboxPercent": [50.0, 50.0, 10.0, 10.0], "score": 60.0}
    ])
}

async fn serve_image(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Token secret");
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], png(200, 100)).into_response()
}

async fn detect_upload(mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.unwrap_or_default();
            if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
                return Json(detections()).into_response();
            }
        }
    }
    StatusCode::BAD_REQUEST.into_response()
}

async fn detect_url(Json(body): Json<Value>) -> Response {
    match body["img"].as_str() {
        Some(url) if url.starts_with("http://") && url.ends_with("/data/upload/1/horse.png") => {
            Json(detections()).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn detect_not_a_list() -> Json<Value> {
    Json(json!({"detections": []}))
}

/// Detector that answers 503 to its first `failures` calls, then detects.
async fn spawn_flaky_detector(failures: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/detector",
        post(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < failures {
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                } else {
                    Json(detections()).into_response()
                }
            }
        }),
    );
    (spawn(app).await, hits)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fake Label Studio and detector on one server; returns the backend's address.
async fn start_backend(overrides: &[(&str, &str)]) -> SocketAddr {
    let upstream = spawn(
        Router::new()
            .route("/data/upload/1/horse.png", get(serve_image))
            .route("/detector/upload", post(detect_upload))
            .route("/detector/url", post(detect_url))
            .route("/detector/object", post(detect_not_a_list)),
    )
    .await;

    let mut env: HashMap<String, String> = HashMap::from([
        ("LABEL_STUDIO_HOST".to_string(), format!("http://{upstream}")),
        ("LABEL_STUDIO_API_KEY".to_string(), API_KEY.to_string()),
        ("DETECTOR_URL".to_string(), format!("http://{upstream}/detector/upload")),
        ("DETECTOR_REQUEST".to_string(), "upload".to_string()),
        ("BOX_MODE".to_string(), "width_height".to_string()),
        ("SCORE_SCALE".to_string(), "percent".to_string()),
        ("MODEL_VERSION".to_string(), "test-v1".to_string()),
        ("IMAGE_TIMEOUT_SECS".to_string(), "5".to_string()),
        ("DETECTOR_TIMEOUT_SECS".to_string(), "5".to_string()),
    ]);
    for (key, value) in overrides {
        env.insert(key.to_string(), value.replace("{upstream}", &upstream.to_string()));
    }

    let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();
    let state = Arc::new(AppState::new(config).unwrap());
    spawn(ml_backend::router(state)).await
}

async fn post_predict(backend: SocketAddr, body: Value) -> Value {
    let response = reqwest::Client::new()
        .post(format!("http://{backend}/predict"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

fn assert_close(actual: &Value, expected: f64) {
    let actual = actual.as_f64().unwrap();
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
}

#[tokio::test]
async fn upload_mode_predicts_rectangles() {
    let backend = start_backend(&[]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}], "project": "3.1700000000"}),
    )
    .await;

    assert_eq!(body["model_version"], "test-v1");
    let prediction = &body["results"][0];
    assert_eq!(prediction["model_version"], "test-v1");
    assert_close(&prediction["score"], 0.7);

    let result = prediction["result"].as_array().unwrap();
    assert_eq!(result.len(), 2);

    let horse = &result[0];
    assert_eq!(horse["from_name"], "label");
    assert_eq!(horse["to_name"], "image");
    assert_eq!(horse["type"], "rectanglelabels");
    assert_eq!(horse["original_width"], 200);
    assert_eq!(horse["original_height"], 100);
    assert_eq!(horse["value"]["rectanglelabels"], json!(["horse"]));
    assert_close(&horse["value"]["width"], 20.0);
    assert_close(&horse["value"]["height"], 30.0);
    assert_close(&horse["score"], 0.8);

    assert_eq!(result[1]["value"]["rectanglelabels"], json!(["unknown"]));
}

#[tokio::test]
async fn url_mode_sends_image_url() {
    let backend = start_backend(&[
        ("DETECTOR_REQUEST", "url"),
        ("DETECTOR_URL", "http://{upstream}/detector/url"),
        ("BOX_MODE", "corners"),
    ])
    .await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    let result = body["results"][0]["result"].as_array().unwrap();
    assert_eq!(result.len(), 2);
    assert_close(&result[0]["value"]["width"], 10.0);
    assert_close(&result[0]["value"]["height"], 10.0);
    // corners [50, 50, 10, 10] collapse to an empty box
    assert_close(&result[1]["value"]["width"], 0.0);
    assert_close(&result[1]["value"]["height"], 0.0);
}

#[tokio::test]
async fn failing_tasks_yield_empty_predictions() {
    let backend = start_backend(&[]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [
            {"id": 1, "data": {"image": "/data/upload/1/horse.png"}},
            {"id": 2, "data": {"text": "no image here"}},
            {"id": 3, "data": {"image": "/data/upload/9/missing.png"}}
        ]}),
    )
    .await;

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["result"].as_array().unwrap().len(), 2);
    for empty in &results[1..] {
        assert_eq!(empty["result"], json!([]));
        assert_eq!(empty["score"], 0.0);
        assert_eq!(empty["model_version"], "test-v1");
    }
}

#[tokio::test]
async fn unauthenticated_download_yields_empty_prediction() {
    let backend = start_backend(&[("LABEL_STUDIO_API_KEY", "")]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    assert_eq!(body["results"][0]["result"], json!([]));
}

#[tokio::test]
async fn non_array_detector_output_yields_empty_prediction() {
    let backend = start_backend(&[("DETECTOR_URL", "http://{upstream}/detector/object")]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    assert_eq!(body["results"][0]["result"], json!([]));
    assert_eq!(body["results"][0]["score"], 0.0);
}

#[tokio::test]
async fn empty_task_list_is_valid() {
    let backend = start_backend(&[]).await;

    let body = post_predict(backend, json!({"tasks": []})).await;

    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let backend = start_backend(&[]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{backend}/predict"))
        .json(&json!({"not_tasks": true}))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn health_and_setup_report_model_version() {
    let backend = start_backend(&[]).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{backend}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "UP");
    assert_eq!(health["model_version"], "test-v1");

    let setup: Value = client
        .post(format!("http://{backend}/setup"))
        .json(&json!({"project": "1.1700000000", "schema": "<View/>"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(setup["model_version"], "test-v1");
}

#[tokio::test]
async fn webhook_rolls_model_version_used_by_predict() {
    let backend = start_backend(&[]).await;
    let client = reqwest::Client::new();

    let hook: Value = client
        .post(format!("http://{backend}/webhook"))
        .json(&json!({"action": "ANNOTATION_CREATED", "annotation": {"result": []}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hook["status"], "ok");
    let version = hook["model_version"].as_str().unwrap().to_string();
    assert_ne!(version, "test-v1");

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;
    assert_eq!(body["model_version"], version.as_str());
    assert_eq!(body["results"][0]["model_version"], version.as_str());
}

#[tokio::test]
async fn unavailable_detector_is_retried() {
    let (detector, hits) = spawn_flaky_detector(1).await;
    let url = format!("http://{detector}/detector");
    let backend = start_backend(&[("DETECTOR_URL", url.as_str())]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(body["results"][0]["result"].as_array().unwrap().len(), 2);
    assert_close(&body["results"][0]["score"], 0.7);
}

#[tokio::test]
async fn detector_gives_up_after_three_attempts() {
    let (detector, hits) = spawn_flaky_detector(usize::MAX).await;
    let url = format!("http://{detector}/detector");
    let backend = start_backend(&[("DETECTOR_URL", url.as_str())]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(body["results"][0]["result"], json!([]));
    assert_eq!(body["results"][0]["score"], 0.0);
}

#[tokio::test]
async fn confidence_threshold_drops_weak_detections() {
    let backend = start_backend(&[("CONFIDENCE_THRESHOLD", "0.7")]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    let prediction = &body["results"][0];
    let result = prediction["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["value"]["rectanglelabels"], json!(["horse"]));
    assert_close(&prediction["score"], 0.8);
}

#[tokio::test]
async fn oversized_image_yields_empty_prediction() {
    let backend = start_backend(&[("MAX_IMAGE_BYTES", "32")]).await;

    let body = post_predict(
        backend,
        json!({"tasks": [{"id": 1, "data": {"image": "/data/upload/1/horse.png"}}]}),
    )
    .await;

    assert_eq!(body["results"][0]["result"], json!([]));
}
