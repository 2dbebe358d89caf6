//! Label Studio ML backend backed by a remote object detector.
//!
//! Tasks come in through the ML backend protocol, images are fetched from
//! Label Studio, the detector's answer is normalized into percent-space
//! rectangles and returned as `rectanglelabels` predictions.
//!
//! ```
//! use ml_backend::postprocess::detection::{normalize, BoxMode, RawDetection, ScoreScale};
//!
//! let raw = [RawDetection {
//!     bbox: vec![10.0, 20.0, 30.0, 50.0],
//!     label: Some("horse".to_string()),
//!     score: 80.0,
//! }];
//! let batch = normalize(&raw, 640, 480, ScoreScale::Percent, BoxMode::Corners).unwrap();
//! let horse = &batch.detections[0];
//! assert_eq!((horse.width, horse.height), (20.0, 30.0));
//! assert!((batch.aggregate_score - 0.8).abs() < 1e-9);
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod handlers;
pub mod labelstudio;
pub mod postprocess;
pub mod preprocess;

use axum::{
    routing::{get, post},
    Router,
};
use handlers::AppState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the router for the ML backend protocol.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health::health))
        .route("/health", get(handlers::health::health))
        .route("/setup", post(handlers::health::setup))
        .route("/predict", post(handlers::predict::predict))
        .route("/webhook", post(handlers::webhook::webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
