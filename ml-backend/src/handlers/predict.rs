/// Prediction endpoint: POST /predict

use super::AppState;
use crate::config::DetectorRequest;
use crate::detector::DetectorInput;
use crate::error::AppError;
use crate::postprocess::annotation::{build_prediction, Prediction};
use crate::postprocess::detection::{normalize, parse_detections};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub project: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub results: Vec<Prediction>,
    pub model_version: String,
}

/// POST /predict - one prediction per task, in request order.
///
/// A task that cannot be processed gets an empty prediction; the request as a
/// whole only fails when the body itself is malformed.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Json<PredictResponse> {
    let start = Instant::now();
    let model_version = state.model_version().await;

    let mut results = Vec::with_capacity(request.tasks.len());
    for task in &request.tasks {
        match predict_task(&state, task, &model_version).await {
            Ok(prediction) => results.push(prediction),
            Err(e) => {
                warn!(task_id = ?task.id, error = %e, "task prediction failed, returning empty result");
                results.push(Prediction::empty(&model_version));
            }
        }
    }

    info!(
        project = ?request.project,
        tasks = request.tasks.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "predict finished"
    );

    Json(PredictResponse {
        results,
        model_version,
    })
}

async fn predict_task(state: &AppState, task: &Task, model_version: &str) -> Result<Prediction, AppError> {
    let config = &state.config;

    let reference = task
        .data
        .get(&config.image_field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest(format!("task has no '{}' image field", config.image_field)))?;

    let image = state.label_studio.fetch_image(reference).await?;

    let input = match state.detector.request_mode() {
        DetectorRequest::Url => DetectorInput::Url(&image.url),
        DetectorRequest::Upload => DetectorInput::Bytes(&image.bytes),
    };
    let payload = state.detector.detect(input).await?;

    let raw = parse_detections(&payload, &config.box_field)?;
    let batch = normalize(
        &raw,
        image.size.width,
        image.size.height,
        config.score_scale,
        config.box_mode,
    )?
    .retain_min_score(config.confidence_threshold);

    info!(
        task_id = ?task.id,
        detections = batch.detections.len(),
        score = batch.aggregate_score,
        "task predicted"
    );

    Ok(build_prediction(&batch, &config.from_name, &config.to_name, model_version))
}
