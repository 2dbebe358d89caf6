/// Annotation webhook: POST /webhook

use super::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const TRACKED_ACTIONS: &[&str] = &["ANNOTATION_CREATED", "ANNOTATION_UPDATED"];

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub action: String,
    #[serde(default)]
    pub annotation: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookResponse {
    pub status: String,
    pub model_version: String,
}

/// Remember the latest annotation result and roll the model version.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    if !TRACKED_ACTIONS.contains(&event.action.as_str()) {
        debug!(action = %event.action, "ignoring webhook event");
        return Ok(Json(WebhookResponse {
            status: "ignored".to_string(),
            model_version: state.model_version().await,
        }));
    }

    let annotation = event
        .annotation
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(format!("{} event without annotation", event.action)))?;
    let result = match &annotation["result"] {
        result @ Value::Array(_) => result.clone(),
        Value::Null => {
            return Err(AppError::BadRequest(format!("{} annotation has no result", event.action)))
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "{} annotation result must be a list",
                event.action
            )))
        }
    };

    let mut training = state.training.write().await;
    training.last_annotation = Some(result);
    training.model_version = fresh_model_version();

    info!(action = %event.action, model_version = %training.model_version, "annotation recorded");

    Ok(Json(WebhookResponse {
        status: "ok".to_string(),
        model_version: training.model_version.clone(),
    }))
}

fn fresh_model_version() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
