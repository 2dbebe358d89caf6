/// Liveness and setup endpoints: GET /health and POST /setup

use super::AppState;
use crate::config::Config;
use crate::labelstudio::{rectangle_tag, RectangleTag};
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const MODEL_CLASS: &str = "RemoteDetector";

/// GET /health (also served on GET /)
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "UP",
        "model_class": MODEL_CLASS,
        "model_version": state.model_version().await,
    }))
}

/// POST /setup - Label Studio connects a project to this backend
pub async fn setup(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Json<Value> {
    info!(project = %body["project"], "backend setup requested");

    if let Some(tag) = body["schema"].as_str().and_then(|schema| label_config_mismatch(schema, &state.config)) {
        warn!(
            schema_from_name = %tag.from_name,
            schema_to_name = %tag.to_name,
            from_name = %state.config.from_name,
            to_name = %state.config.to_name,
            "project RectangleLabels names differ from FROM_NAME/TO_NAME, predictions will not attach"
        );
    }

    Json(json!({ "model_version": state.model_version().await }))
}

/// The project's rectangle control, when its names differ from the configured ones.
fn label_config_mismatch(schema: &str, config: &Config) -> Option<RectangleTag> {
    rectangle_tag(schema).filter(|tag| tag.from_name != config.from_name || tag.to_name != config.to_name)
}
