pub mod health;
pub mod predict;
pub mod webhook;

use crate::config::Config;
use crate::detector::DetectorClient;
use crate::error::AppError;
use crate::labelstudio::LabelStudioClient;
use serde_json::Value;
use tokio::sync::RwLock;

/// Shared state behind every route.
pub struct AppState {
    pub config: Config,
    pub label_studio: LabelStudioClient,
    pub detector: DetectorClient,
    pub training: RwLock<TrainingState>,
}

/// What the webhook learns from annotators.
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub model_version: String,
    pub last_annotation: Option<Value>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let label_studio = LabelStudioClient::new(
            config.label_studio_host.clone(),
            config.label_studio_api_key.clone(),
            config.image_timeout,
            config.max_image_bytes,
        )?;
        let detector = DetectorClient::new(
            config.detector_url.clone(),
            config.detector_request,
            config.detector_timeout,
        )?;
        let training = RwLock::new(TrainingState {
            model_version: config.model_version.clone(),
            last_annotation: None,
        });

        Ok(Self {
            config,
            label_studio,
            detector,
            training,
        })
    }

    pub async fn model_version(&self) -> String {
        self.training.read().await.model_version.clone()
    }
}
