/// Label Studio `rectanglelabels` prediction payload.

use super::detection::NormalizedBatch;
use serde::{Deserialize, Serialize};

const RESULT_TYPE: &str = "rectanglelabels";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub result: Vec<RectangleLabelsResult>,
    pub score: f64,
    pub model_version: String,
}

impl Prediction {
    /// Prediction for a task that produced no usable detections.
    pub fn empty(model_version: &str) -> Self {
        Self {
            result: Vec::new(),
            score: 0.0,
            model_version: model_version.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleLabelsResult {
    pub from_name: String,
    pub to_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub original_width: u32,
    pub original_height: u32,
    pub image_rotation: u32,
    pub value: RectangleValue,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleValue {
    pub rotation: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rectanglelabels: Vec<String>,
}

/// Wrap a normalized batch into the prediction Label Studio stores for a task.
pub fn build_prediction(
    batch: &NormalizedBatch,
    from_name: &str,
    to_name: &str,
    model_version: &str,
) -> Prediction {
    let result = batch
        .detections
        .iter()
        .map(|det| RectangleLabelsResult {
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
            kind: RESULT_TYPE.to_string(),
            original_width: batch.original_width,
            original_height: batch.original_height,
            image_rotation: 0,
            value: RectangleValue {
                rotation: 0,
                x: det.x,
                y: det.y,
                width: det.width,
                height: det.height,
                rectanglelabels: vec![det.label.clone()],
            },
            score: det.score,
        })
        .collect();

    Prediction {
        result,
        score: batch.aggregate_score,
        model_version: model_version.to_string(),
    }
}
