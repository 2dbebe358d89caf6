/// Detection normalization: provider records -> percent-space rectangles.
///
/// Every provider reports a box, a class label and a confidence, but the box
/// convention and score range differ. Callers declare both explicitly through
/// [`BoxMode`] and [`ScoreScale`]; nothing is guessed from the numbers.

use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

const DEFAULT_LABEL: &str = "unknown";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalizeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// How the last two box numbers are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxMode {
    /// `[x_min, y_min, x_max, y_max]`
    Corners,
    /// `[x, y, width, height]`
    WidthHeight,
}

impl FromStr for BoxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "corners" | "xyxy" => Ok(BoxMode::Corners),
            "width_height" | "xywh" => Ok(BoxMode::WidthHeight),
            other => Err(format!("unknown box mode '{other}' (expected corners or width_height)")),
        }
    }
}

/// Range the provider reports confidences in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScale {
    /// Already in [0, 1].
    Unit,
    /// In [0, 100]; divided by 100.
    Percent,
}

impl ScoreScale {
    fn apply(self, score: f64) -> f64 {
        let score = match self {
            ScoreScale::Unit => score,
            ScoreScale::Percent => score / 100.0,
        };
        score.clamp(0.0, 1.0)
    }
}

impl FromStr for ScoreScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" => Ok(ScoreScale::Unit),
            "percent" => Ok(ScoreScale::Percent),
            other => Err(format!("unknown score scale '{other}' (expected unit or percent)")),
        }
    }
}

/// One detection as the provider returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: Vec<f64>,
    pub label: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDetection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    pub score: f64,
}

/// Output of one [`normalize`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub detections: Vec<NormalizedDetection>,
    /// Mean of the retained scores, 0 when nothing was retained.
    pub aggregate_score: f64,
    pub original_width: u32,
    pub original_height: u32,
}

impl NormalizedBatch {
    /// Keep only detections scoring at least `min_score`; the aggregate is
    /// recomputed over what remains.
    pub fn retain_min_score(mut self, min_score: f64) -> Self {
        let before = self.detections.len();
        self.detections.retain(|det| det.score >= min_score);
        self.aggregate_score = mean_score(&self.detections);

        if self.detections.len() < before {
            debug!(
                min_score,
                removed = before - self.detections.len(),
                "filtered low-confidence detections"
            );
        }
        self
    }
}

/// Parse a detector response body into raw records.
///
/// Only the top-level shape is enforced here. A record whose box is missing,
/// not an array, or holds non-numeric entries gets an empty box so that
/// [`normalize`] drops it with the rest of the malformed records.
pub fn parse_detections(payload: &Value, box_field: &str) -> Result<Vec<RawDetection>, NormalizeError> {
    let items = payload.as_array().ok_or_else(|| {
        NormalizeError::InvalidInput(format!(
            "detector response must be a JSON array, got {}",
            json_kind(payload)
        ))
    })?;

    Ok(items
        .iter()
        .map(|item| RawDetection {
            bbox: item[box_field]
                .as_array()
                .and_then(|values| values.iter().map(Value::as_f64).collect::<Option<Vec<_>>>())
                .unwrap_or_default(),
            label: item["class"].as_str().map(str::to_string),
            score: item["score"].as_f64().unwrap_or(0.0),
        })
        .collect())
}

/// Normalize raw detections into percent-space `(x, y, width, height)` boxes.
///
/// Malformed records are logged and dropped; the call only fails when the
/// image dimensions are zero.
pub fn normalize(
    raw_detections: &[RawDetection],
    image_width: u32,
    image_height: u32,
    score_scale: ScoreScale,
    box_mode: BoxMode,
) -> Result<NormalizedBatch, NormalizeError> {
    if image_width == 0 || image_height == 0 {
        return Err(NormalizeError::InvalidInput(format!(
            "image dimensions must be positive, got {image_width}x{image_height}"
        )));
    }

    let mut detections = Vec::with_capacity(raw_detections.len());

    for (index, raw) in raw_detections.iter().enumerate() {
        let Some(&[x, y, third, fourth]) = raw.bbox.get(..4) else {
            warn!(index, coords = raw.bbox.len(), "dropping detection with fewer than 4 box values");
            continue;
        };
        if ![x, y, third, fourth, raw.score].iter().all(|v| v.is_finite()) {
            warn!(index, "dropping detection with non-finite box or score");
            continue;
        }

        let (width, height) = match box_mode {
            BoxMode::Corners => (third - x, fourth - y),
            BoxMode::WidthHeight => (third, fourth),
        };
        let score = score_scale.apply(raw.score);

        detections.push(NormalizedDetection {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            label: raw.label.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            score,
        });
    }

    let aggregate_score = mean_score(&detections);

    debug!(
        accepted = detections.len(),
        dropped = raw_detections.len() - detections.len(),
        aggregate_score,
        "normalized detections"
    );

    Ok(NormalizedBatch {
        detections,
        aggregate_score,
        original_width: image_width,
        original_height: image_height,
    })
}

fn mean_score(detections: &[NormalizedDetection]) -> f64 {
    if detections.is_empty() {
        return 0.0;
    }
    detections.iter().map(|det| det.score).sum::<f64>() / detections.len() as f64
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
