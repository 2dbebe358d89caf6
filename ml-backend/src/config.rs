/// Environment-based configuration.

use crate::error::AppError;
use crate::postprocess::detection::{BoxMode, ScoreScale};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_IMAGE_BYTES: usize = 64 * 1024 * 1024; // 64MB

/// How the image is handed to the remote detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorRequest {
    /// JSON body `{"img": "<image url>"}`; the detector downloads the image itself.
    Url,
    /// Multipart upload of the image bytes under the `file` field.
    Upload,
}

impl FromStr for DetectorRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(DetectorRequest::Url),
            "upload" | "file" => Ok(DetectorRequest::Upload),
            other => Err(format!("unknown detector request '{other}' (expected url or upload)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub label_studio_host: String,
    pub label_studio_api_key: Option<String>,
    pub detector_url: String,
    pub detector_request: DetectorRequest,
    pub box_field: String,
    pub box_mode: BoxMode,
    pub score_scale: ScoreScale,
    /// Detections scoring below this (after scaling) are left out.
    pub confidence_threshold: f64,
    pub from_name: String,
    pub to_name: String,
    pub image_field: String,
    pub model_version: String,
    pub image_timeout: Duration,
    pub detector_timeout: Duration,
    /// Largest task image the backend will download.
    pub max_image_bytes: usize,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; missing keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secs = |key: &str, default: u64| {
            Duration::from_secs(lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default))
        };

        Ok(Self {
            label_studio_host: string("LABEL_STUDIO_HOST", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            label_studio_api_key: lookup("LABEL_STUDIO_API_KEY").filter(|k| !k.is_empty()),
            detector_url: string("DETECTOR_URL", "http://localhost:5000/detector"),
            detector_request: parse_enum(&lookup, "DETECTOR_REQUEST", DetectorRequest::Upload)?,
            box_field: string("DETECTOR_BOX_FIELD", "bboxPercent"),
            box_mode: parse_enum(&lookup, "BOX_MODE", BoxMode::WidthHeight)?,
            score_scale: parse_enum(&lookup, "SCORE_SCALE", ScoreScale::Unit)?,
            confidence_threshold: lookup("CONFIDENCE_THRESHOLD")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(0.0),
            from_name: string("FROM_NAME", "label"),
            to_name: string("TO_NAME", "image"),
            image_field: string("IMAGE_FIELD", "image"),
            model_version: string("MODEL_VERSION", "0.0.1"),
            image_timeout: secs("IMAGE_TIMEOUT_SECS", 10),
            detector_timeout: secs("DETECTOR_TIMEOUT_SECS", 30),
            max_image_bytes: lookup("MAX_IMAGE_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(9090),
        })
    }
}

fn parse_enum<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String>,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|e| AppError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
