/// HTTP client for the remote object detector.
///
/// The detector is a black box that accepts either an image URL or the image
/// bytes and answers with a JSON array of detections.

use crate::config::DetectorRequest;
use crate::error::AppError;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;
const RETRY_MAX_DELAY_MS: u64 = 5000;

/// What the detector gets to look at.
pub enum DetectorInput<'a> {
    Url(&'a str),
    Bytes(&'a [u8]),
}

#[derive(Clone)]
pub struct DetectorClient {
    url: String,
    request: DetectorRequest,
    client: Client,
}

impl DetectorClient {
    pub fn new(url: String, request: DetectorRequest, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build detector client: {e}")))?;

        Ok(Self { url, request, client })
    }

    pub fn request_mode(&self) -> DetectorRequest {
        self.request
    }

    /// Run detection and return the raw JSON body.
    pub async fn detect(&self, input: DetectorInput<'_>) -> Result<Value, AppError> {
        let mut delay_ms = RETRY_BASE_DELAY_MS;

        for attempt in 0..MAX_RETRIES {
            let last_attempt = attempt == MAX_RETRIES - 1;

            match self.build_request(&input)?.send().await {
                Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE && !last_attempt => {
                    warn!(attempt, "detector unavailable, retrying in {delay_ms}ms");
                }
                Ok(response) => {
                    let status = response.status();
                    debug!(%status, "detector responded");

                    if !status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        return Err(AppError::Detector(format!("Detection failed ({status}): {text}")));
                    }

                    return response
                        .json()
                        .await
                        .map_err(|e| AppError::Detector(format!("Failed to decode detector response: {e}")));
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && !last_attempt => {
                    warn!(attempt, error = %e, "detector request failed, retrying in {delay_ms}ms");
                }
                Err(e) => return Err(AppError::Detector(format!("Detector request failed: {e}"))),
            }

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = (delay_ms * 2).min(RETRY_MAX_DELAY_MS);
        }

        Err(AppError::Detector("Max retries exceeded".to_string()))
    }

    fn build_request(&self, input: &DetectorInput<'_>) -> Result<RequestBuilder, AppError> {
        let request = match input {
            DetectorInput::Url(url) => self.client.post(&self.url).json(&json!({ "img": url })),
            DetectorInput::Bytes(bytes) => {
                let part = Part::bytes(bytes.to_vec())
                    .file_name("image.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| AppError::Internal(format!("Invalid upload mime type: {e}")))?;
                self.client.post(&self.url).multipart(Form::new().part("file", part))
            }
        };
        Ok(request)
    }
}
