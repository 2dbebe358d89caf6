/// Label Studio REST access: resolving task image references and
/// downloading the images they point to.

use crate::error::AppError;
use crate::preprocess::decode::{probe_dimensions, ImageSize};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct LabelStudioClient {
    base_url: String,
    api_key: Option<String>,
    max_image_bytes: usize,
    client: Client,
}

/// A downloaded task image.
pub struct FetchedImage {
    pub url: String,
    pub bytes: Vec<u8>,
    pub size: ImageSize,
}

impl LabelStudioClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        max_image_bytes: usize,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build Label Studio client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_image_bytes,
            client,
        })
    }

    /// Absolute URL for a task's image reference.
    ///
    /// Uploaded files show up in task data as host-relative paths
    /// (`/data/upload/3/abc.jpg`); those are resolved against the host.
    pub fn resolve_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else if reference.starts_with('/') {
            format!("{base_url}{reference}", base_url = self.base_url)
        } else {
            format!("{base_url}/{reference}", base_url = self.base_url)
        }
    }

    /// Download the image behind a task reference and read its dimensions.
    pub async fn fetch_image(&self, reference: &str) -> Result<FetchedImage, AppError> {
        let url = self.resolve_url(reference);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Token {key}"));
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| AppError::ImageFetch(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ImageFetch(format!("GET {url} returned {status}")));
        }

        let limit = self.max_image_bytes;
        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(AppError::ImageFetch(format!(
                    "{url} is {length} bytes, larger than the {limit} byte limit"
                )));
            }
        }

        // Content-Length is optional; the limit also holds for the streamed body.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::ImageFetch(format!("Failed to read {url}: {e}")))?
        {
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::ImageFetch(format!(
                    "{url} exceeds the {limit} byte limit"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let size = probe_dimensions(&bytes).map_err(AppError::ImageDecode)?;
        debug!(%url, width = size.width, height = size.height, bytes = bytes.len(), "fetched task image");

        Ok(FetchedImage { url, bytes, size })
    }
}
