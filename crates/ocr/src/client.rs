use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{PollError, UploadError};
use crate::schema::{
    CODE_PROCESSING, CODE_READY, JobToken, PollStatus, RawExtraction, ReceiptImage,
};
use crate::OcrProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.tabscanner.com";

/// HTTP client for the Tabscanner receipt OCR API.
#[derive(Clone)]
pub struct TabscannerClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ProcessResponse {
    token: Option<String>,
}

impl TabscannerClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OCR HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn image_part(image: &ReceiptImage) -> Part {
        let part = Part::bytes(image.bytes.clone()).file_name(image.filename.clone());
        // An unparseable content type is dropped rather than failing the upload.
        match part.mime_str(&image.content_type) {
            Ok(part) => part,
            Err(_) => Part::bytes(image.bytes.clone()).file_name(image.filename.clone()),
        }
    }
}

#[async_trait]
impl OcrProvider for TabscannerClient {
    async fn upload(&self, image: &ReceiptImage) -> Result<JobToken, UploadError> {
        let url = format!("{}/api/2/process", self.base_url);

        let form = Form::new()
            .part("file", Self::image_part(image))
            .text("documentType", "receipt");

        debug!(
            filename = %image.filename,
            size_bytes = image.bytes.len(),
            "Uploading receipt to OCR provider"
        );

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<ProcessResponse>(&body) {
            Ok(ProcessResponse { token: Some(token) }) if !token.is_empty() => Ok(JobToken(token)),
            _ => Err(UploadError::MissingToken { body }),
        }
    }

    async fn fetch_result(&self, token: &JobToken) -> Result<PollStatus, PollError> {
        let url = format!("{}/api/result/{}", self.base_url, token);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(PollError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| PollError::Malformed(e.to_string()))?;
        let code = json.get("code").and_then(Value::as_i64);

        match code {
            Some(CODE_READY) => {
                let extraction = match json.get("result") {
                    Some(result) if !result.is_null() => {
                        serde_json::from_value::<RawExtraction>(result.clone())
                            .map_err(|e| PollError::Malformed(e.to_string()))?
                    }
                    _ => RawExtraction::default(),
                };
                Ok(PollStatus::Ready(extraction))
            }
            Some(CODE_PROCESSING) => Ok(PollStatus::Processing),
            _ => Err(PollError::Failed(json)),
        }
    }
}
