use crate::config::Credentials;
use crate::errors::ForwardError;
use crate::types::{DocumentPayload, IngestionResult};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Uploads payloads to the ingestion service as `multipart/form-data` with
/// exactly two fields, `purpose` and `file`.
pub struct IngestionForwarder {
    client: reqwest::Client,
    files_url: Url,
    credentials: Arc<Credentials>,
}

impl IngestionForwarder {
    pub fn new(client: reqwest::Client, files_url: Url, credentials: Arc<Credentials>) -> Self {
        IngestionForwarder {
            client,
            files_url,
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.api_key().is_some()
    }

    pub async fn forward(
        &self,
        payload: &DocumentPayload,
        filename: &str,
        purpose: &str,
    ) -> Result<IngestionResult, ForwardError> {
        let api_key = self
            .credentials
            .api_key()
            .ok_or(ForwardError::ServerMisconfigured)?;

        let length = payload.bytes.len() as u64;
        let file = Part::stream_with_length(payload.bytes.clone(), length)
            .file_name(filename.to_string())
            .mime_str(&payload.mime_type)
            .map_err(|_| ForwardError::InvalidMimeType(payload.mime_type.clone()))?;

        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", file);

        tracing::debug!(
            filename = %filename,
            purpose = %purpose,
            size = length,
            "Uploading to ingestion service"
        );

        let response = self
            .client
            .post(self.files_url.clone())
            .bearer_auth(api_key.expose())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ForwardError::IngestionFailed { status, body });
        }

        let Ok(raw_response) = serde_json::from_str::<Value>(&body) else {
            return Err(ForwardError::InvalidResponse { body });
        };

        let remote_file_id = raw_response
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);

        match remote_file_id {
            Some(remote_file_id) => Ok(IngestionResult {
                remote_file_id,
                raw_response,
            }),
            None => Err(ForwardError::InvalidResponse { body }),
        }
    }
}
