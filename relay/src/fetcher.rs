use crate::errors::FetchError;
use crate::metrics_defs::{METADATA_MISSING, PAYLOAD_BYTES};
use crate::naming::resolve_mime_type;
use crate::types::{DocumentMetadata, DocumentPayload};
use http::header::CONTENT_TYPE;
use reqwest::StatusCode;
use shared::{counter, histogram};
use url::Url;

/// Retrieves documents from the storage service.
///
/// Content comes from one of two endpoints. With an export MIME type the
/// storage service converts the document itself (`files/{id}/export`);
/// without one the stored bytes are downloaded as-is (`files/{id}?alt=media`).
/// There is no fallback from one mode to the other.
pub struct DocumentFetcher {
    client: reqwest::Client,
    drive_url: Url,
}

impl DocumentFetcher {
    pub fn new(client: reqwest::Client, drive_url: Url) -> Self {
        DocumentFetcher { client, drive_url }
    }

    /// `{drive_url}files/{id}[/export]`, the id encoded as a single segment.
    fn file_url(&self, document_id: &str, export: bool) -> Result<Url, FetchError> {
        let mut url = self.drive_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidUrl(self.drive_url.to_string()))?;
            segments.pop_if_empty().push("files").push(document_id);
            if export {
                segments.push("export");
            }
        }
        Ok(url)
    }

    /// Best-effort lookup of the document's name and MIME type. Any failure
    /// yields empty metadata.
    pub async fn fetch_metadata(&self, document_id: &str, token: &str) -> DocumentMetadata {
        match self.try_fetch_metadata(document_id, token).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %e,
                    "Metadata lookup failed, continuing without it"
                );
                counter!(METADATA_MISSING).increment(1);
                DocumentMetadata::default()
            }
        }
    }

    async fn try_fetch_metadata(
        &self,
        document_id: &str,
        token: &str,
    ) -> Result<DocumentMetadata, FetchError> {
        let mut url = self.file_url(document_id, false)?;
        url.query_pairs_mut()
            .append_pair("fields", "name,mimeType")
            .append_pair("supportsAllDrives", "true");

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = check_status(response).await?;

        Ok(response.json::<DocumentMetadata>().await?)
    }

    pub async fn fetch_content(
        &self,
        document_id: &str,
        token: &str,
        export_mime_type: Option<&str>,
        metadata: &DocumentMetadata,
    ) -> Result<DocumentPayload, FetchError> {
        let url = match export_mime_type {
            Some(mime) => {
                let mut url = self.file_url(document_id, true)?;
                url.query_pairs_mut().append_pair("mimeType", mime);
                url
            }
            None => {
                let mut url = self.file_url(document_id, false)?;
                url.query_pairs_mut()
                    .append_pair("alt", "media")
                    .append_pair("supportsAllDrives", "true");
                url
            }
        };

        tracing::debug!(
            document_id = %document_id,
            export = export_mime_type.is_some(),
            "Fetching document content"
        );

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = check_status(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = response.bytes().await?;
        histogram!(PAYLOAD_BYTES).record(bytes.len() as f64);

        let mime_type = resolve_mime_type(
            export_mime_type,
            content_type.as_deref(),
            metadata.mime_type.as_deref(),
        );

        Ok(DocumentPayload { bytes, mime_type })
    }
}

/// 401 is split out so callers can tell an expired token from other failures.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        Err(FetchError::Unauthorized { body })
    } else {
        Err(FetchError::UpstreamFetchFailed { status, body })
    }
}
