//! Inbound and outbound JSON bodies of the relay endpoint.

use crate::errors::RelayError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PURPOSE: &str = "assistants";

/// Relay request as it arrives on the wire. Every field is optional here;
/// `RelayRequest::try_from` enforces what is required.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequestBody {
    #[serde(default, alias = "fileId")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, alias = "exportMime")]
    pub export_mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub return_base64: Option<bool>,
}

/// A validated relay request.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub document_id: String,
    pub caller_token: Option<String>,
    /// Presence selects export mode
    pub export_mime_type: Option<String>,
    pub desired_filename: Option<String>,
    pub purpose: String,
    pub include_raw_bytes: bool,
}

impl std::fmt::Debug for RelayRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRequest")
            .field("document_id", &self.document_id)
            .field("caller_token", &self.caller_token.as_ref().map(|_| "[redacted]"))
            .field("export_mime_type", &self.export_mime_type)
            .field("desired_filename", &self.desired_filename)
            .field("purpose", &self.purpose)
            .field("include_raw_bytes", &self.include_raw_bytes)
            .finish()
    }
}

impl RelayRequest {
    pub fn new(document_id: impl Into<String>) -> Self {
        RelayRequest {
            document_id: document_id.into(),
            caller_token: None,
            export_mime_type: None,
            desired_filename: None,
            purpose: DEFAULT_PURPOSE.into(),
            include_raw_bytes: false,
        }
    }
}

/// Blank strings count as absent, matching what callers send for unset
/// form fields.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<RelayRequestBody> for RelayRequest {
    type Error = RelayError;

    fn try_from(body: RelayRequestBody) -> Result<Self, Self::Error> {
        let document_id = non_empty(body.document_id)
            .ok_or_else(|| RelayError::missing_parameters("documentId is required"))?;

        Ok(RelayRequest {
            document_id,
            caller_token: non_empty(body.access_token),
            export_mime_type: non_empty(body.export_mime_type),
            desired_filename: non_empty(body.filename),
            purpose: non_empty(body.purpose).unwrap_or_else(|| DEFAULT_PURPOSE.into()),
            include_raw_bytes: body.return_base64.unwrap_or(false),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub ok: bool,
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
    pub remote_file_id: String,
    /// The ingestion service's response, passed through untouched
    pub upstream_response: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}
