use hyper::body::Bytes;
use serde::Deserialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialOrigin {
    CallerSupplied,
    Refreshed,
}

impl CredentialOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CredentialOrigin::CallerSupplied => "caller_supplied",
            CredentialOrigin::Refreshed => "refreshed",
        }
    }
}

/// A bearer token for the storage service and where it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub token: String,
    pub origin: CredentialOrigin,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("token", &"[redacted]")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Advisory description of a document. Every field may be missing, and the
/// whole value is empty when the lookup failed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.mime_type.is_none()
    }
}

/// Document bytes as retrieved, with the resolved MIME type.
#[derive(Clone, Debug)]
pub struct DocumentPayload {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[derive(Clone, Debug)]
pub struct IngestionResult {
    pub remote_file_id: String,
    pub raw_response: serde_json::Value,
}
