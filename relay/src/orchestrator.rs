//! The relay pipeline: resolve a token, fetch the document, upload it.
//!
//! Stages run strictly in order and each one completes before the next
//! starts:
//!
//! ```text
//! ValidatingInput -> ResolvingCredential -> FetchingMetadata -> FetchingContent -> Forwarding
//! ```
//!
//! Any stage except `FetchingMetadata` can end the request with a `RelayError`,
//! and every failure is logged with the stage it happened in.
//! Metadata is advisory, so its failures degrade to empty metadata. Nothing
//! is retried.

use crate::RunError;
use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::errors::RelayError;
use crate::fetcher::DocumentFetcher;
use crate::forwarder::IngestionForwarder;
use crate::naming::resolve_filename;
use crate::protocol::{RelayRequest, RelayRequestBody, RelayResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ValidatingInput,
    ResolvingCredential,
    FetchingMetadata,
    FetchingContent,
    Forwarding,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::ValidatingInput => "validating_input",
            Stage::ResolvingCredential => "resolving_credential",
            Stage::FetchingMetadata => "fetching_metadata",
            Stage::FetchingContent => "fetching_content",
            Stage::Forwarding => "forwarding",
        }
    }
}

/// Shared by all in-flight requests. Holds no per-request state.
pub struct Relay {
    credentials: CredentialResolver,
    fetcher: DocumentFetcher,
    forwarder: IngestionForwarder,
}

impl Relay {
    pub fn new(config: &Config) -> Result<Self, RunError> {
        let upstreams = config.upstreams.resolve()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let credentials = Arc::new(config.credentials.clone());

        Ok(Relay {
            credentials: CredentialResolver::new(
                client.clone(),
                upstreams.token_url,
                credentials.clone(),
            ),
            fetcher: DocumentFetcher::new(client.clone(), upstreams.drive_url),
            forwarder: IngestionForwarder::new(client, upstreams.files_url, credentials),
        })
    }

    /// False when the ingestion API key is missing. Every request fails in
    /// that state.
    pub fn is_configured(&self) -> bool {
        self.forwarder.is_configured()
    }

    pub fn ensure_configured(&self) -> Result<(), RelayError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(RelayError::ServerMisconfigured)
        }
    }

    /// Validates a wire request and runs the pipeline.
    pub async fn relay(&self, body: RelayRequestBody) -> Result<RelayResponse, RelayError> {
        self.ensure_configured()?;
        let request = RelayRequest::try_from(body).inspect_err(|e| {
            tracing::warn!(
                stage = Stage::ValidatingInput.as_str(),
                error = %e,
                detail = e.detail().unwrap_or_default(),
                "Rejected relay request"
            );
        })?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let document_id = request.document_id.as_str();
        let mut stage = Stage::ResolvingCredential;

        let result = async {
            let credential = self
                .credentials
                .resolve(request.caller_token.as_deref())
                .await?;
            tracing::debug!(
                document_id = %document_id,
                origin = credential.origin.as_str(),
                "Resolved credential"
            );

            stage = Stage::FetchingMetadata;
            let metadata = self
                .fetcher
                .fetch_metadata(document_id, &credential.token)
                .await;

            stage = Stage::FetchingContent;
            let payload = self
                .fetcher
                .fetch_content(
                    document_id,
                    &credential.token,
                    request.export_mime_type.as_deref(),
                    &metadata,
                )
                .await?;

            let filename = resolve_filename(
                request.desired_filename.as_deref(),
                metadata.name.as_deref(),
                document_id,
                &payload.mime_type,
            );

            stage = Stage::Forwarding;
            let ingestion = self
                .forwarder
                .forward(&payload, &filename, &request.purpose)
                .await?;

            let base64 = request
                .include_raw_bytes
                .then(|| BASE64.encode(&payload.bytes));

            Ok::<_, RelayError>(RelayResponse {
                ok: true,
                filename,
                mime_type: payload.mime_type,
                size: payload.bytes.len(),
                remote_file_id: ingestion.remote_file_id,
                upstream_response: ingestion.raw_response,
                base64,
            })
        }
        .await;

        match &result {
            Ok(response) => tracing::info!(
                document_id = %document_id,
                remote_file_id = %response.remote_file_id,
                size = response.size,
                "Relayed document"
            ),
            Err(e) => tracing::error!(
                document_id = %document_id,
                stage = stage.as_str(),
                error = %e,
                "Relay failed"
            ),
        }

        result
    }
}
