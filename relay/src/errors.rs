use http::header::{ALLOW, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use shared::http::{ResponseBody, json_response};
use thiserror::Error;

/// Methods accepted on the relay path, advertised on 405 and OPTIONS.
pub const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Failures while obtaining a bearer token for the storage service
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("refresh credentials are not configured")]
    MissingCredentialConfig,

    /// The identity provider refused the exchange or answered with something
    /// that carries no access token. `status` is the upstream status when the
    /// provider answered with a non-success code.
    #[error("token exchange failed: {detail}")]
    ExchangeFailed {
        status: Option<StatusCode>,
        detail: String,
    },

    #[error("token exchange request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures while retrieving a document from the storage service
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("storage service rejected the access token")]
    Unauthorized { body: String },

    #[error("storage service returned {status}")]
    UpstreamFetchFailed { status: StatusCode, body: String },

    #[error("cannot build document URL from {0}")]
    InvalidUrl(String),

    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures while submitting a payload to the ingestion service
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("ingestion API key is not configured")]
    ServerMisconfigured,

    #[error("ingestion service returned {status}")]
    IngestionFailed { status: StatusCode, body: String },

    /// A success status with a body that is not JSON or has no file id
    #[error("ingestion service returned an unusable response")]
    InvalidResponse { body: String },

    #[error("invalid MIME type for upload: {0}")]
    InvalidMimeType(String),

    #[error("ingestion request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Every way a relay request can end other than success. Each variant maps
/// to one `error` code and one response status.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("missing or invalid request parameters")]
    MissingParameters { detail: Option<String> },

    #[error("no usable access token")]
    MissingAccessToken,

    #[error("token exchange failed")]
    CredentialExchangeFailed {
        status: Option<StatusCode>,
        detail: String,
    },

    #[error("storage service rejected the access token")]
    Unauthorized { detail: String },

    #[error("storage service returned {status}")]
    UpstreamFetchFailed { status: StatusCode, detail: String },

    #[error("server is misconfigured")]
    ServerMisconfigured,

    #[error("ingestion service returned {status}")]
    IngestionFailed { status: StatusCode, detail: String },

    #[error("unexpected failure: {0}")]
    UnexpectedFailure(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("not found")]
    NotFound,
}

impl RelayError {
    pub fn missing_parameters(detail: impl Into<String>) -> Self {
        RelayError::MissingParameters {
            detail: Some(detail.into()),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MissingParameters { .. } => "missing_params",
            RelayError::MissingAccessToken => "missing_access_token",
            RelayError::CredentialExchangeFailed { .. } => "token_refresh_failed",
            RelayError::Unauthorized { .. } => "drive_unauthorized",
            RelayError::UpstreamFetchFailed { .. } => "drive_error",
            RelayError::ServerMisconfigured => "server_misconfigured",
            RelayError::IngestionFailed { .. } => "upload_failed",
            RelayError::UnexpectedFailure(_) => "server_error",
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::NotFound => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingParameters { .. } => StatusCode::BAD_REQUEST,
            RelayError::MissingAccessToken | RelayError::Unauthorized { .. } => {
                StatusCode::UNAUTHORIZED
            }
            RelayError::CredentialExchangeFailed { status, .. } => status
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::UNAUTHORIZED),
            RelayError::UpstreamFetchFailed { status, .. }
            | RelayError::IngestionFailed { status, .. } => propagated(*status),
            RelayError::ServerMisconfigured | RelayError::UnexpectedFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Diagnostic text returned to the caller. Upstream bodies are passed
    /// through verbatim; configured secrets never reach this point.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RelayError::MissingParameters { detail } => detail.as_deref(),
            RelayError::CredentialExchangeFailed { detail, .. }
            | RelayError::Unauthorized { detail }
            | RelayError::UpstreamFetchFailed { detail, .. }
            | RelayError::IngestionFailed { detail, .. } => Some(detail),
            RelayError::UnexpectedFailure(detail) => Some(detail),
            RelayError::MissingAccessToken
            | RelayError::ServerMisconfigured
            | RelayError::MethodNotAllowed
            | RelayError::NotFound => None,
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let body = ErrorBody {
            error: self.code(),
            detail: self.detail(),
        };
        let mut response = json_response(self.status(), &body);

        if matches!(self, RelayError::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }

        response
    }
}

/// Upstream statuses are only propagated when they describe a failure, so a
/// caller never sees a success code on an error body.
fn propagated(status: StatusCode) -> StatusCode {
    if status.is_client_error() || status.is_server_error() {
        status
    } else {
        StatusCode::BAD_GATEWAY
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl From<CredentialError> for RelayError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::MissingCredentialConfig => RelayError::MissingAccessToken,
            CredentialError::ExchangeFailed { status, detail } => {
                RelayError::CredentialExchangeFailed { status, detail }
            }
            CredentialError::Transport(e) => RelayError::UnexpectedFailure(e.to_string()),
        }
    }
}

impl From<FetchError> for RelayError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Unauthorized { body } => RelayError::Unauthorized { detail: body },
            FetchError::UpstreamFetchFailed { status, body } => {
                RelayError::UpstreamFetchFailed {
                    status,
                    detail: body,
                }
            }
            FetchError::InvalidUrl(_) | FetchError::Transport(_) => {
                RelayError::UnexpectedFailure(e.to_string())
            }
        }
    }
}

impl From<ForwardError> for RelayError {
    fn from(e: ForwardError) -> Self {
        match e {
            ForwardError::ServerMisconfigured => RelayError::ServerMisconfigured,
            ForwardError::IngestionFailed { status, body } => RelayError::IngestionFailed {
                status,
                detail: body,
            },
            ForwardError::InvalidResponse { body } => RelayError::IngestionFailed {
                status: StatusCode::BAD_GATEWAY,
                detail: body,
            },
            ForwardError::InvalidMimeType(_) | ForwardError::Transport(_) => {
                RelayError::UnexpectedFailure(e.to_string())
            }
        }
    }
}
