use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use url::Url;

pub const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";
pub const REFRESH_TOKEN_ENV: &str = "GOOGLE_REFRESH_TOKEN";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_DRIVE_URL: &str = "https://www.googleapis.com/drive/v3/";
const DEFAULT_FILES_URL: &str = "https://api.openai.com/v1/files";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Relay path must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("Request timeout cannot be 0")]
    InvalidTimeout,

    #[error("Upstream URL cannot be used as a base: {0}")]
    InvalidUpstream(Url),

    #[error("Invalid upstream URL: {0}")]
    UnparsableUpstream(#[from] url::ParseError),
}

/// A configured credential. Never printed by `Debug`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Relay service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for relay requests
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Path the relay endpoint is served on
    #[serde(default = "default_path")]
    pub path: String,
    /// Timeout applied to each outbound call separately
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound on the inbound JSON body
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default)]
    pub upstreams: Upstreams,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_path() -> String {
    "/api/convert".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_request_body_bytes() -> usize {
    64 * 1024
}

impl Config {
    /// Validates the relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }

        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        self.upstreams.resolve()?;
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Overrides for the three services the relay talks to, so the relay can be
/// pointed at proxies or test doubles. Unset entries use the public endpoints.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Upstreams {
    /// Identity provider token endpoint
    pub token_url: Option<Url>,
    /// Base of the storage API; `files/{id}` is appended to it
    pub drive_url: Option<Url>,
    /// Ingestion service upload endpoint
    pub files_url: Option<Url>,
}

/// Upstream locations with defaults applied.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamUrls {
    pub token_url: Url,
    pub drive_url: Url,
    pub files_url: Url,
}

impl Upstreams {
    pub fn resolve(&self) -> Result<UpstreamUrls, ValidationError> {
        let pick = |configured: &Option<Url>, default: &str| match configured {
            Some(url) => Ok(url.clone()),
            None => Url::parse(default).map_err(ValidationError::from),
        };

        let urls = UpstreamUrls {
            token_url: pick(&self.token_url, DEFAULT_TOKEN_URL)?,
            drive_url: pick(&self.drive_url, DEFAULT_DRIVE_URL)?,
            files_url: pick(&self.files_url, DEFAULT_FILES_URL)?,
        };

        if urls.drive_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidUpstream(urls.drive_url));
        }
        Ok(urls)
    }
}

/// Process-wide credentials. Read-only once the service is running.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    /// Standing refresh token used to mint access tokens for callers that
    /// do not bring their own
    pub refresh_token: Option<Secret>,
    /// Ingestion service API key
    pub api_key: Option<Secret>,
}

/// The three values needed for a refresh-token exchange, all present.
#[derive(Debug, Clone, Copy)]
pub struct RefreshCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a Secret,
    pub refresh_token: &'a Secret,
}

impl Credentials {
    /// Fills every field not set in the config file from `lookup`, then
    /// drops empty values. `lookup` is `std::env::var` in production.
    pub fn fill_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.client_id.is_none() {
            self.client_id = lookup(CLIENT_ID_ENV);
        }
        if self.client_secret.is_none() {
            self.client_secret = lookup(CLIENT_SECRET_ENV).map(Secret);
        }
        if self.refresh_token.is_none() {
            self.refresh_token = lookup(REFRESH_TOKEN_ENV).map(Secret);
        }
        if self.api_key.is_none() {
            self.api_key = lookup(API_KEY_ENV).map(Secret);
        }

        self.client_id = self.client_id.take().filter(|v| !v.trim().is_empty());
        for secret in [
            &mut self.client_secret,
            &mut self.refresh_token,
            &mut self.api_key,
        ] {
            *secret = secret.take().filter(|s| !s.expose().trim().is_empty());
        }
    }

    pub fn refresh(&self) -> Option<RefreshCredentials<'_>> {
        Some(RefreshCredentials {
            client_id: self.client_id.as_deref().filter(|v| !v.is_empty())?,
            client_secret: self.client_secret.as_ref().filter(|s| !s.0.is_empty())?,
            refresh_token: self.refresh_token.as_ref().filter(|s| !s.0.is_empty())?,
        })
    }

    pub fn api_key(&self) -> Option<&Secret> {
        self.api_key.as_ref().filter(|s| !s.0.is_empty())
    }
}
