use crate::config::{Credentials, RefreshCredentials};
use crate::errors::CredentialError;
use crate::metrics_defs::TOKEN_REFRESHED;
use crate::types::{CredentialOrigin, ResolvedCredential};
use serde::Deserialize;
use shared::counter;
use std::sync::Arc;
use url::Url;

/// Caller tokens this short are treated as absent. A cheap shortcut so that
/// obviously empty values fall through to the refresh path; the storage
/// service still decides whether a token is actually valid.
const MIN_CALLER_TOKEN_LEN: usize = 20;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub fn is_plausible_token(token: &str) -> bool {
    token.len() > MIN_CALLER_TOKEN_LEN
}

/// Produces the bearer token used against the storage service.
pub struct CredentialResolver {
    client: reqwest::Client,
    token_url: Url,
    credentials: Arc<Credentials>,
}

impl CredentialResolver {
    pub fn new(client: reqwest::Client, token_url: Url, credentials: Arc<Credentials>) -> Self {
        CredentialResolver {
            client,
            token_url,
            credentials,
        }
    }

    pub async fn resolve(
        &self,
        caller_token: Option<&str>,
    ) -> Result<ResolvedCredential, CredentialError> {
        if let Some(token) = caller_token.filter(|t| is_plausible_token(t)) {
            return Ok(ResolvedCredential {
                token: token.to_string(),
                origin: CredentialOrigin::CallerSupplied,
            });
        }

        let refresh = self
            .credentials
            .refresh()
            .ok_or(CredentialError::MissingCredentialConfig)?;

        let token = self.exchange(refresh).await?;
        counter!(TOKEN_REFRESHED).increment(1);

        Ok(ResolvedCredential {
            token,
            origin: CredentialOrigin::Refreshed,
        })
    }

    async fn exchange(&self, refresh: RefreshCredentials<'_>) -> Result<String, CredentialError> {
        let form = [
            ("client_id", refresh.client_id),
            ("client_secret", refresh.client_secret.expose()),
            ("refresh_token", refresh.refresh_token.expose()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Identity provider rejected token exchange");
            return Err(CredentialError::ExchangeFailed {
                status: Some(status),
                detail,
            });
        }

        // The body holds a fresh access token, so decode errors are reported
        // without echoing it.
        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|_| CredentialError::ExchangeFailed {
                status: None,
                detail: "token response is not valid JSON".into(),
            })?;

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CredentialError::ExchangeFailed {
                status: None,
                detail: "token response carried no access_token".into(),
            })
    }
}
