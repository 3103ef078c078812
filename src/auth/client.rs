//! OAuth2 authorization-code client
//!
//! Builds the authorize redirect, exchanges the callback code for an access
//! token and fetches the userinfo claims. Provider-agnostic apart from the
//! endpoints resolved from configuration.

use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{OAuthProviderConfig, ProviderEndpoints};
use crate::error::AppError;
use crate::identity::Provider;

/// Token endpoint response
///
/// GitHub reports a bad code with `200 OK` and an `error` field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth client for one provider
pub struct ProviderClient<'a> {
    http: &'a reqwest::Client,
    provider: Provider,
    config: &'a OAuthProviderConfig,
    endpoints: ProviderEndpoints,
    redirect_uri: String,
}

impl<'a> ProviderClient<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        provider: Provider,
        config: &'a OAuthProviderConfig,
        redirect_uri: String,
    ) -> Self {
        Self {
            http,
            provider,
            config,
            endpoints: config.endpoints(provider),
            redirect_uri,
        }
    }

    /// Provider authorize URL carrying `state`
    pub fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let scope = self.endpoints.scopes.join(" ");
        let url = url::Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| {
            AppError::Config(format!(
                "providers.{}.authorize_url is invalid: {e}",
                self.provider
            ))
        })?;

        Ok(url.into())
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "{} token endpoint returned {}",
                self.provider.label(),
                status
            )));
        }

        let token: TokenResponse = response.json().await?;
        match token.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(access_token),
            _ => Err(AppError::Provider(format!(
                "{} rejected the authorization code: {}",
                self.provider.label(),
                token
                    .error_description
                    .or(token.error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }

    /// Fetch the raw userinfo claims for an access token
    pub async fn fetch_claims(&self, access_token: &str) -> Result<Map<String, Value>, AppError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "{} userinfo endpoint returned {}",
                self.provider.label(),
                status
            )));
        }

        match response.json::<Value>().await? {
            Value::Object(claims) => Ok(claims),
            _ => Err(AppError::Provider(format!(
                "{} userinfo response is not a JSON object",
                self.provider.label()
            ))),
        }
    }
}
