//! Token provider client.
//!
//! The remote `OAuth2` service is an opaque collaborator: it exchanges an
//! authorization code for tokens and refreshes them. Everything else
//! (consent UI, redirects, callback hosting) happens outside this workspace.

use crate::error::{Error, Result};
use crate::token::{ErrorResponse, Token, TokenResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Identity of the user who authorized, as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Platform-side user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address, when the platform exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of a successful code exchange: tokens plus the authorizing user.
#[derive(Debug, Clone)]
pub struct Exchanged {
    /// The issued token material.
    pub token: Token,
    /// Who authorized.
    pub identity: Identity,
}

/// Client interface to the remote token-issuance service.
///
/// A trait so connectors and tests can substitute a fake provider; the
/// production implementation is [`HttpTokenProvider`].
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchanges an authorization code for tokens and the user's identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the code or the request
    /// fails.
    async fn exchange_code(&self, code: &str) -> Result<Exchanged>;

    /// Refreshes an access token using a refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReauthRequired`] when the provider reports the
    /// refresh token as invalid or expired; other errors are transient.
    async fn refresh(&self, refresh_token: &str) -> Result<Token>;
}

/// Wire shape of the provider's exchange response.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(flatten)]
    token: TokenResponse,
    identity: Identity,
}

/// HTTP implementation of [`TokenProvider`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    exchange_url: Url,
    refresh_url: Url,
    http_client: reqwest::Client,
}

impl HttpTokenProvider {
    /// Creates a provider client for the given service base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not a valid URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            exchange_url: base.join("exchange")?,
            refresh_url: base.join("refresh")?,
            http_client: reqwest::Client::new(),
        })
    }

    async fn decode_token(response: reqwest::Response) -> Result<TokenResponse> {
        if response.status().is_success() {
            Ok(response.json::<TokenResponse>().await?)
        } else {
            let error: ErrorResponse = response.json().await?;
            Err(error.into_error())
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn exchange_code(&self, code: &str) -> Result<Exchanged> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);

        let response = self
            .http_client
            .post(self.exchange_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            let error = error.into_error();
            tracing::warn!(error = %error, "code exchange rejected by provider");
            return Err(error);
        }

        let exchange: ExchangeResponse = response.json().await?;
        if exchange.token.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access token".to_string()));
        }
        tracing::debug!(user = %exchange.identity.id, "authorization code exchanged");

        Ok(Exchanged {
            token: Token::from_response(exchange.token),
            identity: exchange.identity,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);

        let response = self
            .http_client
            .post(self.refresh_url.clone())
            .form(&params)
            .send()
            .await?;

        let token_response = match Self::decode_token(response).await {
            Ok(token_response) => token_response,
            Err(err) => {
                tracing::warn!(error = %err, "token refresh rejected by provider");
                return Err(err);
            }
        };
        let mut token = Token::from_response(token_response);

        // Preserve the refresh token if the provider did not rotate it.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }
}
