//! OAuth2 authorization-code protocol against the Provider's auth server
//!
//! ## Components
//!
//! - [`AuthProtocol`] - Authorize URLs and token endpoint grants
//! - [`TokenResponse`] - Token endpoint payload
//! - [`PkcePair`] / [`new_state`] - PKCE and CSRF helpers for embeddings
//!
//! Token endpoint calls go through the [`RetryEngine`] without a
//! re-authorization hook, so throttling and transient failures are retried
//! while any 4xx is reported as a failed grant.

use std::sync::Arc;

use oauth2::{CsrfToken, PkceCodeChallenge};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tidelink_core::{ClientAuthMethod, ClientConfig};
use tracing::{debug, info, warn};
use url::Url;

use crate::{retry::RetryEngine, NetworkErrorKind, Result, TidalError};

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

// ============================================================================
// Token endpoint payload
// ============================================================================

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Access token lifetime in seconds
    pub fn ttl_seconds(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)
    }
}

// ============================================================================
// PKCE / state helpers
// ============================================================================

/// A PKCE verifier and its S256 challenge
///
/// The embedding keeps `verifier` (e.g. in a cookie) between the authorize
/// redirect and the code exchange.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generates a random verifier and derives its SHA-256 challenge.
    pub fn generate() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            verifier: verifier.secret().to_string(),
            challenge: challenge.as_str().to_string(),
        }
    }
}

/// Generates a random `state` value for CSRF protection.
pub fn new_state() -> String {
    CsrfToken::new_random().secret().to_string()
}

// ============================================================================
// AuthProtocol
// ============================================================================

/// Authorization server operations
#[derive(Debug, Clone)]
pub struct AuthProtocol {
    config: Arc<ClientConfig>,
    engine: RetryEngine,
}

impl AuthProtocol {
    pub fn new(config: Arc<ClientConfig>, engine: RetryEngine) -> Self {
        Self { config, engine }
    }

    /// Builds the URL the user is redirected to for consent.
    ///
    /// Adds `code_challenge` and `code_challenge_method=S256` when a
    /// challenge is given.
    pub fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&self.config.authorize_url()).map_err(|e| {
            TidalError::InvalidConfig(format!("invalid auth_base_url: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri);
            if let Some(scope) = self.config.scope_string() {
                query.append_pair("scope", &scope);
            }
            query.append_pair("state", state);
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        debug!(pkce = code_challenge.is_some(), "Generated authorization URL");
        Ok(url.into())
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse> {
        info!("Exchanging authorization code for tokens");

        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
        ];
        if self.config.client_auth == ClientAuthMethod::Pkce {
            params.push(("client_id", self.config.client_id.clone()));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier.to_string()));
        }

        let (status, body) = self.token_request(&params).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Authorization code exchange rejected");
            return Err(TidalError::AuthExchange {
                status: status.as_u16(),
                body,
            });
        }

        let tokens = parse_token_response(&body)?;
        info!(
            expires_in = tokens.ttl_seconds(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Successfully obtained OAuth tokens"
        );
        Ok(tokens)
    }

    /// Runs a refresh-token grant.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse> {
        info!("Refreshing access token");

        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.config.client_id.clone()),
        ];

        let (status, body) = self.token_request(&params).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Refresh token rejected");
            return Err(TidalError::AuthRefresh {
                status: Some(status.as_u16()),
                body,
            });
        }

        let tokens = parse_token_response(&body)?;
        info!(
            expires_in = tokens.ttl_seconds(),
            rotated = tokens.refresh_token.is_some(),
            "Successfully refreshed access token"
        );
        Ok(tokens)
    }

    async fn token_request(
        &self,
        params: &[(&str, String)],
    ) -> Result<(reqwest::StatusCode, String)> {
        let mut builder = self
            .engine
            .http()
            .post(self.config.token_url())
            .header(ACCEPT, "application/json")
            .timeout(self.config.base_timeout)
            .form(params);

        if self.config.client_auth == ClientAuthMethod::ClientSecretBasic {
            builder = builder.basic_auth(&self.config.client_id, self.config.client_secret.as_deref());
        }

        let request = builder
            .build()
            .map_err(|e| TidalError::NonRetriableNetwork {
                kind: NetworkErrorKind::InvalidRequest,
                source: Arc::new(e),
            })?;

        let response = self
            .engine
            .execute(request, self.config.max_retries, None)
            .await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            TidalError::InvalidResponse(format!("failed to read token response: {e}"))
        })?;
        Ok((status, body))
    }
}

fn parse_token_response(body: &str) -> Result<TokenResponse> {
    serde_json::from_str(body)
        .map_err(|e| TidalError::InvalidResponse(format!("malformed token response: {e}")))
}
