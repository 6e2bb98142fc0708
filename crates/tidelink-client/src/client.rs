//! Provider request pipeline
//!
//! [`ProviderClient`] ties the token store, auth protocol, refresh
//! coordinator, and retry engine together behind one `request` call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use tidelink_client::{ClientConfig, ProviderClient, RequestOptions};
//!
//! # async fn example() -> tidelink_client::Result<()> {
//! let client = ProviderClient::new(ClientConfig::new("client-id", "http://localhost:3000/callback"))?;
//! client.set_tokens("access", Some("refresh".into()), 3600);
//!
//! let me = client
//!     .request(Method::GET, "/v2/users/me", RequestOptions::new().param("countryCode", "US"))
//!     .await?;
//! println!("{}", me.body);
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tidelink_core::{ClientConfig, TokenSet};
use tracing::{debug, warn};
use url::Url;

use crate::{
    auth::AuthProtocol,
    refresh::RefreshCoordinator,
    retry::{BackoffPolicy, ErrorBody, Reauthorize, RetryEngine},
    store::TokenStore,
    NetworkErrorKind, Result, TidalError,
};

// ============================================================================
// Request / response types
// ============================================================================

/// Per-call options for [`ProviderClient::request`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters appended to the URL of GET requests
    pub params: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Extra headers; these replace defaults of the same name
    pub headers: HeaderMap,
    /// Overrides the configured retry budget
    pub max_retries: Option<u32>,
    /// Overrides the configured per-attempt timeout
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful Provider response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body; `Null` for empty bodies
    pub body: Value,
}

impl ApiResponse {
    /// Decodes the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| TidalError::InvalidResponse(format!("unexpected response shape: {e}")))
    }
}

// ============================================================================
// ProviderClient
// ============================================================================

/// Authenticated client for the Provider's auth server and catalog API
///
/// Cloning is cheap; clones share token state and the in-flight refresh.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    config: Arc<ClientConfig>,
    store: Arc<TokenStore>,
    auth: AuthProtocol,
    refresh: Arc<RefreshCoordinator>,
    engine: RetryEngine,
}

impl ProviderClient {
    /// Creates a client with no tokens.
    ///
    /// Fails with [`TidalError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TidalError::InvalidConfig(joined));
        }

        let http = Client::builder()
            .user_agent(concat!("tidelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TidalError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        let config = Arc::new(config);
        let engine = RetryEngine::new(http, BackoffPolicy::from_config(&config));
        let store = Arc::new(TokenStore::new(config.refresh_skew));
        let auth = AuthProtocol::new(Arc::clone(&config), engine.clone());
        let refresh = Arc::new(RefreshCoordinator::new(Arc::clone(&store), auth.clone()));

        Ok(Self {
            config,
            store,
            auth,
            refresh,
            engine,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------------

    /// URL to send the user to for consent. See [`AuthProtocol::authorization_url`].
    pub fn authorization_url(&self, state: &str, code_challenge: Option<&str>) -> Result<String> {
        self.auth.authorization_url(state, code_challenge)
    }

    /// Exchanges an authorization code and stores the resulting tokens.
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet> {
        let tokens = self.auth.exchange_code(code, code_verifier).await?;
        let ttl = tokens.ttl_seconds();
        self.store
            .set_tokens(tokens.access_token, tokens.refresh_token, ttl);
        Ok(self.store.snapshot())
    }

    // ------------------------------------------------------------------------
    // Token state
    // ------------------------------------------------------------------------

    /// Injects tokens obtained elsewhere (e.g. restored from a cookie).
    pub fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        ttl_seconds: u64,
    ) {
        self.store.set_tokens(access_token, refresh_token, ttl_seconds);
    }

    /// Replaces token state with a previously captured [`TokenSet`].
    ///
    /// A missing `expires_at` next to an access token is filled in; see
    /// [`TokenStore::set`].
    pub fn set_token_set(&self, tokens: TokenSet) {
        self.store.set(tokens);
    }

    pub fn clear_tokens(&self) {
        self.store.clear();
    }

    /// Current token state, for the embedding to persist.
    pub fn tokens(&self) -> TokenSet {
        self.store.snapshot()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn needs_refresh(&self) -> bool {
        self.store.needs_refresh()
    }

    /// Returns a usable access token, refreshing first if needed.
    pub async fn ensure_valid_token(&self) -> Result<String> {
        self.refresh.ensure_valid_token().await
    }

    /// Forces a refresh and returns the new access token.
    pub async fn refresh_now(&self) -> Result<String> {
        self.refresh.refresh_now().await
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    /// Resolves `path` against the API base unless it is already absolute.
    fn resolve_url(&self, path: &str, params: &[(String, String)]) -> Result<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            let base = self.config.api_base_url.trim_end_matches('/');
            if path.starts_with('/') {
                format!("{base}{path}")
            } else {
                format!("{base}/{path}")
            }
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| TidalError::InvalidConfig(format!("invalid request URL '{raw}': {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Sends an authenticated request to the Provider.
    ///
    /// Refreshes a stale token before sending, retries per the retry engine,
    /// and refreshes once on 401. Terminal 4xx responses become
    /// [`TidalError::ApiClient`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let token = self.refresh.ensure_valid_token().await?;
        let url = self.resolve_url(path, query_params(&method, &options.params))?;
        let url_string = url.to_string();

        let mut builder = self
            .engine
            .http()
            .request(method.clone(), url)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/json")
            .timeout(options.timeout.unwrap_or(self.config.base_timeout));
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let mut request = builder.build().map_err(|e| TidalError::NonRetriableNetwork {
            kind: NetworkErrorKind::InvalidRequest,
            source: Arc::new(e),
        })?;
        request.headers_mut().extend(options.headers);

        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let reauth: &dyn Reauthorize = self.refresh.as_ref();
        let response = self
            .engine
            .execute(request, max_retries, Some(reauth))
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| {
            TidalError::InvalidResponse(format!("failed to read response from {url_string}: {e}"))
        })?;

        if !status.is_success() {
            let details = ErrorBody::parse(&text);
            warn!(
                method = %method,
                url = %url_string,
                status = status.as_u16(),
                sub_status = ?details.sub_status,
                "Provider rejected request"
            );
            return Err(TidalError::ApiClient {
                status: status.as_u16(),
                url: url_string,
                error: details.error,
                user_message: details.user_message,
                sub_status: details.sub_status,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                TidalError::InvalidResponse(format!("non-JSON body from {url_string}: {e}"))
            })?
        };

        debug!(method = %method, url = %url_string, status = status.as_u16(), "Request completed");
        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// Query parameters sent with `method`; only GET carries them.
fn query_params<'a>(method: &Method, params: &'a [(String, String)]) -> &'a [(String, String)] {
    if *method == Method::GET {
        params
    } else {
        if !params.is_empty() {
            warn!(method = %method, count = params.len(), "Dropping query parameters on non-GET request");
        }
        &[]
    }
}
