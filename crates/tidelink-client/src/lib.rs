//! tidelink Client - authenticated TIDAL catalog client
//!
//! Provides an async client for:
//! - OAuth2 authorization-code flow (PKCE or client-secret Basic)
//! - Bearer token caching with proactive and reactive refresh
//! - Single-flight deduplication of concurrent refreshes
//! - Retries for throttling, transient network failures, and 5xx responses
//! - Typed wrappers for the catalog endpoints
//!
//! ## Modules
//!
//! - [`store`] - In-memory token state
//! - [`auth`] - Authorize URLs and token endpoint grants
//! - [`refresh`] - Refresh coordination (lazy, single-flight)
//! - [`retry`] - Failure classification, backoff, and `Retry-After`
//! - [`client`] - The request pipeline ([`ProviderClient`])
//! - [`catalog`] - Catalog endpoint wrappers

pub mod auth;
pub mod catalog;
pub mod client;
pub mod refresh;
pub mod retry;
pub mod store;

use std::{fmt, sync::Arc};

use thiserror::Error;

pub use auth::{new_state, PkcePair};
pub use client::{ApiResponse, ProviderClient, RequestOptions};
pub use tidelink_core::{ClientAuthMethod, ClientConfig, TokenSet};

/// Network failures that are never retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// TLS handshake or certificate validation failed
    Tls,
    /// The request could not be built or sent as given
    InvalidRequest,
    /// Any other failure outside the retriable set
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "TLS failure"),
            Self::InvalidRequest => write!(f, "invalid request"),
            Self::Other => write!(f, "network failure"),
        }
    }
}

/// The last failure seen before transient retries ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    Dns,
    /// Connection could not be established for another reason
    Connect,
    /// The Provider answered with a 5xx status
    ServerError { status: u16 },
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::Dns => write!(f, "DNS resolution failed"),
            Self::Connect => write!(f, "connection failed"),
            Self::ServerError { status } => write!(f, "server error {status}"),
        }
    }
}

/// Errors that can occur when talking to the Provider
///
/// `Clone` so that one refresh outcome can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error)]
pub enum TidalError {
    /// No access token is held; the user must authorize first
    #[error("Not authenticated: no access token available")]
    NotAuthenticated,

    /// The authorization code could not be exchanged
    #[error("Authorization code exchange failed with status {status}: {body}")]
    AuthExchange { status: u16, body: String },

    /// The refresh token was rejected or is missing; re-authentication is required
    #[error("Token refresh failed (status {status:?}): {body}")]
    AuthRefresh { status: Option<u16>, body: String },

    /// The Provider rejected the request with a terminal 4xx status
    #[error("Request to {url} failed with status {status}: {}", detail(.user_message, .error))]
    ApiClient {
        status: u16,
        url: String,
        error: Option<String>,
        user_message: Option<String>,
        sub_status: Option<i64>,
    },

    /// Still throttled after all retries
    #[error("Too many requests: retry limit exhausted after {attempts} attempts for {url}")]
    RateLimitExceeded { url: String, attempts: u32 },

    /// Transient failures persisted after all retries
    #[error("Request to {url} failed after {attempts} attempts: {cause}")]
    TransientExhausted {
        url: String,
        attempts: u32,
        cause: TransientCause,
    },

    /// A network failure that retrying cannot fix
    #[error("Network error ({kind}): {source}")]
    NonRetriableNetwork {
        kind: NetworkErrorKind,
        source: Arc<reqwest::Error>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TidalError {
    /// Returns true if the user has to go through authorization again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::AuthRefresh { .. })
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExchange { status, .. } | Self::ApiClient { status, .. } => Some(*status),
            Self::AuthRefresh { status, .. } => *status,
            Self::RateLimitExceeded { .. } => Some(429),
            Self::TransientExhausted {
                cause: TransientCause::ServerError { status },
                ..
            } => Some(*status),
            _ => None,
        }
    }
}

fn detail<'a>(user_message: &'a Option<String>, error: &'a Option<String>) -> &'a str {
    user_message
        .as_deref()
        .or(error.as_deref())
        .unwrap_or("no details")
}

/// Result type for Provider operations
pub type Result<T> = std::result::Result<T, TidalError>;
