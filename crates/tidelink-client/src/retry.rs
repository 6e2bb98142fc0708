//! Retry engine for Provider requests
//!
//! Issues a prepared request, classifies each outcome, and decides whether to
//! sleep and try again, refresh credentials once, or hand the result back.
//!
//! ## Classification
//!
//! | Outcome | Action |
//! |---|---|
//! | 2xx | returned |
//! | 401 with a [`Reauthorize`] hook | refresh once, rewrite `Authorization`, re-issue |
//! | 429 | sleep `Retry-After` (or backoff), retry up to `max_retries` |
//! | 5xx, timeout, refused/reset connection, DNS | backoff, retry up to `max_retries` |
//! | other 4xx | returned for the caller to map |
//! | TLS/certificate, unbuildable request | raised immediately |
//!
//! The 401 refresh does not count against `max_retries`.

use std::{
    error::Error as StdError,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use rand::Rng;
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, RETRY_AFTER},
    Client, Method, Request, Response, StatusCode,
};
use serde::Deserialize;
use tidelink_core::ClientConfig;
use tracing::{debug, info, warn};

use crate::{NetworkErrorKind, Result, TidalError, TransientCause};

/// Longest wait honored for a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

// ============================================================================
// Classification
// ============================================================================

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    RefreshableAuth,
    RateLimited,
    RetriableTransient,
    TerminalClient,
    TerminalServer,
    NonRetriableNetwork,
}

/// Classifies an HTTP status.
///
/// `can_reauthorize` is true when a refresh hook is available; `can_retry` is
/// false once the retry budget is spent.
pub fn classify_status(status: StatusCode, can_reauthorize: bool, can_retry: bool) -> Classification {
    if status.is_success() || status.is_redirection() || status.is_informational() {
        Classification::Success
    } else if status == StatusCode::UNAUTHORIZED && can_reauthorize {
        Classification::RefreshableAuth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Classification::RateLimited
    } else if status.is_server_error() {
        if can_retry {
            Classification::RetriableTransient
        } else {
            Classification::TerminalServer
        }
    } else {
        Classification::TerminalClient
    }
}

/// Classification of a transport-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFailure {
    Transient(TransientCause),
    Fatal(NetworkErrorKind),
}

impl NetworkFailure {
    pub fn classification(&self) -> Classification {
        match self {
            Self::Transient(_) => Classification::RetriableTransient,
            Self::Fatal(_) => Classification::NonRetriableNetwork,
        }
    }
}

/// Classifies a reqwest error by walking its source chain.
pub fn classify_error(err: &reqwest::Error) -> NetworkFailure {
    if err.is_timeout() {
        return NetworkFailure::Transient(TransientCause::Timeout);
    }
    if err.is_builder() || err.is_redirect() {
        return NetworkFailure::Fatal(NetworkErrorKind::InvalidRequest);
    }

    let mut source = err.source();
    while let Some(current) = source {
        let message = current.to_string().to_ascii_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("ssl")
        {
            return NetworkFailure::Fatal(NetworkErrorKind::Tls);
        }
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return NetworkFailure::Transient(TransientCause::Dns);
        }
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            match io.kind() {
                ErrorKind::TimedOut => return NetworkFailure::Transient(TransientCause::Timeout),
                ErrorKind::ConnectionRefused => {
                    return NetworkFailure::Transient(TransientCause::ConnectionRefused)
                }
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => {
                    return NetworkFailure::Transient(TransientCause::ConnectionReset)
                }
                _ => {}
            }
        }
        source = current.source();
    }

    if err.is_connect() {
        NetworkFailure::Transient(TransientCause::Connect)
    } else if err.is_request() || err.is_body() {
        // Connection dropped mid-exchange
        NetworkFailure::Transient(TransientCause::ConnectionReset)
    } else {
        NetworkFailure::Fatal(NetworkErrorKind::Other)
    }
}

// ============================================================================
// Provider error bodies
// ============================================================================

/// Error payload the Provider attaches to 4xx responses
///
/// Accepts both the flat `{error, userMessage, subStatus}` shape and the
/// JSON:API `{errors: [{code, detail}]}` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub sub_status: Option<i64>,
    #[serde(default)]
    errors: Vec<JsonApiError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct JsonApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Sub-status the Provider uses for an expired access token
const SUB_STATUS_TOKEN_EXPIRED: i64 = 6004;

impl ErrorBody {
    /// Parses a response body; anything unparseable yields an empty body.
    pub fn parse(body: &str) -> Self {
        let mut parsed: Self = serde_json::from_str(body).unwrap_or_default();
        if let Some(first) = parsed.errors.first().cloned() {
            if parsed.error.is_none() {
                parsed.error = first.code;
            }
            if parsed.user_message.is_none() {
                parsed.user_message = first.detail;
            }
        }
        parsed
    }

    /// True when the Provider says the access token expired.
    pub fn indicates_expired_token(&self) -> bool {
        self.sub_status == Some(SUB_STATUS_TOKEN_EXPIRED)
            || self
                .user_message
                .as_deref()
                .is_some_and(|m| m.to_ascii_lowercase().contains("token expired"))
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff with uniform jitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            base: config.base_backoff,
            max: config.max_backoff,
            max_jitter: config.max_jitter,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    /// `min(max, base * 2^(attempt-1) + U(0, max_jitter))`
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let millis = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
        };
        self.base_delay(attempt).saturating_add(jitter).min(self.max)
    }
}

// ============================================================================
// Retry-After
// ============================================================================

/// Parses a `Retry-After` header value.
///
/// Accepts integer seconds or an HTTP-date, clamped to one hour. Returns
/// `None` when the value is unusable, in which case the caller falls back to
/// backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        let wait = diff.to_std().unwrap_or(Duration::ZERO);
        return Some(wait.min(MAX_RETRY_AFTER));
    }

    warn!(value, "Could not parse Retry-After header, using backoff");
    None
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

// ============================================================================
// Engine
// ============================================================================

/// Hook the engine calls when a request is rejected with 401
#[async_trait]
pub trait Reauthorize: Send + Sync {
    /// Returns a fresh access token to replace `stale_token`.
    async fn reauthorize(&self, stale_token: &str) -> Result<String>;
}

/// Bookkeeping for one try of a request
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// 1 for the initial request, incremented per retry
    pub attempt: u32,
    pub method: Method,
    pub url: String,
    pub started_at: Instant,
}

impl RequestAttempt {
    fn start(attempt: u32, method: &Method, url: &str) -> Self {
        Self {
            attempt,
            method: method.clone(),
            url: url.to_string(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

/// Executes requests with classification-driven retries
#[derive(Debug, Clone)]
pub struct RetryEngine {
    http: Client,
    backoff: BackoffPolicy,
}

impl RetryEngine {
    pub fn new(http: Client, backoff: BackoffPolicy) -> Self {
        Self { http, backoff }
    }

    /// The underlying HTTP client, for building requests
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Sends `request`, retrying per the classification table.
    ///
    /// Returns the response for 2xx and terminal 4xx statuses (401 included
    /// when no hook is given). The request body must be cloneable.
    pub async fn execute(
        &self,
        request: Request,
        max_retries: u32,
        reauth: Option<&dyn Reauthorize>,
    ) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().to_string();
        let mut current = request;
        let mut retries: u32 = 0;
        let mut reauthorized = false;

        loop {
            let to_send = current.try_clone().ok_or_else(|| {
                TidalError::InvalidConfig(format!("request body for {url} cannot be replayed"))
            })?;
            let attempt = RequestAttempt::start(retries + 1, &method, &url);
            debug!(method = %attempt.method, url = %attempt.url, attempt = attempt.attempt, "Sending request");

            let cause = match self.http.execute(to_send).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(
                        url = %attempt.url,
                        attempt = attempt.attempt,
                        status = status.as_u16(),
                        elapsed_ms = attempt.elapsed_ms(),
                        "Received response"
                    );

                    match classify_status(status, reauth.is_some(), retries < max_retries) {
                        Classification::Success | Classification::TerminalClient => {
                            if retries > 0 || reauthorized {
                                info!(url = %url, attempt = attempt.attempt, "Request succeeded after retry");
                            }
                            return Ok(response);
                        }
                        Classification::RefreshableAuth => {
                            let body = response.text().await.unwrap_or_default();
                            if reauthorized {
                                warn!(url = %url, "Still unauthorized after refresh");
                                return Err(TidalError::AuthRefresh {
                                    status: Some(status.as_u16()),
                                    body,
                                });
                            }
                            let hint = ErrorBody::parse(&body);
                            info!(
                                url = %url,
                                sub_status = ?hint.sub_status,
                                token_expired = hint.indicates_expired_token(),
                                "Received 401, refreshing access token"
                            );
                            if let Some(hook) = reauth {
                                let stale = bearer_token(&current).unwrap_or_default();
                                let fresh = hook.reauthorize(&stale).await?;
                                set_bearer(&mut current, &fresh)?;
                            }
                            reauthorized = true;
                            continue;
                        }
                        Classification::RateLimited => {
                            if retries >= max_retries {
                                warn!(url = %url, attempts = retries + 1, "429 retry limit exhausted");
                                return Err(TidalError::RateLimitExceeded {
                                    url,
                                    attempts: retries + 1,
                                });
                            }
                            retries += 1;
                            let delay = retry_after(&response)
                                .unwrap_or_else(|| self.backoff.delay(retries));
                            info!(
                                url = %url,
                                attempt = retries,
                                retry_after_ms = delay.as_millis(),
                                "Received 429, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Classification::TerminalServer => {
                            warn!(url = %url, status = status.as_u16(), attempts = retries + 1, "Server error retries exhausted");
                            return Err(TidalError::TransientExhausted {
                                url,
                                attempts: retries + 1,
                                cause: TransientCause::ServerError {
                                    status: status.as_u16(),
                                },
                            });
                        }
                        // 5xx with retries left
                        _ => TransientCause::ServerError {
                            status: status.as_u16(),
                        },
                    }
                }
                Err(err) => match classify_error(&err) {
                    NetworkFailure::Transient(cause) => {
                        if retries >= max_retries {
                            warn!(url = %url, attempts = retries + 1, cause = %cause, "Transient retries exhausted");
                            return Err(TidalError::TransientExhausted {
                                url,
                                attempts: retries + 1,
                                cause,
                            });
                        }
                        cause
                    }
                    NetworkFailure::Fatal(kind) => {
                        warn!(url = %url, kind = %kind, error = %err, "Non-retriable network failure");
                        return Err(TidalError::NonRetriableNetwork {
                            kind,
                            source: Arc::new(err),
                        });
                    }
                },
            };

            retries += 1;
            let delay = self.backoff.delay(retries);
            warn!(
                url = %url,
                attempt = retries,
                cause = %cause,
                delay_ms = delay.as_millis(),
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Extracts the bearer token from a request's `Authorization` header.
fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn set_bearer(request: &mut Request, token: &str) -> Result<()> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        TidalError::InvalidResponse("access token is not a valid header value".to_string())
    })?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

// ============================================================================
// Unit tests
// ============================================================================
