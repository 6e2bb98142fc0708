//! OAuth token state shared between the client and its embedding
//!
//! [`TokenSet`] is the unit of authentication state: the client holds one in
//! memory, and an embedding that persists tokens (e.g. in HTTP-only cookies)
//! moves it in and out through serde.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Authentication state for one Provider session
///
/// Invariant: when `access_token` is present, `expires_at` is present.
/// The refresh token is independent and may outlive many access tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Short-lived bearer credential for catalog requests
    pub access_token: Option<String>,
    /// Long-lived credential exchanged for new access tokens
    pub refresh_token: Option<String>,
    /// Wall-clock moment at which the access token stops being valid
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Builds a token set whose access token expires `ttl_seconds` after `now`.
    pub fn issued_at(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            expires_at: Some(now + seconds(ttl_seconds)),
        }
    }

    /// An empty token set (no session)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if an access token is present
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Returns true if a refresh token is present
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns true if the access token is absent or will expire within
    /// `skew` of `now`.
    ///
    /// A token without a recorded expiry is treated as still valid; the
    /// reactive 401 path covers it.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => now + skew >= expires_at,
            None => false,
        }
    }

    /// Returns true if the access token has already expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    /// Time left before the access token expires, or `None` if unknown
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|at| at - now)
    }
}

/// Converts a TTL in seconds into a chrono duration, saturating on overflow.
pub fn seconds(ttl_seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX / 1_000))
}
