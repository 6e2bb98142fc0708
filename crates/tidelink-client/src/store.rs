//! In-memory token store
//!
//! Pure state: the store never performs I/O. It is the only place
//! `expires_at` is computed, so every writer goes through it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tidelink_core::tokens::{seconds, TokenSet};
use tracing::debug;

use crate::auth::DEFAULT_TOKEN_TTL_SECS;

/// Token state for one client, guarded by a short-lived mutex
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct TokenStore {
    inner: Mutex<TokenSet>,
    refresh_skew: chrono::Duration,
}

impl TokenStore {
    /// Creates an empty store that treats tokens as stale `refresh_skew`
    /// before they expire.
    pub fn new(refresh_skew: std::time::Duration) -> Self {
        Self {
            inner: Mutex::new(TokenSet::empty()),
            refresh_skew: chrono::Duration::from_std(refresh_skew)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces all token state; the access token expires `ttl_seconds` from now.
    pub fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        ttl_seconds: u64,
    ) {
        *self.lock() = TokenSet::issued_at(access_token, refresh_token, ttl_seconds, Utc::now());
    }

    /// Replaces all token state with a previously captured set.
    ///
    /// An access token without an expiry is given one: it is treated as
    /// already expired when a refresh token can replace it, otherwise it gets
    /// the default lifetime.
    pub fn set(&self, tokens: TokenSet) {
        *self.lock() = normalize(tokens, Utc::now());
    }

    /// Records the result of a refresh grant.
    ///
    /// The previous refresh token is kept when the Provider does not rotate it.
    pub fn apply_refresh(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        ttl_seconds: u64,
    ) {
        let mut tokens = self.lock();
        tokens.access_token = Some(access_token.into());
        if refresh_token.is_some() {
            tokens.refresh_token = refresh_token;
        }
        tokens.expires_at = Some(Utc::now() + seconds(ttl_seconds));
    }

    /// Forgets all tokens.
    pub fn clear(&self) {
        *self.lock() = TokenSet::empty();
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> TokenSet {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    /// True when the access token is absent or within the skew window of expiry.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.lock().needs_refresh_at(now, self.refresh_skew)
    }
}

/// Ensures an access token always carries an expiry.
fn normalize(mut tokens: TokenSet, now: DateTime<Utc>) -> TokenSet {
    if tokens.access_token.is_some() && tokens.expires_at.is_none() {
        let expires_at = if tokens.refresh_token.is_some() {
            now
        } else {
            now + seconds(DEFAULT_TOKEN_TTL_SECS)
        };
        debug!(
            refreshable = tokens.refresh_token.is_some(),
            "Access token set without expiry, assigning one"
        );
        tokens.expires_at = Some(expires_at);
    }
    tokens
}
