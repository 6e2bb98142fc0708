//! Refresh coordination
//!
//! Refresh is lazy: it happens when a caller needs a token, never on a timer.
//! Concurrent callers share one refresh. The in-flight handle is published
//! before anyone awaits it, and whichever awaiter sees it complete first
//! clears it, so the next stale observation starts a new refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::{auth::AuthProtocol, retry::Reauthorize, store::TokenStore, Result, TidalError};

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Why a caller wants a refresh
#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    /// Explicit request; always refreshes
    Forced,
    /// Stored token is inside the refresh window
    Stale,
    /// Request sent with this token was rejected with 401
    Unauthorized(&'a str),
}

/// Decides when to refresh and deduplicates concurrent refreshes
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    auth: AuthProtocol,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, auth: AuthProtocol) -> Self {
        Self {
            store,
            auth,
            in_flight: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SharedRefresh>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a refresh is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.slot().is_some()
    }

    /// Returns a usable access token, refreshing first if it is stale.
    pub async fn ensure_valid_token(&self) -> Result<String> {
        let Some(access_token) = self.store.access_token() else {
            return Err(TidalError::NotAuthenticated);
        };
        if !self.store.needs_refresh() {
            return Ok(access_token);
        }

        debug!("Access token is within the refresh window");
        self.join_or_start(Trigger::Stale).await
    }

    /// Refreshes regardless of expiry, joining one already in flight.
    pub async fn refresh_now(&self) -> Result<String> {
        self.join_or_start(Trigger::Forced).await
    }

    /// Refresh triggered by a 401 for a request sent with `stale_token`.
    ///
    /// If the stored token already differs, another caller refreshed while
    /// this request was in flight and the current token is returned as is.
    pub async fn refresh_after_unauthorized(&self, stale_token: &str) -> Result<String> {
        if let Some(current) = self.store.access_token() {
            if current != stale_token {
                debug!("Access token was refreshed concurrently, reusing it");
                return Ok(current);
            }
        }
        self.join_or_start(Trigger::Unauthorized(stale_token)).await
    }

    /// Token that makes a new refresh unnecessary, checked under the slot lock
    /// so a refresh that completed since the caller looked is not repeated.
    fn already_fresh(&self, trigger: &Trigger<'_>) -> Option<String> {
        let current = self.store.access_token()?;
        match trigger {
            Trigger::Forced => None,
            Trigger::Stale => (!self.store.needs_refresh()).then_some(current),
            Trigger::Unauthorized(stale) => (current != *stale).then_some(current),
        }
    }

    async fn join_or_start(&self, trigger: Trigger<'_>) -> Result<String> {
        let shared = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    if let Some(token) = self.already_fresh(&trigger) {
                        debug!("Token was refreshed by another caller");
                        return Ok(token);
                    }
                    let started = self.start_refresh();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        let result = shared.clone().await;

        {
            let mut slot = self.slot();
            if slot
                .as_ref()
                .is_some_and(|current| Shared::ptr_eq(current, &shared))
            {
                *slot = None;
            }
        }

        result
    }

    fn start_refresh(&self) -> SharedRefresh {
        let store = Arc::clone(&self.store);
        let auth = self.auth.clone();

        async move {
            let Some(refresh_token) = store.refresh_token() else {
                warn!("Refresh required but no refresh token is available");
                return Err(TidalError::AuthRefresh {
                    status: None,
                    body: "no refresh token available".to_string(),
                });
            };

            let tokens = auth.refresh_tokens(&refresh_token).await?;
            let ttl = tokens.ttl_seconds();
            store.apply_refresh(tokens.access_token.clone(), tokens.refresh_token, ttl);
            info!(expires_in = ttl, "Stored refreshed access token");
            Ok(tokens.access_token)
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl Reauthorize for RefreshCoordinator {
    async fn reauthorize(&self, stale_token: &str) -> Result<String> {
        let current = self.store.access_token();
        if self.store.refresh_token().is_none() && current.as_deref() == Some(stale_token) {
            warn!("Access token rejected and no refresh token is available");
            return Err(TidalError::AuthRefresh {
                status: Some(401),
                body: "access token rejected and no refresh token available".to_string(),
            });
        }
        self.refresh_after_unauthorized(stale_token).await
    }
}
