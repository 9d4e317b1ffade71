//! Refresh-before-use and retry-on-401 for authenticated requests.
//!
//! Every authenticated call goes through [`SessionManager::valid_token`] or
//! [`SessionManager::authorized`]. Refreshes are single-flight: callers that
//! find the token stale queue on one async mutex, and whoever gets it second
//! sees the token the first one stored instead of refreshing again.

use std::future::Future;

use chrono::Duration;
use tracing::debug;

use crate::api::ApiError;
use crate::models::TokenInfo;

use super::{SessionError, SessionManager};

/// Refresh tokens that expire within this many seconds.
const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

impl SessionManager {
    /// A token usable right now, refreshed first if it is about to expire.
    pub async fn valid_token(&self) -> Result<TokenInfo, SessionError> {
        let current = self.read_token()?.ok_or(SessionError::NotAuthenticated)?;
        if !current.expires_within(Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)) {
            return Ok(current);
        }
        debug!(expires = current.expires, "Token close to expiry, refreshing");
        self.refresh_once(&current).await
    }

    /// Refresh `stale` unless another caller already replaced it.
    async fn refresh_once(&self, stale: &TokenInfo) -> Result<TokenInfo, SessionError> {
        let _guard = self.refresh_guard.lock().await;

        let latest = self.read_token()?.ok_or(SessionError::NotAuthenticated)?;
        if latest.token != stale.token {
            debug!("Token already refreshed by another caller");
            return Ok(latest);
        }
        self.refresh(&latest.refresh_token).await
    }

    /// Run `request` with a valid token. If the backend answers 401 the
    /// token is refreshed once and the request retried once.
    pub async fn authorized<T, F, Fut>(&self, request: F) -> Result<T, SessionError>
    where
        F: Fn(TokenInfo) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.valid_token().await?;
        match request(token.clone()).await {
            Err(ApiError::Unauthorized) => {
                debug!("Request unauthorized, forcing token refresh");
                let fresh = self.refresh_once(&token).await?;
                Ok(request(fresh).await?)
            }
            other => Ok(other?),
        }
    }
}
