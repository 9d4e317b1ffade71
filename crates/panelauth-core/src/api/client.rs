//! HTTP client for the admin-panel authentication endpoints.
//!
//! This module provides the `ApiClient` struct, the reqwest implementation
//! of [`AuthBackend`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    ApiResult, LoginCaptcha, LoginConfig, LoginData, LoginRequest, RefreshTokenRequest, TokenInfo,
    UserProfile,
};

use super::{ApiError, AuthBackend};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const LOGIN_PATH: &str = "login/accountLogin";
const REFRESH_PATH: &str = "login/refreshToken";
const LOGOUT_PATH: &str = "login/logout";
const LOGIN_CONFIG_PATH: &str = "login/config";
const CAPTCHA_PATH: &str = "login/captcha";
const PROFILE_PATH: &str = "user/info";

/// Client for the backend REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (for example
    /// `https://admin.example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Unwrap the `{success, code, message, data}` envelope.
    fn into_data<T>(result: ApiResult<T>) -> Result<T, ApiError> {
        if !result.success {
            return Err(ApiError::rejected(result.code, result.message));
        }
        result
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response has no data".to_string()))
    }

    /// Send a request, retrying only on rate limiting, and decode the
    /// envelope.
    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<ApiResult<T>, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!(
                            "Failed to parse response from {}: {}",
                            path, e
                        ))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(
                        path = path,
                        retry = retries,
                        backoff_ms = backoff_ms,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<ApiResult<T>, ApiError> {
        let url = self.url(path);
        self.execute(path, || {
            let request = self.client.get(&url);
            match token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        })
        .await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<ApiResult<T>, ApiError> {
        let url = self.url(path);
        self.execute(path, || {
            let request = self.client.post(&url).json(body);
            match token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        })
        .await
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginData, ApiError> {
        debug!(username = %request.username, "Sending login request");
        Self::into_data(self.post(LOGIN_PATH, None, request).await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo, ApiError> {
        debug!("Sending token refresh request");
        let body = RefreshTokenRequest { refresh_token };
        Self::into_data(self.post(REFRESH_PATH, None, &body).await?)
    }

    async fn profile(&self, token: &str) -> Result<UserProfile, ApiError> {
        Self::into_data(self.get(PROFILE_PATH, Some(token)).await?)
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let result: ApiResult<Value> = self.post(LOGOUT_PATH, Some(token), &Value::Null).await?;
        if result.success {
            Ok(())
        } else {
            Err(ApiError::rejected(result.code, result.message))
        }
    }

    async fn login_config(&self) -> Result<LoginConfig, ApiError> {
        Self::into_data(self.get(LOGIN_CONFIG_PATH, None).await?)
    }

    async fn captcha(&self) -> Result<LoginCaptcha, ApiError> {
        Self::into_data(self.get(CAPTCHA_PATH, None).await?)
    }
}
