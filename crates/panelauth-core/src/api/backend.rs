use async_trait::async_trait;

use crate::models::{LoginCaptcha, LoginConfig, LoginData, LoginRequest, TokenInfo, UserProfile};

use super::ApiError;

/// The authentication backend the session manager talks to.
///
/// `ApiClient` is the HTTP implementation; tests substitute scripted fakes.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn login(&self, request: &LoginRequest) -> Result<LoginData, ApiError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo, ApiError>;

    /// Fetch the profile of the user owning `token`.
    async fn profile(&self, token: &str) -> Result<UserProfile, ApiError>;

    /// Tell the backend the session is over. Callers treat failures as
    /// best effort.
    async fn logout(&self, token: &str) -> Result<(), ApiError>;

    /// Login page settings (captcha switch and friends).
    async fn login_config(&self) -> Result<LoginConfig, ApiError>;

    /// A fresh captcha challenge.
    async fn captcha(&self) -> Result<LoginCaptcha, ApiError>;
}
