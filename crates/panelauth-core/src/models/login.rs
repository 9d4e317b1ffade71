use serde::{Deserialize, Serialize};

use super::TokenInfo;

/// Response envelope used by every backend endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Body of `POST login/accountLogin`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_remembered: Option<bool>,
}

/// `data` of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

impl LoginData {
    pub fn token_info(&self) -> TokenInfo {
        TokenInfo::new(self.token.clone(), self.expires, self.refresh_token.clone())
    }
}

/// Body of `POST login/refreshToken`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// `data` of `GET login/config`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginConfig {
    pub register_switch: bool,
    pub captcha_switch: bool,
    pub captcha_type: i32,
    pub protocol: String,
    pub policy: String,
}

/// `data` of `GET login/captcha`: captcha id and the image as base64.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginCaptcha {
    pub cid: String,
    pub base64: String,
}
