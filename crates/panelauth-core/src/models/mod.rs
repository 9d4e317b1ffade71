//! Data models shared by the backend client and the session manager.
//!
//! - `TokenInfo`: the access/refresh token pair issued by the backend
//! - `UserSession`, `UserProfile`: the signed-in identity and its profile
//! - Login types: `LoginRequest`, `LoginData`, `LoginConfig`, `LoginCaptcha`
//! - `ApiResult`: the `{success, code, message, data}` response envelope

pub mod login;
pub mod token;
pub mod user;

pub use login::{ApiResult, LoginCaptcha, LoginConfig, LoginData, LoginRequest, RefreshTokenRequest};
pub use token::TokenInfo;
pub use user::{UserProfile, UserSession, DEFAULT_LOGIN_DAY};
