//! Client-side session and token lifecycle for admin-panel backends.
//!
//! The [`SessionManager`] owns the access/refresh token pair and the
//! signed-in user, persisting them across a short-lived and a durable
//! [`KeyValueStore`](storage::KeyValueStore), and talks to the backend
//! through [`AuthBackend`](api::AuthBackend).

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, AuthBackend};
pub use auth::{Credentials, SessionError, SessionManager};
pub use config::Config;
pub use crypto::PasswordCipher;
pub use models::{TokenInfo, UserSession};
