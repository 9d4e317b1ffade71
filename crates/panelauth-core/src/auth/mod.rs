//! Authentication module for managing the user session and its tokens.
//!
//! This module provides:
//! - `SessionManager`: login, token persistence across a short-lived and a
//!   durable store, remembered-session expiry, refresh and logout
//! - the refresh interceptor (`valid_token`, `authorized`) with a single
//!   in-flight refresh
//! - `has_permission`: button-level permission checks
//! - `Navigator`: the hook told to show the login screen after logout
//!
//! Remembered sessions last `login_day` days (7 by default) from the last
//! interactive login.

pub mod error;
pub mod navigator;
pub mod permission;
pub mod refresher;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SessionError;
pub use navigator::{LogNavigator, Navigator};
pub use permission::{has_permission, Required, ALL_PERMISSIONS};
pub use session::{Credentials, SessionManager};
