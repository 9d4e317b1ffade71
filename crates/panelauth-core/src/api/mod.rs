//! REST API client module for the admin-panel backend.
//!
//! This module provides the `AuthBackend` trait the session manager depends
//! on, and `ApiClient`, its HTTP implementation.
//!
//! Every endpoint answers with a `{success, code, message, data}` envelope;
//! `success: false` surfaces as `ApiError::Rejected` carrying the backend's
//! code and message.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AuthBackend;
pub use client::ApiClient;
pub use error::ApiError;
