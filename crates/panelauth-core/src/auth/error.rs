use thiserror::Error;

use crate::api::ApiError;
use crate::crypto::CryptoError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The backend refused the credentials. The payload is the backend's.
    #[error("Login failed: {0}")]
    Auth(#[source] ApiError),

    /// The refresh token was refused. The session has already been cleared.
    #[error("Token refresh failed: {0}")]
    Refresh(#[source] ApiError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Backend returned an incomplete token pair")]
    InvalidToken,

    /// The session was cleared while the request was in flight; its result
    /// was discarded.
    #[error("Session ended while the request was in flight")]
    Superseded,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl SessionError {
    /// Transient transport failure worth surfacing as "try again".
    pub fn is_network(&self) -> bool {
        match self {
            SessionError::Auth(e) | SessionError::Refresh(e) | SessionError::Api(e) => {
                e.is_network()
            }
            _ => false,
        }
    }

    /// The backend payload behind a rejection, if any.
    pub fn rejection(&self) -> Option<(i64, &str)> {
        match self {
            SessionError::Auth(ApiError::Rejected { code, message })
            | SessionError::Refresh(ApiError::Rejected { code, message })
            | SessionError::Api(ApiError::Rejected { code, message }) => {
                Some((*code, message.as_str()))
            }
            _ => None,
        }
    }
}
