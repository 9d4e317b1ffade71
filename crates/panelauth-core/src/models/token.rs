use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access credential pair issued by the backend.
///
/// `expires` is a unix timestamp in milliseconds. A value `<= 0` means the
/// token has no known expiry and lives for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token: String,
    pub expires: i64,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl TokenInfo {
    pub fn new(token: impl Into<String>, expires: i64, refresh_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires,
            refresh_token: refresh_token.into(),
        }
    }

    /// A token pair is usable only when both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.refresh_token.is_empty()
    }

    pub fn has_expiry(&self) -> bool {
        self.expires > 0
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.has_expiry() {
            DateTime::from_timestamp_millis(self.expires)
        } else {
            None
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// True if the token expires within `buffer` from now. Tokens without an
    /// expiry never do.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        match self.expires_at() {
            Some(at) => Utc::now() + buffer >= at,
            None => false,
        }
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
