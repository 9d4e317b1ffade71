//! Scripted backend and wiring shared by the session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{ApiError, AuthBackend};
use crate::crypto::PasswordCipher;
use crate::models::{LoginCaptcha, LoginConfig, LoginData, LoginRequest, TokenInfo, UserProfile};
use crate::storage::MemoryStore;

use super::SessionManager;

/// Issues `access-N` / `refresh-N` pairs, N counting logins plus refreshes.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub reject_login: bool,
    pub fail_refresh: bool,
    pub fail_logout: bool,
    pub empty_refresh_token: bool,
    pub login_delay_ms: u64,
    pub refresh_delay_ms: u64,
    pub permissions: Vec<String>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub last_password: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn last_password(&self) -> Option<String> {
        self.last_password.lock().unwrap().clone()
    }

    fn two_hours_from_now() -> i64 {
        (Utc::now() + chrono::Duration::hours(2)).timestamp_millis()
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> Result<LoginData, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_password.lock().unwrap() = Some(request.password.clone());
        if self.login_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.login_delay_ms)).await;
        }
        if self.reject_login {
            return Err(ApiError::rejected(10001, "bad credentials"));
        }

        let refresh_token = if self.empty_refresh_token { "" } else { "refresh-1" };
        Ok(LoginData {
            uid: "u-1".to_string(),
            username: request.username.clone(),
            token: "access-1".to_string(),
            expires: Self::two_hours_from_now(),
            refresh_token: refresh_token.to_string(),
            roles: Some(vec!["admin".to_string()]),
            permissions: Some(self.permissions.clone()),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenInfo, ApiError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.refresh_delay_ms)).await;
        }
        if self.fail_refresh {
            return Err(ApiError::rejected(401, "refresh token expired"));
        }
        Ok(TokenInfo::new(
            format!("access-{}", n + 1),
            Self::two_hours_from_now(),
            format!("refresh-{}", n + 1),
        ))
    }

    async fn profile(&self, _token: &str) -> Result<UserProfile, ApiError> {
        Ok(UserProfile {
            uid: "u-1".to_string(),
            username: "admin".to_string(),
            nickname: "Administrator".to_string(),
            role_name: "super".to_string(),
            ..UserProfile::default()
        })
    }

    async fn logout(&self, _token: &str) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            return Err(ApiError::ServerError("unavailable".to_string()));
        }
        Ok(())
    }

    async fn login_config(&self) -> Result<LoginConfig, ApiError> {
        Ok(LoginConfig::default())
    }

    async fn captcha(&self) -> Result<LoginCaptcha, ApiError> {
        Ok(LoginCaptcha::default())
    }
}

/// A manager over two memory stores, with handles to everything it touches.
pub(crate) struct Harness {
    pub manager: SessionManager,
    pub backend: Arc<FakeBackend>,
    pub short_lived: Arc<MemoryStore>,
    pub durable: Arc<MemoryStore>,
    redirects: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::build(backend, None)
    }

    pub fn with_cipher(backend: FakeBackend, cipher: PasswordCipher) -> Self {
        Self::build(backend, Some(cipher))
    }

    fn build(backend: FakeBackend, cipher: Option<PasswordCipher>) -> Self {
        let backend = Arc::new(backend);
        let short_lived = Arc::new(MemoryStore::new());
        let durable = Arc::new(MemoryStore::new());
        let redirects = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&redirects);
        let mut manager = SessionManager::new(backend.clone(), short_lived.clone(), durable.clone())
            .with_navigator(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        if let Some(cipher) = cipher {
            manager = manager.with_cipher(cipher);
        }

        Self {
            manager,
            backend,
            short_lived,
            durable,
            redirects,
        }
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}
