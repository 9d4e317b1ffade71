use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthBackend};
use crate::crypto::PasswordCipher;
use crate::models::{LoginRequest, TokenInfo, UserSession};
use crate::storage::{Expiry, KeyValueStore, KeyValueStoreExt, StorageError};

use super::navigator::{LogNavigator, Navigator};
use super::permission::{self, Required};
use super::SessionError;

/// Token pair, in both tiers.
pub const TOKEN_KEY: &str = "authorized-token";

/// Short-lived marker telling other tabs/processes a session is active.
pub const MULTIPLE_TABS_KEY: &str = "multiple-tabs";

/// Persisted `UserSession`.
pub const USER_KEY: &str = "user-info";

/// Wall-clock time (ms) of the last interactive login of a remembered session.
pub const LOGIN_TIME_KEY: &str = "login-time";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// What the login form submits.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub captcha_id: Option<String>,
    pub captcha: Option<String>,
    /// "Remember me": keep the session across restarts.
    pub remember: bool,
    /// How many days a remembered session lasts. Keeps the current setting
    /// when `None`.
    pub login_day: Option<u32>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

/// True once a remembered session anchored at `login_time_ms` is older than
/// `login_day` days. Exactly `login_day` days old is still valid.
pub fn durable_session_expired(login_time_ms: i64, now_ms: i64, login_day: u32) -> bool {
    now_ms.saturating_sub(login_time_ms) > i64::from(login_day) * MILLIS_PER_DAY
}

/// Short-lived expiry for a token: its own expiry, or the session when it has
/// none or it already passed (the refresh token inside stays usable).
fn short_lived_expiry(token: &TokenInfo) -> Expiry {
    if token.has_expiry() && !token.is_expired() {
        Expiry::at_millis(token.expires)
    } else {
        Expiry::Session
    }
}

/// Single authority over the access token and the signed-in user.
///
/// Reconciles a short-lived store (gone when the session ends) with a
/// durable store (kept across restarts when the user asked to be
/// remembered). Share it by `Arc`; every method takes `&self`.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    short_lived: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    cipher: Option<PasswordCipher>,
    state: RwLock<UserSession>,
    /// Advanced by every clear; in-flight requests that straddle one drop
    /// their result.
    epoch: AtomicU64,
    pub(super) refresh_guard: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        short_lived: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            backend,
            short_lived,
            durable,
            navigator: Arc::new(LogNavigator),
            cipher: None,
            state: RwLock::new(UserSession::default()),
            epoch: AtomicU64::new(0),
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Encrypt the password field of every login request with `cipher`.
    pub fn with_cipher(mut self, cipher: PasswordCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, UserSession> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, UserSession> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    // ===== Lifecycle =====

    /// Restore persisted state on start-up. Returns the token if a session
    /// survived.
    pub fn init(&self) -> Result<Option<TokenInfo>, SessionError> {
        let stored: Option<UserSession> = match self.short_lived.get_as(USER_KEY)? {
            Some(session) => Some(session),
            None => self.durable.get_as(USER_KEY)?,
        };
        if let Some(session) = stored {
            debug!(
                username = %session.username,
                remembered = session.is_remembered,
                "Restored user info"
            );
            *self.write_state() = session;
        }

        let token = self.read_token()?;
        if token.is_none() {
            self.write_state().clear_identity();
        }
        Ok(token)
    }

    /// Interactive login: exchange credentials, persist the token pair, mark
    /// the session start and load the profile.
    pub async fn login(&self, credentials: Credentials) -> Result<UserSession, SessionError> {
        {
            let mut state = self.write_state();
            state.is_remembered = credentials.remember;
            if let Some(days) = credentials.login_day {
                state.login_day = days.max(1);
            }
        }

        let request = self.login_request(&credentials)?;
        let epoch = self.epoch();

        info!(username = %credentials.username, remembered = credentials.remember, "Logging in");
        let data = self.backend.login(&request).await.map_err(|e| {
            warn!(username = %credentials.username, error = %e, "Login failed");
            if e.is_network() {
                SessionError::Api(e)
            } else {
                SessionError::Auth(e)
            }
        })?;

        if self.epoch() != epoch {
            debug!("Discarding login result, session was cleared meanwhile");
            return Err(SessionError::Superseded);
        }

        let token = data.token_info();
        if !token.is_complete() {
            return Err(SessionError::InvalidToken);
        }

        self.persist_token(&token)?;
        self.mark_session_start()?;

        {
            let mut state = self.write_state();
            state.uid = data.uid;
            state.username = if data.username.is_empty() {
                credentials.username.clone()
            } else {
                data.username
            };
            if let Some(roles) = data.roles {
                state.roles = roles;
            }
            if let Some(permissions) = data.permissions {
                state.permissions = permissions;
            }
        }

        self.fetch_profile().await
    }

    fn login_request(&self, credentials: &Credentials) -> Result<LoginRequest, SessionError> {
        let password = match &self.cipher {
            Some(cipher) => cipher.encrypt(&credentials.password)?,
            None => credentials.password.clone(),
        };
        Ok(LoginRequest {
            username: credentials.username.clone(),
            password,
            captcha_id: credentials.captcha_id.clone(),
            captcha: credentials.captcha.clone(),
            is_remembered: Some(credentials.remember),
        })
    }

    /// Fetch the profile with the current token and merge it into the
    /// session.
    pub async fn fetch_profile(&self) -> Result<UserSession, SessionError> {
        let epoch = self.epoch();
        let backend = Arc::clone(&self.backend);
        let profile = self
            .authorized(move |token| {
                let backend = Arc::clone(&backend);
                async move { backend.profile(&token.token).await }
            })
            .await?;

        if self.epoch() != epoch {
            return Err(SessionError::Superseded);
        }

        let session = {
            let mut state = self.write_state();
            state.merge_profile(profile);
            state.clone()
        };
        self.save_user(&session)?;
        Ok(session)
    }

    fn save_user(&self, session: &UserSession) -> Result<(), SessionError> {
        self.short_lived.set_as(USER_KEY, session, Expiry::Session)?;
        if session.is_remembered {
            self.durable.set_as(USER_KEY, session, Expiry::Session)?;
        } else {
            self.durable.remove(USER_KEY)?;
        }
        Ok(())
    }

    // ===== Token persistence =====

    /// Write the token pair to the short-lived tier, and to the durable tier
    /// when the session is remembered. A session that is not remembered
    /// leaves no durable token behind.
    pub fn persist_token(&self, token: &TokenInfo) -> Result<(), SessionError> {
        self.short_lived.set_as(TOKEN_KEY, token, short_lived_expiry(token))?;

        if self.is_remembered() {
            self.durable.set_as(TOKEN_KEY, token, Expiry::Session)?;
        } else {
            self.durable.remove(TOKEN_KEY)?;
        }
        debug!(expires = token.expires, remembered = self.is_remembered(), "Token persisted");
        Ok(())
    }

    /// Arm the multi-tab marker and, for remembered sessions, anchor the
    /// durable-session age at now. Only interactive logins call this.
    pub fn mark_session_start(&self) -> Result<(), SessionError> {
        let (remembered, login_day) = {
            let state = self.read_state();
            (state.is_remembered, state.login_day)
        };

        self.short_lived
            .set(MULTIPLE_TABS_KEY, json!(true), Expiry::in_days(login_day))?;

        if remembered {
            self.durable.set(
                LOGIN_TIME_KEY,
                json!(Utc::now().timestamp_millis()),
                Expiry::Session,
            )?;
        } else {
            self.durable.remove(LOGIN_TIME_KEY)?;
        }
        Ok(())
    }

    /// Current token pair, or `None` when logged out.
    ///
    /// Falls back to the durable tier when the short-lived one is empty. A
    /// durable session older than `login_day` days is cleared; a younger one
    /// is promoted back into the short-lived tier.
    pub fn read_token(&self) -> Result<Option<TokenInfo>, SessionError> {
        if let Some(token) = self.short_lived.get_as::<TokenInfo>(TOKEN_KEY)? {
            if token.is_complete() {
                return Ok(Some(token));
            }
        }

        let Some(token) = self.durable.get_as::<TokenInfo>(TOKEN_KEY)? else {
            return Ok(None);
        };

        let login_day = self.login_day();
        let login_time: Option<i64> = match self.durable.get_as(LOGIN_TIME_KEY) {
            Ok(at) => at,
            Err(StorageError::Serialization(e)) => {
                warn!(error = %e, "Unreadable login time, treating session as expired");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let expired = match login_time {
            Some(at) => durable_session_expired(at, Utc::now().timestamp_millis(), login_day),
            None => true,
        };

        if expired || !token.is_complete() {
            info!(login_day = login_day, "Remembered session expired");
            self.clear_state()?;
            return Ok(None);
        }

        debug!("Restoring remembered session");
        self.short_lived
            .set_as(TOKEN_KEY, &token, short_lived_expiry(&token))?;
        self.short_lived
            .set(MULTIPLE_TABS_KEY, json!(true), Expiry::in_days(login_day))?;
        Ok(Some(token))
    }

    // ===== Refresh & logout =====

    /// Exchange `refresh_token` for a new pair. Any failure logs the user
    /// out before it is returned, unless the session was cleared while the
    /// request was in flight; then the result is dropped as `Superseded`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo, SessionError> {
        let epoch = self.epoch();

        let result = self.backend.refresh(refresh_token).await;

        // A clear while the request was in flight makes any result stale.
        if self.epoch() != epoch {
            debug!("Discarding refresh result, session was cleared meanwhile");
            return Err(SessionError::Superseded);
        }

        let token = match result {
            Ok(token) if token.is_complete() => token,
            Ok(_) => {
                self.logout_after_failed_refresh();
                return Err(SessionError::Refresh(ApiError::InvalidResponse(
                    "incomplete token pair".to_string(),
                )));
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, logging out");
                self.logout_after_failed_refresh();
                return Err(SessionError::Refresh(e));
            }
        };

        if let Err(e) = self.persist_token(&token) {
            self.logout_after_failed_refresh();
            return Err(e);
        }
        info!("Token refreshed");
        Ok(token)
    }

    fn logout_after_failed_refresh(&self) {
        if let Err(e) = self.logout() {
            warn!(error = %e, "Failed to clear session after refresh failure");
        }
    }

    /// Clear the session everywhere and send the user back to login.
    /// Calling it while logged out only repeats the clearing.
    pub fn logout(&self) -> Result<(), SessionError> {
        let result = self.clear_state();
        self.navigator.redirect_to_login();
        result
    }

    /// Notify the backend (best effort), then [`logout`](Self::logout).
    pub async fn logout_remote(&self) -> Result<(), SessionError> {
        let token = self.read_token().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read token for logout notification");
            None
        });
        if let Some(token) = token {
            if let Err(e) = self.backend.logout(&token.token).await {
                warn!(error = %e, "Backend logout notification failed");
            }
        }
        self.logout()
    }

    /// Forget the in-memory identity and every stored session key. Keeps
    /// going past individual store failures and reports the first one.
    fn clear_state(&self) -> Result<(), SessionError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.write_state().clear_identity();

        let removals = [
            (&self.short_lived, TOKEN_KEY),
            (&self.short_lived, MULTIPLE_TABS_KEY),
            (&self.short_lived, USER_KEY),
            (&self.durable, TOKEN_KEY),
            (&self.durable, LOGIN_TIME_KEY),
            (&self.durable, USER_KEY),
        ];

        let mut first_error: Option<StorageError> = None;
        for (store, key) in removals {
            if let Err(e) = store.remove(key) {
                warn!(key = key, error = %e, "Failed to remove session key");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ===== Accessors =====

    pub fn has_permission<'a>(&self, required: impl Into<Required<'a>>) -> bool {
        permission::has_permission(&self.read_state().permissions, required)
    }

    /// Snapshot of the signed-in user.
    pub fn session(&self) -> UserSession {
        self.read_state().clone()
    }

    pub fn username(&self) -> String {
        self.read_state().username.clone()
    }

    pub fn nickname(&self) -> String {
        self.read_state().nickname.clone()
    }

    pub fn role_name(&self) -> String {
        self.read_state().role_name.clone()
    }

    pub fn roles(&self) -> Vec<String> {
        self.read_state().roles.clone()
    }

    pub fn permissions(&self) -> Vec<String> {
        self.read_state().permissions.clone()
    }

    pub fn avatar(&self) -> String {
        self.read_state().avatar.clone()
    }

    pub fn is_remembered(&self) -> bool {
        self.read_state().is_remembered
    }

    pub fn set_remembered(&self, remembered: bool) {
        self.write_state().is_remembered = remembered;
    }

    pub fn login_day(&self) -> u32 {
        self.read_state().login_day
    }

    /// Values below one day are raised to one.
    pub fn set_login_day(&self, days: u32) {
        self.write_state().login_day = days.max(1);
    }

    /// True if a token is available (possibly restored from the durable tier).
    pub fn is_authenticated(&self) -> bool {
        matches!(self.read_token(), Ok(Some(_)))
    }

    pub fn has_multi_tab_marker(&self) -> bool {
        matches!(self.short_lived.get(MULTIPLE_TABS_KEY), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{FakeBackend, Harness};
    use crate::storage::MemoryStore;
    use chrono::Duration;

    fn remembered(username: &str) -> Credentials {
        Credentials {
            remember: true,
            ..Credentials::new(username, "secret")
        }
    }

    fn backdate_login(harness: &Harness, age: Duration) {
        let at = (Utc::now() - age).timestamp_millis();
        harness.durable.set(LOGIN_TIME_KEY, json!(at), Expiry::Session).unwrap();
    }

    #[test]
    fn test_durable_session_boundary() {
        let now = 100 * MILLIS_PER_DAY;
        assert!(!durable_session_expired(now - 6 * MILLIS_PER_DAY, now, 7));
        assert!(!durable_session_expired(now - 7 * MILLIS_PER_DAY, now, 7));
        assert!(durable_session_expired(now - 7 * MILLIS_PER_DAY - 1, now, 7));
        assert!(durable_session_expired(now - 8 * MILLIS_PER_DAY, now, 7));
    }

    #[test]
    fn test_persist_then_read_returns_same_token() {
        let harness = Harness::new(FakeBackend::default());
        let expires = (Utc::now() + Duration::hours(2)).timestamp_millis();
        let token = TokenInfo::new("access", expires, "refresh");

        harness.manager.persist_token(&token).unwrap();
        assert_eq!(harness.manager.read_token().unwrap(), Some(token));
    }

    #[test]
    fn test_session_token_without_expiry() {
        let harness = Harness::new(FakeBackend::default());
        let token = TokenInfo::new("access", 0, "refresh");

        harness.manager.persist_token(&token).unwrap();
        assert_eq!(harness.manager.read_token().unwrap(), Some(token));
    }

    #[test]
    fn test_not_remembered_leaves_no_durable_token() {
        let harness = Harness::new(FakeBackend::default());
        let stale = TokenInfo::new("old", 0, "old-refresh");
        harness.durable.set_as(TOKEN_KEY, &stale, Expiry::Session).unwrap();

        harness.manager.set_remembered(false);
        harness.manager.persist_token(&TokenInfo::new("new", 0, "r")).unwrap();

        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remembered_login_survives_restart() {
        let harness = Harness::new(FakeBackend::default());
        let session = harness.manager.login(remembered("admin")).await.unwrap();
        assert!(session.is_remembered);
        assert_eq!(session.nickname, "Administrator");

        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_some());
        assert!(harness.durable.get(LOGIN_TIME_KEY).unwrap().is_some());
        assert!(harness.manager.has_multi_tab_marker());

        // Session ends: short-lived tier is gone
        harness.short_lived.clear().unwrap();

        let token = harness.manager.read_token().unwrap().expect("restored token");
        assert_eq!(token.token, "access-1");
        assert!(harness.short_lived.get(TOKEN_KEY).unwrap().is_some());
        assert!(harness.manager.has_multi_tab_marker());
    }

    #[tokio::test]
    async fn test_restore_does_not_move_login_anchor() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        backdate_login(&harness, Duration::days(3));
        let anchor = harness.durable.get(LOGIN_TIME_KEY).unwrap();

        harness.short_lived.clear().unwrap();
        harness.manager.read_token().unwrap().expect("restored token");

        assert_eq!(harness.durable.get(LOGIN_TIME_KEY).unwrap(), anchor);
    }

    #[tokio::test]
    async fn test_remembered_session_expires_after_login_day() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        backdate_login(&harness, Duration::days(8));
        harness.short_lived.clear().unwrap();

        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_none());
        assert!(harness.durable.get(LOGIN_TIME_KEY).unwrap().is_none());
        assert!(harness.durable.get(USER_KEY).unwrap().is_none());
        assert!(harness.short_lived.is_empty());
        assert!(harness.manager.username().is_empty());
    }

    #[tokio::test]
    async fn test_remembered_session_within_login_day() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        backdate_login(&harness, Duration::days(6));
        harness.short_lived.clear().unwrap();

        assert!(harness.manager.read_token().unwrap().is_some());
    }

    #[test]
    fn test_durable_token_without_anchor_is_expired() {
        let harness = Harness::new(FakeBackend::default());
        harness
            .durable
            .set_as(TOKEN_KEY, &TokenInfo::new("t", 0, "r"), Expiry::Session)
            .unwrap();

        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remembered_session_just_inside_login_day() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        backdate_login(&harness, Duration::days(7) - Duration::minutes(1));
        harness.short_lived.clear().unwrap();

        let token = harness.manager.read_token().unwrap().expect("restored token");
        assert_eq!(token.token, "access-1");
        assert!(harness.durable.get(LOGIN_TIME_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_login_time_clears_session() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        harness
            .durable
            .set(LOGIN_TIME_KEY, json!("yesterday"), Expiry::Session)
            .unwrap();
        harness.short_lived.clear().unwrap();

        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_none());
        assert!(harness.durable.get(LOGIN_TIME_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extreme_login_time_is_expired() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();
        harness
            .durable
            .set(LOGIN_TIME_KEY, json!(i64::MIN), Expiry::Session)
            .unwrap();
        harness.short_lived.clear().unwrap();

        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(!durable_session_expired(i64::MAX, 0, 7));
    }

    #[tokio::test]
    async fn test_huge_login_day_does_not_overflow() {
        let harness = Harness::new(FakeBackend::default());
        let credentials = Credentials {
            login_day: Some(u32::MAX),
            ..remembered("admin")
        };
        harness.manager.login(credentials).await.unwrap();
        assert_eq!(harness.manager.login_day(), u32::MAX);
        assert!(harness.manager.has_multi_tab_marker());

        harness.short_lived.clear().unwrap();
        let token = harness.manager.read_token().unwrap().expect("restored token");
        assert_eq!(token.token, "access-1");
    }

    #[tokio::test]
    async fn test_login_not_remembered_clears_previous_durable_session() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();

        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        assert!(harness.durable.get(TOKEN_KEY).unwrap().is_none());
        assert!(harness.durable.get(LOGIN_TIME_KEY).unwrap().is_none());
        assert!(harness.durable.get(USER_KEY).unwrap().is_none());
        assert!(harness.manager.read_token().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_login_surfaces_payload() {
        let harness = Harness::new(FakeBackend {
            reject_login: true,
            ..FakeBackend::default()
        });

        let err = harness.manager.login(Credentials::new("admin", "wrong")).await.unwrap_err();
        assert!(matches!(err, SessionError::Auth(_)));
        assert_eq!(err.rejection(), Some((10001, "bad credentials")));
        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.short_lived.is_empty());
        assert_eq!(harness.backend.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_token_is_never_persisted() {
        let harness = Harness::new(FakeBackend {
            empty_refresh_token: true,
            ..FakeBackend::default()
        });

        let err = harness.manager.login(remembered("admin")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidToken));
        assert!(harness.short_lived.is_empty());
        assert!(harness.durable.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_logs_out() {
        let harness = Harness::new(FakeBackend {
            fail_refresh: true,
            ..FakeBackend::default()
        });
        harness.manager.login(remembered("admin")).await.unwrap();

        let err = harness.manager.refresh("refresh-1").await.unwrap_err();
        assert!(matches!(err, SessionError::Refresh(_)));
        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.durable.is_empty());
        assert_eq!(harness.redirects(), 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token_in_both_tiers() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();

        let fresh = harness.manager.refresh("refresh-1").await.unwrap();
        assert_eq!(fresh.token, "access-2");
        assert_eq!(harness.manager.read_token().unwrap(), Some(fresh.clone()));
        let durable: Option<TokenInfo> = harness.durable.get_as(TOKEN_KEY).unwrap();
        assert_eq!(durable, Some(fresh));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(remembered("admin")).await.unwrap();

        harness.manager.logout().unwrap();
        harness.manager.logout().unwrap();

        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.short_lived.is_empty());
        assert!(harness.durable.is_empty());
        assert!(!harness.manager.has_multi_tab_marker());
        assert!(harness.manager.permissions().is_empty());
        // Preferences survive logout
        assert!(harness.manager.is_remembered());
        assert_eq!(harness.redirects(), 2);
    }

    #[tokio::test]
    async fn test_logout_remote_notifies_backend() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        harness.manager.logout_remote().await.unwrap();
        assert_eq!(harness.backend.logout_calls(), 1);
        assert_eq!(harness.manager.read_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_remote_ignores_backend_failure() {
        let harness = Harness::new(FakeBackend {
            fail_logout: true,
            ..FakeBackend::default()
        });
        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        harness.manager.logout_remote().await.unwrap();
        assert_eq!(harness.manager.read_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_resolving_after_logout_is_discarded() {
        let harness = Harness::new(FakeBackend {
            login_delay_ms: 50,
            ..FakeBackend::default()
        });

        let (login, _) = tokio::join!(harness.manager.login(remembered("admin")), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            harness.manager.logout().unwrap();
        });

        assert!(matches!(login, Err(SessionError::Superseded)));
        assert_eq!(harness.manager.read_token().unwrap(), None);
        assert!(harness.durable.is_empty());
    }

    #[tokio::test]
    async fn test_stale_refresh_failure_keeps_newer_session() {
        let harness = Harness::new(FakeBackend {
            fail_refresh: true,
            refresh_delay_ms: 50,
            ..FakeBackend::default()
        });
        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        let (refreshed, relogin) = tokio::join!(harness.manager.refresh("refresh-1"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            harness.manager.logout().unwrap();
            harness.manager.login(Credentials::new("admin", "secret")).await
        });

        assert!(matches!(refreshed, Err(SessionError::Superseded)));
        relogin.unwrap();
        let token = harness.manager.read_token().unwrap().expect("new session kept");
        assert_eq!(token.token, "access-1");
        assert_eq!(harness.manager.username(), "admin");
        assert_eq!(harness.redirects(), 1);
    }

    #[tokio::test]
    async fn test_permissions_from_login() {
        let harness = Harness::new(FakeBackend {
            permissions: vec!["system:user:add".to_string(), "system:user:edit".to_string()],
            ..FakeBackend::default()
        });
        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        assert!(harness.manager.has_permission("system:user:add"));
        assert!(harness.manager.has_permission(["system:user:add", "system:user:edit"]));
        assert!(!harness.manager.has_permission(["system:user:add", "system:role:add"]));
    }

    #[tokio::test]
    async fn test_password_is_encrypted_on_the_wire() {
        let cipher = PasswordCipher::new("shared-secret").unwrap();
        let harness = Harness::with_cipher(FakeBackend::default(), cipher.clone());

        harness.manager.login(Credentials::new("admin", "hunter2")).await.unwrap();

        let sent = harness.backend.last_password().expect("password sent");
        assert_ne!(sent, "hunter2");
        assert_eq!(cipher.decrypt(&sent).unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_init_restores_remembered_user() {
        let harness = Harness::new(FakeBackend::default());
        harness
            .manager
            .login(Credentials {
                login_day: Some(30),
                ..remembered("admin")
            })
            .await
            .unwrap();

        // New process: same durable tier, fresh short-lived tier
        let restarted = SessionManager::new(
            harness.backend.clone(),
            Arc::new(MemoryStore::new()),
            harness.durable.clone(),
        );
        let token = restarted.init().unwrap();

        assert!(token.is_some());
        assert_eq!(restarted.username(), "admin");
        assert_eq!(restarted.login_day(), 30);
        assert!(restarted.is_remembered());
    }

    #[tokio::test]
    async fn test_init_without_remembered_session() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.login(Credentials::new("admin", "secret")).await.unwrap();

        let restarted = SessionManager::new(
            harness.backend.clone(),
            Arc::new(MemoryStore::new()),
            harness.durable.clone(),
        );
        assert!(restarted.init().unwrap().is_none());
        assert!(restarted.username().is_empty());
        assert!(!restarted.is_authenticated());
    }

    #[test]
    fn test_login_day_floor() {
        let harness = Harness::new(FakeBackend::default());
        harness.manager.set_login_day(0);
        assert_eq!(harness.manager.login_day(), 1);
    }
}
