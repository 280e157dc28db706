//! Session management: login, token refresh, logout
//!
//! A [`SessionManager`] is an explicit handle created once at startup and
//! cloned into whatever needs it; there is no process-wide token state. It
//! holds at most one access/refresh pair and mirrors it into its
//! [`TokenStore`].
//!
//! Refreshes are serialized through `refresh_guard`. Every refresh names the
//! access token it means to replace: the one a `401` rejected, or the
//! current one for a proactive refresh. Once a caller holds the guard it
//! only refreshes if that token is still current, so a burst of concurrent
//! `401`s and scheduler ticks costs a single refresh round trip.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::models::{LoginCredentials, RefreshTokenRequest, TokenResponse};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::{
    config::ClientConfig,
    error::{AuthError, ClientError},
    http::{endpoint, error_from_response},
    store::{FileTokenStore, MemoryTokenStore, TokenStore},
};

/// An access/refresh token pair plus the access token's expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from a token response received at `issued_at`.
    ///
    /// Returns `None` for responses that cannot back a session: empty
    /// tokens, a token type other than `Bearer`, or an unrepresentable
    /// lifetime.
    pub fn issued(tokens: TokenResponse, issued_at: DateTime<Utc>) -> Option<Self> {
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return None;
        }
        if !tokens.token_type.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let lifetime = chrono::Duration::try_seconds(i64::try_from(tokens.expires_in).ok()?)?;
        let expires_at = issued_at.checked_add_signed(lifetime)?;

        Some(Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// Owns the current session; cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: RwLock<Option<Session>>,
    refresh_guard: Mutex<()>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Create a session manager talking to the API at `base_url`.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into(),
                store,
                session: RwLock::new(None),
                refresh_guard: Mutex::new(()),
                state,
            }),
        }
    }

    /// Create a session manager from a loaded client configuration. Tokens
    /// are kept in memory unless `token_path` is set.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let store: Arc<dyn TokenStore> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::default()),
        };

        Ok(Self::new(http, config.base_url.clone(), store))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Load a persisted session, if any. Called once on startup.
    pub async fn restore(&self) -> Result<Option<Session>, ClientError> {
        let _guard = self.inner.refresh_guard.lock().await;
        let stored = self.inner.store.load()?;
        *self.inner.session.write().await = stored.clone();

        match &stored {
            Some(session) => {
                info!("Restored session expiring at {}", session.expires_at);
                self.set_state(SessionState::Authenticated);
            }
            None => self.set_state(SessionState::Anonymous),
        }

        Ok(stored)
    }

    /// Sign in with email and password, replacing any current session.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Session, ClientError> {
        info!("Login attempt for {}", credentials.email);
        let previous = self.state();
        self.set_state(SessionState::Authenticating);

        match self.request_login(credentials).await {
            Ok(session) => {
                let _guard = self.inner.refresh_guard.lock().await;
                self.install(session.clone()).await;
                info!("Logged in as {}", credentials.email);
                Ok(session)
            }
            Err(e) => {
                warn!("Login failed for {}: {}", credentials.email, e);
                let fallback = if previous == SessionState::Authenticated {
                    SessionState::Authenticated
                } else {
                    SessionState::Anonymous
                };
                self.set_state(fallback);
                Err(e)
            }
        }
    }

    async fn request_login(&self, credentials: &LoginCredentials) -> Result<Session, ClientError> {
        let response = self
            .inner
            .http
            .post(endpoint(&self.inner.base_url, "/auth/login"))
            .json(credentials)
            .send()
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AuthError::InvalidCredentials.into());
            }
            status if !status.is_success() => return Err(error_from_response(response).await),
            _ => {}
        }

        let body = response.bytes().await?;
        let tokens: TokenResponse = serde_json::from_slice(&body)?;
        Session::issued(tokens, Utc::now())
            .ok_or_else(|| ClientError::UnexpectedResponse("unusable login tokens".to_string()))
    }

    /// Renew the session.
    ///
    /// Yields a session whose expiry is strictly later than the previous
    /// one, or clears the session and fails with
    /// [`AuthError::SessionExpired`]. A call that arrives while another
    /// refresh is in flight reuses that refresh's result.
    pub async fn refresh(&self) -> Result<Session, ClientError> {
        let seen = self
            .access_token()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        self.refresh_replacing(&seen).await
    }

    /// Renew the session after `rejected_access_token` was refused by the
    /// API. Joins a refresh that already replaced that token instead of
    /// starting another one.
    pub async fn refresh_after_rejection(
        &self,
        rejected_access_token: &str,
    ) -> Result<Session, ClientError> {
        self.refresh_replacing(rejected_access_token).await
    }

    async fn refresh_replacing(&self, stale_access_token: &str) -> Result<Session, ClientError> {
        let _guard = self.inner.refresh_guard.lock().await;

        let current = self
            .inner
            .session
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;

        if current.access_token != stale_access_token {
            debug!("Access token already renewed by a concurrent refresh");
            return Ok(current);
        }

        self.set_state(SessionState::Refreshing);

        match self.request_refresh(&current).await {
            Ok(next) if next.expires_at > current.expires_at => {
                self.install(next.clone()).await;
                info!("Session refreshed, new expiry {}", next.expires_at);
                Ok(next)
            }
            Ok(next) => {
                warn!(
                    "Refresh returned expiry {} which does not advance {}",
                    next.expires_at, current.expires_at
                );
                self.clear().await;
                Err(AuthError::SessionExpired.into())
            }
            Err(e) => {
                warn!("Token refresh failed, dropping session: {}", e);
                self.clear().await;
                Err(AuthError::SessionExpired.into())
            }
        }
    }

    async fn request_refresh(&self, current: &Session) -> Result<Session, ClientError> {
        let response = self
            .inner
            .http
            .post(endpoint(&self.inner.base_url, "/auth/refresh"))
            .json(&RefreshTokenRequest {
                refresh_token: current.refresh_token.clone(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.bytes().await?;
        let tokens: TokenResponse = serde_json::from_slice(&body)?;
        Session::issued(tokens, Utc::now())
            .ok_or_else(|| ClientError::UnexpectedResponse("unusable refresh tokens".to_string()))
    }

    /// Sign out. Safe to call any number of times.
    ///
    /// The server is told to revoke the refresh token on a best-effort
    /// basis; local state is cleared regardless of the outcome.
    pub async fn logout(&self) {
        let _guard = self.inner.refresh_guard.lock().await;
        let previous = self.inner.session.read().await.clone();

        if let Some(session) = previous {
            let result = self
                .inner
                .http
                .post(endpoint(&self.inner.base_url, "/auth/logout"))
                .json(&RefreshTokenRequest {
                    refresh_token: session.refresh_token,
                })
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("Logout rejected by server: {}", response.status()),
                Err(e) => warn!("Logout request failed: {}", e),
            }
            info!("Logged out");
        }

        self.clear().await;
    }

    /// Drop the session after the API refused `rejected_access_token` even
    /// though it came out of a refresh. A session that was replaced in the
    /// meantime is left alone.
    pub(crate) async fn expire(&self, rejected_access_token: &str) {
        let _guard = self.inner.refresh_guard.lock().await;
        let is_current = self
            .inner
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.access_token == rejected_access_token);

        if !is_current {
            debug!("Rejected access token was already replaced, keeping session");
            return;
        }
        warn!("Access token rejected right after a refresh, dropping session");
        self.clear().await;
    }

    /// Must be called with `refresh_guard` held.
    async fn install(&self, session: Session) {
        if let Err(e) = self.inner.store.save(&session) {
            // The session stays usable for this process; only persistence is lost.
            error!("Failed to persist session: {}", e);
        }
        *self.inner.session.write().await = Some(session);
        self.set_state(SessionState::Authenticated);
    }

    /// Must be called with `refresh_guard` held.
    async fn clear(&self) {
        *self.inner.session.write().await = None;
        if let Err(e) = self.inner.store.clear() {
            error!("Failed to clear persisted session: {}", e);
        }
        self.set_state(SessionState::Anonymous);
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.send_replace(state);
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle changes, e.g. to redirect to the login screen when the
    /// state drops to [`SessionState::Anonymous`].
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Authenticated | SessionState::Refreshing
        )
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }
}
