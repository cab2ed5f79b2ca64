//! The session guard run before every protected view.
//!
//! Each navigation starts from `SessionState::Unknown` and ends in
//! `Authorized` or `Unauthorized`:
//!
//! 1. no access token → `Unauthorized`
//! 2. access token not expired → `Authorized`
//! 3. expired (or undecodable) and no refresh token → `Unauthorized`
//! 4. one renewal attempt: success stores the new access token and gives
//!    `Authorized`, failure gives `Unauthorized` and leaves the store alone
//!
//! Failures never escape: they are logged and become `Unauthorized`, which
//! the caller turns into a redirect to the login view.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{claims, AuthError, CredentialKind, TokenRenewer, TokenStore};
use crate::config::{Config, StorageKeys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionState {
    Unknown,
    Authorized,
    Unauthorized,
}

/// What the front-end should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(tag = "action", content = "path", rename_all = "lowercase")]
pub enum Navigation {
    /// Check still running; show a loading indicator
    Loading,
    Render(String),
    Redirect(String),
}

pub struct SessionGuard {
    store: Arc<dyn TokenStore>,
    renewer: Arc<dyn TokenRenewer>,
    keys: StorageKeys,
    login_path: String,
}

impl SessionGuard {
    pub fn new(
        store: Arc<dyn TokenStore>,
        renewer: Arc<dyn TokenRenewer>,
        keys: StorageKeys,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            renewer,
            keys,
            login_path: login_path.into(),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>, renewer: Arc<dyn TokenRenewer>) -> Self {
        Self::new(store, renewer, config.storage_keys.clone(), config.login_path.clone())
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Run the check for one navigation. Always resolves, never errors.
    pub async fn evaluate(&self) -> SessionState {
        match self.authorize().await {
            Ok(()) => SessionState::Authorized,
            Err(AuthError::RenewalFailed(cause)) => {
                warn!(error = %cause, "Session renewal failed, redirecting to login");
                SessionState::Unauthorized
            }
            Err(e) => {
                debug!(reason = %e, "Session not authorized");
                SessionState::Unauthorized
            }
        }
    }

    /// Run the check and map the outcome onto `view`.
    pub async fn enter(&self, view: &str) -> Navigation {
        let state = self.evaluate().await;
        self.navigation(state, view)
    }

    pub fn navigation(&self, state: SessionState, view: &str) -> Navigation {
        navigation_for(state, view, &self.login_path)
    }

    /// Start a check for a freshly mounted view.
    ///
    /// The check runs on the tokio runtime. Dropping the returned mount
    /// discards whatever the check produces afterwards.
    pub fn mount(self: &Arc<Self>, view: impl Into<String>) -> ViewMount {
        let (tx, rx) = watch::channel(SessionState::Unknown);
        let view = view.into();
        let guard = Arc::clone(self);
        let label = view.clone();

        tokio::spawn(async move {
            let state = guard.evaluate().await;
            if tx.send(state).is_err() {
                debug!(view = %label, ?state, "View unmounted before session check finished, discarding result");
            }
        });

        ViewMount {
            view,
            login_path: self.login_path.clone(),
            state: rx,
        }
    }

    async fn authorize(&self) -> Result<(), AuthError> {
        let access = self.read(CredentialKind::Access)?;
        if !claims::is_expired(&access) {
            return Ok(());
        }

        debug!("Access token expired, attempting renewal");
        let refresh = self.read(CredentialKind::Refresh)?;
        let fresh = self.renewer.renew(&refresh).await?;

        // The new token is good for this navigation even if it can't be persisted
        if let Err(e) = self.store.set(&self.keys.access, &fresh) {
            warn!(error = %e, "Failed to persist renewed access token");
        }
        info!("Access token renewed");
        Ok(())
    }

    fn read(&self, kind: CredentialKind) -> Result<String, AuthError> {
        let key = match kind {
            CredentialKind::Access => &self.keys.access,
            CredentialKind::Refresh => &self.keys.refresh,
        };
        match self.store.get(key) {
            Ok(Some(value)) if !value.is_empty() => Ok(value),
            Ok(_) => Err(AuthError::MissingCredential(kind)),
            Err(e) => {
                warn!(error = %e, key = %key, "Failed to read token store");
                Err(AuthError::MissingCredential(kind))
            }
        }
    }
}

fn navigation_for(state: SessionState, view: &str, login_path: &str) -> Navigation {
    match state {
        SessionState::Unknown => Navigation::Loading,
        SessionState::Authorized => Navigation::Render(view.to_string()),
        SessionState::Unauthorized => Navigation::Redirect(login_path.to_string()),
    }
}

/// A protected view waiting on, or holding the result of, its session check.
pub struct ViewMount {
    view: String,
    login_path: String,
    state: watch::Receiver<SessionState>,
}

impl ViewMount {
    pub fn view(&self) -> &str {
        &self.view
    }

    /// Current state; `Unknown` until the check finishes
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn navigation(&self) -> Navigation {
        navigation_for(self.state(), &self.view, &self.login_path)
    }

    /// Wait for the check to finish.
    pub async fn resolved(&mut self) -> SessionState {
        match self.state.wait_for(|s| *s != SessionState::Unknown).await {
            Ok(state) => *state,
            // The check task died without reporting
            Err(_) => SessionState::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::{ApiClient, ApiError};
    use crate::auth::MemoryTokenStore;
    use crate::config::Endpoints;
    use crate::test_support::{spawn_backend, token_expiring_in};

    const ACCESS: &str = "access_token";
    const REFRESH: &str = "refresh_token";

    /// Renewer with a canned outcome that counts its calls
    struct FakeRenewer {
        calls: AtomicUsize,
        outcome: Option<String>,
    }

    impl FakeRenewer {
        fn succeeding(token: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: Some(token.to_string()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRenewer for FakeRenewer {
        async fn renew(&self, _refresh_token: &str) -> Result<String, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .clone()
                .ok_or(AuthError::RenewalFailed(ApiError::Unauthorized))
        }
    }

    /// Renewer that blocks until released
    struct GatedRenewer {
        gate: Notify,
        token: String,
    }

    #[async_trait]
    impl TokenRenewer for GatedRenewer {
        async fn renew(&self, _refresh_token: &str) -> Result<String, AuthError> {
            self.gate.notified().await;
            Ok(self.token.clone())
        }
    }

    /// Store whose writes always fail, and whose reads fail when asked to
    struct FailingStore {
        fail_get: bool,
        inner: MemoryTokenStore,
    }

    impl TokenStore for FailingStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            if self.fail_get {
                anyhow::bail!("token file unreadable");
            }
            self.inner.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.inner.clear()
        }
    }

    fn guard(store: &Arc<MemoryTokenStore>, renewer: Arc<dyn TokenRenewer>) -> SessionGuard {
        SessionGuard::new(store.clone(), renewer, StorageKeys::default(), "/login")
    }

    fn access(store: &MemoryTokenStore) -> Option<String> {
        store.get(ACCESS).unwrap()
    }

    #[tokio::test]
    async fn test_no_tokens_is_unauthorized_without_renewal() {
        let store = Arc::new(MemoryTokenStore::new());
        let renewer = FakeRenewer::succeeding("new-token");

        let state = guard(&store, renewer.clone()).evaluate().await;
        assert_eq!(state, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_access_with_refresh_does_not_renew() {
        let store = Arc::new(MemoryTokenStore::with_entries([(REFRESH, "r-1")]));
        let renewer = FakeRenewer::succeeding("new-token");

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 0);
        assert_eq!(access(&store), None);
    }

    #[tokio::test]
    async fn test_empty_access_counts_as_missing() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, ""), (REFRESH, "r-1")]));
        let renewer = FakeRenewer::succeeding("new-token");

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_token_is_authorized_without_renewal() {
        let token = token_expiring_in(3600);
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, token.as_str()), (REFRESH, "r-1")]));
        let renewer = FakeRenewer::succeeding("new-token");

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Authorized);
        assert_eq!(renewer.calls(), 0);
        assert_eq!(access(&store), Some(token));
    }

    #[tokio::test]
    async fn test_expired_token_renews_once_and_persists() {
        let store = Arc::new(MemoryTokenStore::with_entries([
            (ACCESS, token_expiring_in(-1).as_str()),
            (REFRESH, "r-1"),
        ]));
        let renewer = FakeRenewer::succeeding("new-token");

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Authorized);
        assert_eq!(renewer.calls(), 1);
        assert_eq!(access(&store).as_deref(), Some("new-token"));
        assert_eq!(store.get(REFRESH).unwrap().as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_is_unauthorized() {
        let expired = token_expiring_in(-60);
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, expired.as_str())]));
        let renewer = FakeRenewer::succeeding("new-token");

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 0);
        assert_eq!(access(&store), Some(expired));
    }

    #[tokio::test]
    async fn test_failed_renewal_leaves_store_untouched() {
        let expired = token_expiring_in(-1);
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, expired.as_str()), (REFRESH, "r-1")]));
        let renewer = FakeRenewer::failing();

        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 1);
        assert_eq!(access(&store), Some(expired));
        assert_eq!(store.get(REFRESH).unwrap().as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_malformed_token_is_treated_as_expired() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "garbage")]));
        let renewer = FakeRenewer::succeeding("new-token");
        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Unauthorized);
        assert_eq!(renewer.calls(), 0);

        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "garbage"), (REFRESH, "r-1")]));
        let renewer = FakeRenewer::succeeding("new-token");
        assert_eq!(guard(&store, renewer.clone()).evaluate().await, SessionState::Authorized);
        assert_eq!(renewer.calls(), 1);
        assert_eq!(access(&store).as_deref(), Some("new-token"));
    }

    #[tokio::test]
    async fn test_custom_storage_keys() {
        let keys = StorageKeys {
            access: "ACCESS_TOKEN".to_string(),
            refresh: "REFRESH_TOKEN".to_string(),
        };
        let store = Arc::new(MemoryTokenStore::with_entries([
            ("ACCESS_TOKEN", token_expiring_in(-5).as_str()),
            ("REFRESH_TOKEN", "r-1"),
        ]));
        let renewer = FakeRenewer::succeeding("new-token");
        let guard = SessionGuard::new(store.clone(), renewer.clone(), keys, "login");

        assert_eq!(guard.enter("/home").await, Navigation::Render("/home".to_string()));
        assert_eq!(store.get("ACCESS_TOKEN").unwrap().as_deref(), Some("new-token"));
        assert_eq!(store.get(ACCESS).unwrap(), None);
    }

    #[tokio::test]
    async fn test_enter_redirects_to_login() {
        let store = Arc::new(MemoryTokenStore::new());
        let guard = guard(&store, FakeRenewer::failing());
        assert_eq!(guard.enter("/dashboard").await, Navigation::Redirect("/login".to_string()));
        assert_eq!(guard.navigation(SessionState::Unknown, "/dashboard"), Navigation::Loading);
    }

    #[tokio::test]
    async fn test_unreadable_store_is_unauthorized_without_renewal() {
        let store = Arc::new(FailingStore {
            fail_get: true,
            inner: MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(-1).as_str()), (REFRESH, "r-1")]),
        });
        let renewer = FakeRenewer::succeeding("new-token");
        let guard = SessionGuard::new(store, renewer.clone(), StorageKeys::default(), "/login");

        assert_eq!(guard.evaluate().await, SessionState::Unauthorized);
        assert_eq!(guard.enter("/home").await, Navigation::Redirect("/login".to_string()));
        assert_eq!(renewer.calls(), 0);
    }

    #[tokio::test]
    async fn test_unpersisted_renewal_still_authorizes() {
        let store = Arc::new(FailingStore {
            fail_get: false,
            inner: MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(-1).as_str()), (REFRESH, "r-1")]),
        });
        let renewer = FakeRenewer::succeeding("new-token");
        let guard = SessionGuard::new(store.clone(), renewer.clone(), StorageKeys::default(), "/login");

        assert_eq!(guard.evaluate().await, SessionState::Authorized);
        assert_eq!(renewer.calls(), 1);
        // The stale token stays behind, so the next check renews again
        assert_ne!(store.inner.get(ACCESS).unwrap().as_deref(), Some("new-token"));
        assert_eq!(guard.evaluate().await, SessionState::Authorized);
        assert_eq!(renewer.calls(), 2);
    }

    #[tokio::test]
    async fn test_renewal_against_backend_success() {
        let app = Router::new().route(
            "/api/token/refresh/",
            post(|| async { (StatusCode::OK, Json(json!({ "access": "new-token" }))) }),
        );
        let base = spawn_backend(app).await;
        let client = Arc::new(ApiClient::new(&base, Endpoints::default()).unwrap());
        let store = Arc::new(MemoryTokenStore::with_entries([
            (ACCESS, token_expiring_in(-1).as_str()),
            (REFRESH, "r-1"),
        ]));

        assert_eq!(guard(&store, client).evaluate().await, SessionState::Authorized);
        assert_eq!(access(&store).as_deref(), Some("new-token"));
    }

    #[tokio::test]
    async fn test_renewal_against_backend_rejected() {
        let app = Router::new().route(
            "/api/token/refresh/",
            post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Token is blacklisted" }))) }),
        );
        let base = spawn_backend(app).await;
        let client = Arc::new(ApiClient::new(&base, Endpoints::default()).unwrap());
        let expired = token_expiring_in(-1);
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, expired.as_str()), (REFRESH, "r-1")]));

        assert_eq!(guard(&store, client).evaluate().await, SessionState::Unauthorized);
        assert_eq!(access(&store), Some(expired));
    }

    #[tokio::test]
    async fn test_mount_starts_unknown_then_resolves() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(-1).as_str()), (REFRESH, "r-1")]));
        let renewer = Arc::new(GatedRenewer {
            gate: Notify::new(),
            token: "new-token".to_string(),
        });
        let guard = Arc::new(guard(&store, renewer.clone()));

        let mut mount = guard.mount("/reports");
        assert_eq!(mount.state(), SessionState::Unknown);
        assert_eq!(mount.navigation(), Navigation::Loading);

        renewer.gate.notify_one();
        assert_eq!(mount.resolved().await, SessionState::Authorized);
        assert_eq!(mount.navigation(), Navigation::Render("/reports".to_string()));
        assert_eq!(mount.view(), "/reports");
    }

    #[tokio::test]
    async fn test_unmount_discards_late_result() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(-1).as_str()), (REFRESH, "r-1")]));
        let renewer = Arc::new(GatedRenewer {
            gate: Notify::new(),
            token: "new-token".to_string(),
        });
        let guard = Arc::new(guard(&store, renewer.clone()));

        let mount = guard.mount("/budgets");
        tokio::task::yield_now().await;
        drop(mount);
        renewer.gate.notify_one();

        // The check still finishes in the background without a view to update
        for _ in 0..200 {
            if access(&store).as_deref() == Some("new-token") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(access(&store).as_deref(), Some("new-token"));
    }

    #[tokio::test]
    async fn test_concurrent_mounts_both_converge() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(-1).as_str()), (REFRESH, "r-1")]));
        let renewer = FakeRenewer::succeeding("new-token");
        let guard = Arc::new(guard(&store, renewer.clone()));

        let mut first = guard.mount("/transactions");
        let mut second = guard.mount("/categories");
        let (a, b) = futures::future::join(first.resolved(), second.resolved()).await;

        assert_eq!(a, SessionState::Authorized);
        assert_eq!(b, SessionState::Authorized);
        // Each evaluation reads the store independently; renewing twice is allowed
        assert!((1..=2).contains(&renewer.calls()));
        assert_eq!(access(&store).as_deref(), Some("new-token"));
    }

    #[tokio::test]
    async fn test_each_navigation_is_evaluated_fresh() {
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, token_expiring_in(3600).as_str())]));
        let guard = guard(&store, FakeRenewer::failing());
        assert_eq!(guard.evaluate().await, SessionState::Authorized);

        store.clear().unwrap();
        assert_eq!(guard.evaluate().await, SessionState::Unauthorized);
    }
}
