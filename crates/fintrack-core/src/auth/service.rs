use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::TokenStore;
use crate::api::{ApiClient, ApiError};
use crate::config::StorageKeys;
use crate::models::{LoginUser, NewUser, TokenPair, UserProfile};

/// Account operations on top of the token store.
///
/// Authenticated calls attach the stored access token. A 401 triggers one
/// renewal and one retry; if that is impossible both tokens are dropped and
/// the caller gets `ApiError::Unauthorized`.
pub struct AuthService {
    client: ApiClient,
    store: Arc<dyn TokenStore>,
    keys: StorageKeys,
}

impl AuthService {
    pub fn new(client: ApiClient, store: Arc<dyn TokenStore>, keys: StorageKeys) -> Self {
        Self { client, store, keys }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Option<LoginUser>> {
        let (tokens, user) = self.client.login(email, password).await?;
        self.save_tokens(&tokens)?;
        info!(email = email, "Logged in");
        Ok(user)
    }

    pub async fn register(&self, user: &NewUser) -> Result<()> {
        let tokens = self.client.register(user).await?;
        self.save_tokens(&tokens)?;
        info!(username = %user.username, "Registered and logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear().context("Failed to clear stored tokens")?;
        info!("Logged out");
        Ok(())
    }

    /// True when an access token is stored. Expiry is not checked here.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.store.get(&self.keys.access), Ok(Some(ref token)) if !token.is_empty())
    }

    /// The stored access token, if any
    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(&self.keys.access)
    }

    pub async fn profile(&self) -> Result<UserProfile> {
        self.with_access(|token| async move { self.client.fetch_profile(&token).await })
            .await
    }

    /// Run an authenticated call with the stored access token.
    ///
    /// On a 401 the token is renewed once and `call` runs again with the new
    /// one. If renewal is impossible both tokens are cleared and the result is
    /// `ApiError::Unauthorized`.
    pub async fn with_access<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let access = self
            .access_token()?
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        match call(access).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Request rejected, renewing access token");
                let fresh = self.renew_or_logout().await?;
                Ok(call(fresh).await?)
            }
            other => Ok(other?),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.store
            .set(&self.keys.access, &tokens.access)
            .context("Failed to store access token")?;
        self.store
            .set(&self.keys.refresh, &tokens.refresh)
            .context("Failed to store refresh token")?;
        Ok(())
    }

    async fn renew_or_logout(&self) -> Result<String> {
        let refresh = self.store.get(&self.keys.refresh)?.filter(|t| !t.is_empty());
        let Some(refresh) = refresh else {
            self.logout()?;
            return Err(ApiError::Unauthorized.into());
        };

        match self.client.refresh_access(&refresh).await {
            Ok(fresh) => {
                self.store
                    .set(&self.keys.access, &fresh)
                    .context("Failed to store renewed access token")?;
                Ok(fresh)
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed, clearing session");
                self.logout()?;
                Err(ApiError::Unauthorized.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::config::Endpoints;
    use crate::test_support::spawn_backend;

    const ACCESS: &str = "access_token";
    const REFRESH: &str = "refresh_token";

    fn profile_json() -> Value {
        json!({
            "id": 5, "username": "maya", "email": "maya@example.com",
            "first_name": "Maya", "last_name": "Gurung",
            "date_joined": null, "is_staff": false, "is_superuser": false, "is_active": true
        })
    }

    /// Backend whose profile endpoint only accepts `valid`, and whose refresh
    /// endpoint hands out `valid` for refresh token `r-good`
    fn backend(refresh_hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/accounts/profile/",
                get(|headers: HeaderMap| async move {
                    if headers["authorization"] == "Bearer valid" {
                        (StatusCode::OK, Json(profile_json()))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Given token not valid" })))
                    }
                }),
            )
            .route(
                "/api/token/refresh/",
                post(|State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if body["refresh"] == "r-good" {
                        (StatusCode::OK, Json(json!({ "access": "valid" })))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Token is invalid or expired" })))
                    }
                }),
            )
            .with_state(refresh_hits)
    }

    async fn service(store: Arc<MemoryTokenStore>, hits: Arc<AtomicUsize>) -> AuthService {
        let base = spawn_backend(backend(hits)).await;
        let client = ApiClient::new(&base, Endpoints::default()).unwrap();
        AuthService::new(client, store, StorageKeys::default())
    }

    #[tokio::test]
    async fn test_login_stores_both_tokens_and_logout_clears() {
        let app = Router::new().route(
            "/accounts/login/",
            post(|| async { Json(json!({ "access": "a-1", "refresh": "r-1" })) }),
        );
        let base = spawn_backend(app).await;
        let store = Arc::new(MemoryTokenStore::new());
        let service = AuthService::new(
            ApiClient::new(&base, Endpoints::default()).unwrap(),
            store.clone(),
            StorageKeys::default(),
        );

        assert!(!service.is_authenticated());
        let user = service.login("maya@example.com", "pw").await.unwrap();
        assert!(user.is_none());
        assert!(service.is_authenticated());
        assert_eq!(store.get(ACCESS).unwrap().as_deref(), Some("a-1"));
        assert_eq!(store.get(REFRESH).unwrap().as_deref(), Some("r-1"));

        service.logout().unwrap();
        assert!(!service.is_authenticated());
        assert_eq!(store.get(REFRESH).unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_login_stores_nothing() {
        let app = Router::new().route(
            "/accounts/login/",
            post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid email or password" }))) }),
        );
        let base = spawn_backend(app).await;
        let store = Arc::new(MemoryTokenStore::new());
        let service = AuthService::new(
            ApiClient::new(&base, Endpoints::default()).unwrap(),
            store.clone(),
            StorageKeys::default(),
        );

        let err = service.login("maya@example.com", "bad").await.unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized));
        assert_eq!(store.get(ACCESS).unwrap(), None);
    }

    #[tokio::test]
    async fn test_profile_with_valid_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "valid"), (REFRESH, "r-good")]));
        let service = service(store, hits.clone()).await;

        assert_eq!(service.profile().await.unwrap().display_name(), "Maya Gurung");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_profile_renews_on_401_and_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "stale"), (REFRESH, "r-good")]));
        let service = service(store.clone(), hits.clone()).await;

        assert_eq!(service.profile().await.unwrap().username, "maya");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(ACCESS).unwrap().as_deref(), Some("valid"));
    }

    #[tokio::test]
    async fn test_profile_clears_session_when_renewal_fails() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "stale"), (REFRESH, "r-revoked")]));
        let service = service(store.clone(), hits.clone()).await;

        let err = service.profile().await.unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(ACCESS).unwrap(), None);
        assert_eq!(store.get(REFRESH).unwrap(), None);
    }

    #[tokio::test]
    async fn test_profile_without_refresh_token_clears_session() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryTokenStore::with_entries([(ACCESS, "stale")]));
        let service = service(store.clone(), hits.clone()).await;

        assert!(service.profile().await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(ACCESS).unwrap(), None);
    }

    #[tokio::test]
    async fn test_profile_without_any_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let service = service(Arc::new(MemoryTokenStore::new()), hits.clone()).await;

        let err = service.profile().await.unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
