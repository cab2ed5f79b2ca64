//! API client for the FinTrack REST backend.
//!
//! `ApiClient` covers the account endpoints (login, registration, profile)
//! and the token refresh endpoint used by the session guard. The finance
//! endpoints live in `api::finance`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{AuthError, TokenRenewer};
use crate::config::{Config, Endpoints};
use crate::models::user::{LoginResponse, RegisterResponse};
use crate::models::{LoginUser, NewUser, TokenPair, UserProfile};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay for rate limiting, doubled on each retry.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// API client for the FinTrack backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    pub(super) endpoints: Endpoints,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, endpoints: Endpoints) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.base_url(), config.endpoints.clone())
    }

    #[cfg(test)]
    pub(crate) fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of a member or action under a collection path: `/transactions/` + `12` -> `.../transactions/12/`
    pub(super) fn member_url(&self, collection: &str, member: impl std::fmt::Display) -> String {
        format!("{}/{}/", self.url(collection).trim_end_matches('/'), member)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Like `check_response`, but returns Ok(None) for 429 so the caller can retry.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().as_u16() == 429 {
            return Ok(None);
        }
        Self::check_response(response).await.map(Some)
    }

    pub(super) async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    /// Send a request, backing off and resending while the backend answers 429.
    ///
    /// `build` is called once per attempt since a `RequestBuilder` is consumed by `send`.
    pub(super) async fn send_with_backoff<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    pub(super) async fn get<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, ApiError> {
        let response = self
            .send_with_backoff(url, || self.client.get(url).bearer_auth(token))
            .await?;
        Self::parse_json(response, url).await
    }

    pub(super) async fn get_with_query<T: DeserializeOwned, Q: Serialize>(
        &self,
        url: &str,
        token: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        let response = self
            .send_with_backoff(url, || self.client.get(url).bearer_auth(token).query(query))
            .await?;
        Self::parse_json(response, url).await
    }

    /// Unauthenticated POST, for the account endpoints
    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T, ApiError> {
        let response = self
            .send_with_backoff(url, || self.client.post(url).json(body))
            .await?;
        Self::parse_json(response, url).await
    }

    pub(super) async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send_with_backoff(url, || {
                self.client.request(method.clone(), url).bearer_auth(token).json(body)
            })
            .await?;
        Self::parse_json(response, url).await
    }

    /// DELETE; the response body (usually empty) is discarded
    pub(super) async fn delete(&self, url: &str, token: &str) -> Result<(), ApiError> {
        self.send_with_backoff(url, || self.client.delete(url).bearer_auth(token))
            .await?;
        Ok(())
    }

    // ===== Account Methods =====

    /// Exchange email and password for a token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<(TokenPair, Option<LoginUser>), ApiError> {
        let url = self.url(&self.endpoints.login);
        let response: LoginResponse = self.post(&url, &LoginRequest { email, password }).await?;
        debug!(email = email, "Login succeeded");
        Ok((response.tokens, response.user))
    }

    /// Create an account; the backend logs the new user in straight away
    pub async fn register(&self, user: &NewUser) -> Result<TokenPair, ApiError> {
        let url = self.url(&self.endpoints.register);
        let response: RegisterResponse = self.post(&url, user).await?;
        if let Some(ref message) = response.message {
            debug!(username = %user.username, message = %message, "Registration succeeded");
        }
        Ok(response.tokens)
    }

    /// Fetch the profile of the user the access token belongs to
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let url = self.url(&self.endpoints.profile);
        self.get(&url, access_token).await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Single attempt: a 429 here is a failure like any other status.
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError> {
        let url = self.url(&self.endpoints.refresh);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh: refresh_token })
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let body: RefreshResponse = Self::parse_json(response, &url).await?;
        if body.access.is_empty() {
            return Err(ApiError::InvalidResponse("Refresh response carried an empty access token".to_string()));
        }
        Ok(body.access)
    }
}

#[async_trait]
impl TokenRenewer for ApiClient {
    async fn renew(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.refresh_access(refresh_token)
            .await
            .map_err(AuthError::RenewalFailed)
    }
}
