use async_trait::async_trait;

use super::AuthError;

/// Exchanges a refresh token for a fresh access token.
///
/// Implementations make exactly one attempt; any failure comes back as
/// `AuthError::RenewalFailed`. Persisting the new token is the caller's job.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<String, AuthError>;
}
