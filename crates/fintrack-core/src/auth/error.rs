use thiserror::Error;

use crate::api::ApiError;

/// Which of the two stored credentials a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Access,
    Refresh,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::Access => f.write_str("access token"),
            CredentialKind::Refresh => f.write_str("refresh token"),
        }
    }
}

/// Failures inside the session lifecycle.
///
/// None of these ever reach a protected view: the guard logs them and
/// resolves to `SessionState::Unauthorized`.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No {0} stored")]
    MissingCredential(CredentialKind),

    #[error("Malformed access token: {0}")]
    MalformedCredential(String),

    #[error("Token renewal failed: {0}")]
    RenewalFailed(#[source] ApiError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        AuthError::RenewalFailed(err)
    }
}
