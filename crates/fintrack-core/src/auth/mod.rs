//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `TokenStore`: persistence of the access and refresh tokens
//! - `claims`: unverified reading of an access token's expiry
//! - `TokenRenewer`: exchange of a refresh token for a new access token
//! - `SessionGuard`: the allow/redirect decision for protected views
//! - `AuthService`: login, registration, logout and authenticated requests

pub mod claims;
pub mod error;
pub mod guard;
pub mod renew;
pub mod service;
pub mod store;

pub use error::{AuthError, CredentialKind};
pub use guard::{Navigation, SessionGuard, SessionState, ViewMount};
pub use renew::TokenRenewer;
pub use service::AuthService;
pub use store::{open_store, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
