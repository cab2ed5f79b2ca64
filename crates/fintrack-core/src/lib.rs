//! Client-side session handling for the FinTrack personal finance tracker.
//!
//! The backend issues a short-lived access token and a longer-lived refresh
//! token. This crate keeps both in a `TokenStore`, decides on each protected
//! navigation whether the session is still good (renewing it when the access
//! token has expired), and wraps the account, transaction, category and
//! budget endpoints of the REST API.

pub mod api;
pub mod auth;
pub mod config;
pub mod finance;
pub mod models;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthService, Navigation, SessionGuard, SessionState, TokenStore, ViewMount};
pub use config::Config;
pub use finance::FinanceService;
