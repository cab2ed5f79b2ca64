//! REST API client module for the FinTrack backend.
//!
//! This module provides the `ApiClient` for the account endpoints, the
//! token refresh endpoint, and the transaction, category and budget
//! endpoints. Authenticated requests carry the access token as a JWT bearer
//! token.

pub mod client;
pub mod error;
mod finance;

pub use client::ApiClient;
pub use error::ApiError;
