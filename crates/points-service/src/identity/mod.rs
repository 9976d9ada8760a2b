//! LINE Login integration.
//!
//! The service uses LINE Login as its identity provider:
//! - Building the authorize URL the frontend redirects to
//! - Exchanging the callback code for an access token
//! - Fetching the user's profile (stable user id and display name)

pub mod client;
pub mod types;

pub use client::{IdentityError, LineLoginClient};
pub use types::{LineProfile, LoginState, TokenResponse};
