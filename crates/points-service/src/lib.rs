//! Points ledger HTTP API service.
//!
//! This crate provides the HTTP API for the reservation platform's points
//! ledger, including:
//!
//! - Point balances, history, and rule-driven mutations
//! - The point rule catalogue
//! - Account profiles
//! - LINE Login sessions
//! - Per-account image storage
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **Session cookie** - For end users who logged in through LINE Login
//! 2. **Admin API key** - For back-office and service-to-service requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Axum handlers must be async

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod images;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use identity::LineLoginClient;
pub use images::ImageStorage;
pub use routes::create_router;
pub use state::AppState;
