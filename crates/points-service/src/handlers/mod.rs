//! API handlers.

pub mod accounts;
pub mod auth;
pub mod health;
pub mod images;
pub mod points;
pub mod rules;
