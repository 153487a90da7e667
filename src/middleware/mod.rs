//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (verification of provider-issued JWTs)

pub mod auth;

pub use auth::{auth_middleware, AuthUser, Claims};
