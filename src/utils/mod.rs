//! Shared utilities
//!
//! This module contains:
//! - Error types and response mapping
//! - Input validation helpers

pub mod error;
pub mod validation;

pub use error::{AppError, AppResult, ErrorResponse};
