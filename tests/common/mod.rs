//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure: the TestApp wrapper
//! around the router, request/response helpers and token generation.

pub mod test_app;

pub use test_app::*;
