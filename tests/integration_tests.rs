//! Integration test entry point
//!
//! Pulls in the shared TestApp utilities and the integration test modules.

mod common;
mod integration;

pub use common::*;
