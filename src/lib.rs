//! SimplTrust backend library
//!
//! This crate provides the compliance-management backend: the HTTP API,
//! the PostgreSQL access layer and the database maintenance tooling shared
//! by the operator binaries.

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};

use db::capabilities::ServerFunctions;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Database functions found by the startup capability probe
    pub functions: ServerFunctions,
}
