//! Database layer
//!
//! This module handles all PostgreSQL access:
//! - Connection pool construction
//! - The versioned migration runner and its ledger
//! - Server capability probing (RPC vs direct SQL strategies)
//! - Repositories for organizations, addresses and audit logs
//! - Repair routines shared by the maintenance tools

pub mod address_repository;
pub mod audit_repository;
pub mod capabilities;
pub mod migrations;
pub mod organization_repository;
pub mod repair;
pub mod security;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Initialize the database connection pool
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Build the pool without an upfront round trip. The server uses this so it
/// can come up (and serve /health) while the database is still unreachable;
/// connections are established on first use.
pub fn init_pool_lazy(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_lazy(&config.url)
        .context("Invalid database URL")?;

    Ok(pool)
}

/// Build a small pool for the maintenance tools. The tools run statements
/// sequentially, so two connections are plenty.
pub async fn init_tool_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Verify database connectivity with a trivial round trip
pub async fn check_health(pool: &DbPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database connectivity check failed")?;

    Ok(())
}
