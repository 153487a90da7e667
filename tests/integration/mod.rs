//! Integration tests for the SimplTrust backend
//!
//! Routing, auth gating and the public endpoints are tested without a
//! database. Tests exercising the migration runner, the privileged
//! functions or the repair routines need a live PostgreSQL and are marked
//! #[ignore]; point DATABASE_URL at a scratch database to run them.

mod api_tests;
mod database_tests;
