//! Server function capability probe
//!
//! Privileged operations can be served two ways: through the database
//! functions installed by the migrations (preferred), or through equivalent
//! direct SQL when a function is missing. Rather than discovering missing
//! functions request by request, a single catalog query at startup records
//! which functions exist; repositories consult the result once to pick
//! their strategy.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::DbPool;

/// Database functions the application knows how to call
pub const EXPECTED_FUNCTIONS: [&str; 7] = [
    "create_organization_with_admin",
    "get_user_organizations",
    "update_organization",
    "delete_organization",
    "create_organization_address",
    "is_org_member",
    "record_audit_log",
];

/// Which of the expected database functions are installed
#[derive(Debug, Clone, Default)]
pub struct ServerFunctions {
    available: HashSet<String>,
}

impl ServerFunctions {
    /// Query the catalog for the expected functions
    pub async fn probe(pool: &DbPool) -> Result<Self> {
        let expected: Vec<String> = EXPECTED_FUNCTIONS.iter().map(|s| s.to_string()).collect();

        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.proname
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = 'public'
              AND p.proname = ANY($1)
            "#,
        )
        .bind(&expected)
        .fetch_all(pool)
        .await
        .context("Failed to probe database functions")?;

        let functions = Self::from_names(names);

        if functions.is_complete() {
            info!("All database functions available");
        } else {
            warn!(
                missing = ?functions.missing(),
                "Some database functions are missing, falling back to direct SQL for them"
            );
        }

        Ok(functions)
    }

    /// Probe, degrading to an empty set when the catalog query itself fails.
    /// The API server uses this so it can still start against a database
    /// that has not been migrated yet.
    pub async fn probe_or_empty(pool: &DbPool) -> Self {
        match Self::probe(pool).await {
            Ok(functions) => functions,
            Err(err) => {
                warn!(error = %err, "Function probe failed, assuming no database functions");
                Self::default()
            }
        }
    }

    /// Build from an explicit list of function names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a function is installed
    pub fn has(&self, name: &str) -> bool {
        self.available.contains(name)
    }

    /// Expected functions that are not installed
    pub fn missing(&self) -> Vec<&'static str> {
        EXPECTED_FUNCTIONS
            .iter()
            .copied()
            .filter(|name| !self.available.contains(*name))
            .collect()
    }

    /// True when every expected function is installed
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_has_nothing() {
        let functions = ServerFunctions::default();
        assert!(!functions.has("create_organization_with_admin"));
        assert!(!functions.is_complete());
        assert_eq!(functions.missing().len(), EXPECTED_FUNCTIONS.len());
    }

    #[test]
    fn test_partial_set() {
        let functions =
            ServerFunctions::from_names(["record_audit_log", "is_org_member"]);
        assert!(functions.has("record_audit_log"));
        assert!(functions.has("is_org_member"));
        assert!(!functions.has("delete_organization"));
        assert!(!functions.is_complete());

        let missing = functions.missing();
        assert!(missing.contains(&"delete_organization"));
        assert!(!missing.contains(&"record_audit_log"));
    }

    #[test]
    fn test_complete_set() {
        let functions = ServerFunctions::from_names(EXPECTED_FUNCTIONS);
        assert!(functions.is_complete());
        assert!(functions.missing().is_empty());
    }

    #[test]
    fn test_unknown_names_are_harmless() {
        let functions = ServerFunctions::from_names(["not_one_of_ours"]);
        assert!(functions.has("not_one_of_ours"));
        assert!(!functions.is_complete());
    }
}
