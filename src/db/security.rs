//! Security enhancement layer
//!
//! The canonical security SQL is the versioned file
//! `migrations/99-security-enhancements.sql`, embedded here at compile time.
//! The enhance-security tool can seed the file into a migrations tree and
//! apply it standalone under the same one-file transaction contract as the
//! migration runner. Afterwards the installed objects are verified against
//! the catalog.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::capabilities::{ServerFunctions, EXPECTED_FUNCTIONS};
use super::migrations::{ensure_ledger, FileOutcome, MigrationRunner, RunnerOptions};
use super::DbPool;

/// File name of the security layer inside a migrations tree
pub const SECURITY_FILE_NAME: &str = "99-security-enhancements.sql";

/// The embedded canonical security SQL
pub const SECURITY_ENHANCEMENTS_SQL: &str =
    include_str!("../../migrations/99-security-enhancements.sql");

/// What happened when seeding the file into a migrations tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteStatus {
    /// File created
    Written,
    /// File already present and left untouched
    AlreadyPresent,
    /// File replaced on request
    Overwritten,
}

/// Write the embedded SQL into `dir` as the security layer file.
/// An existing file is only replaced when `overwrite` is set.
pub fn write_security_file(dir: &Path, overwrite: bool) -> Result<(PathBuf, WriteStatus)> {
    let path = dir.join(SECURITY_FILE_NAME);

    if path.exists() && !overwrite {
        return Ok((path, WriteStatus::AlreadyPresent));
    }
    let status = if path.exists() {
        WriteStatus::Overwritten
    } else {
        WriteStatus::Written
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create migrations directory {}", dir.display()))?;
    fs::write(&path, SECURITY_ENHANCEMENTS_SQL)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Wrote security enhancement file");
    Ok((path, status))
}

/// Apply the embedded security SQL under the runner's per-file contract
pub async fn apply_security_enhancements(
    pool: &DbPool,
    safe_mode: bool,
) -> Result<FileOutcome> {
    ensure_ledger(pool).await?;

    let runner = MigrationRunner::new(
        pool,
        RunnerOptions {
            safe_mode,
            // The standalone applier always re-applies; the layer is
            // self-idempotent and may need to re-harden drifted objects.
            force: true,
            reset: false,
        },
    );

    runner
        .apply_sql(SECURITY_FILE_NAME, SECURITY_ENHANCEMENTS_SQL)
        .await
}

/// Post-apply verification of the installed security objects
#[derive(Debug)]
pub struct SecurityVerification {
    /// audit_logs table present
    pub audit_table: bool,
    /// Admin view policy on audit_logs present
    pub audit_policy: bool,
    /// Which privileged functions the catalog reports
    pub functions: ServerFunctions,
}

impl SecurityVerification {
    /// True when the audit trail and every expected function are in place
    pub fn all_present(&self) -> bool {
        self.audit_table && self.audit_policy && self.functions.is_complete()
    }

    /// Names of expected functions the catalog does not report
    pub fn missing_functions(&self) -> Vec<&'static str> {
        self.functions.missing()
    }
}

/// Check the catalog for the objects the security layer is meant to install
pub async fn verify_security_objects(pool: &DbPool) -> Result<SecurityVerification> {
    let audit_table: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = 'public' AND tablename = 'audit_logs')",
    )
    .fetch_one(pool)
    .await
    .context("Failed to check for audit_logs table")?;

    let audit_policy: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_policies
            WHERE schemaname = 'public'
              AND tablename = 'audit_logs'
              AND policyname = 'Admins can view audit logs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("Failed to check for audit view policy")?;

    let functions = ServerFunctions::probe(pool).await?;

    Ok(SecurityVerification {
        audit_table,
        audit_policy,
        functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_sql_covers_expected_objects() {
        assert!(SECURITY_ENHANCEMENTS_SQL.contains("audit_logs"));
        assert!(SECURITY_ENHANCEMENTS_SQL.contains("Admins can view audit logs"));
        for name in EXPECTED_FUNCTIONS {
            assert!(
                SECURITY_ENHANCEMENTS_SQL.contains(name),
                "security layer should mention {}",
                name
            );
        }
    }

    #[test]
    fn test_write_security_file_respects_existing() {
        let dir = tempfile::tempdir().unwrap();

        let (path, status) = write_security_file(dir.path(), false).unwrap();
        assert_eq!(status, WriteStatus::Written);
        assert!(path.exists());

        // Second write without overwrite leaves the file alone
        std::fs::write(&path, "-- locally modified").unwrap();
        let (_, status) = write_security_file(dir.path(), false).unwrap();
        assert_eq!(status, WriteStatus::AlreadyPresent);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "-- locally modified"
        );

        // Overwrite restores the embedded content
        let (_, status) = write_security_file(dir.path(), true).unwrap();
        assert_eq!(status, WriteStatus::Overwritten);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            SECURITY_ENHANCEMENTS_SQL
        );
    }

    #[test]
    fn test_verification_accounting() {
        let verification = SecurityVerification {
            audit_table: true,
            audit_policy: true,
            functions: ServerFunctions::from_names(EXPECTED_FUNCTIONS),
        };
        assert!(verification.all_present());
        assert!(verification.missing_functions().is_empty());

        let verification = SecurityVerification {
            audit_table: true,
            audit_policy: false,
            functions: ServerFunctions::from_names(["record_audit_log"]),
        };
        assert!(!verification.all_present());
        assert!(verification
            .missing_functions()
            .contains(&"delete_organization"));
    }
}
