//! Versioned migration runner
//!
//! Migrations live in an ordered directory tree (`00-init/`, `01-seed/`,
//! `02-functions/`, ...) of plain SQL files, with the security enhancement
//! layer as a single file at the tree root that always runs last. Each file
//! is applied in its own transaction and recorded in the
//! `schema_migrations` ledger together with a content checksum, so
//! subsequent runs skip what is already applied and flag files that changed
//! after the fact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::DbPool;

/// SQLSTATE codes that indicate an already-applied change. A file failing
/// with one of these is counted as a warning, not a failure, which keeps the
/// runner usable against databases that predate the ledger.
pub const IGNORABLE_SQLSTATES: [&str; 5] = [
    "42710", // duplicate_object
    "42P07", // duplicate_table
    "42P16", // invalid_table_definition (trigger already exists)
    "42701", // duplicate_column
    "23505", // unique_violation
];

/// Check whether a SQLSTATE code is in the ignorable set
pub fn is_ignorable_code(code: &str) -> bool {
    IGNORABLE_SQLSTATES.contains(&code)
}

/// The ordered directories a full migration tree carries
pub const EXPECTED_DIRECTORIES: [&str; 6] = [
    "00-init",
    "01-seed",
    "02-functions",
    "03-policies",
    "04-seed",
    "05-fixes",
];

/// Expected subdirectories absent from a migration tree root
pub fn missing_expected_dirs(dir: &Path) -> Vec<&'static str> {
    EXPECTED_DIRECTORIES
        .iter()
        .copied()
        .filter(|name| !dir.join(name).is_dir())
        .collect()
}

/// Runner behavior switches, set from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerOptions {
    /// Demote every failure to a warning and keep going
    pub safe_mode: bool,
    /// Re-apply files even when the ledger says they are current
    pub force: bool,
    /// Drop all tables in the public schema before applying
    pub reset: bool,
}

/// What happened to a single migration file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Applied and recorded in the ledger
    Applied,
    /// Ledger entry with matching checksum; nothing to do
    Skipped,
    /// Ignorable database error, or a failure demoted by safe mode
    Warned {
        code: Option<String>,
        message: String,
    },
    /// Non-ignorable failure outside safe mode
    Failed {
        code: Option<String>,
        message: String,
    },
}

/// Aggregated run counters, one increment per file
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MigrationSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub warned: usize,
    pub failed: usize,
}

impl MigrationSummary {
    pub fn record(&mut self, outcome: &FileOutcome) {
        self.total += 1;
        match outcome {
            FileOutcome::Applied => self.successful += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Warned { .. } => self.warned += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Exit code for the CLI: failures are fatal, warnings are not
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Result of a full runner invocation
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Per-file outcomes in application order, keyed by tree-relative path
    pub results: Vec<(String, FileOutcome)>,
    pub summary: MigrationSummary,
    /// Number of tables dropped by the reset step, when it ran
    pub tables_dropped: Option<u64>,
}

/// Collect migration files in application order.
///
/// Subdirectories of the tree root are visited in lexicographic order and
/// their `.sql` files applied sorted by name. Loose `.sql` files at the tree
/// root (the security enhancement layer) come after every subdirectory.
pub fn collect_migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Migrations directory not found: {}", dir.display()))?;

    let mut subdirs: Vec<PathBuf> = Vec::new();
    let mut root_files: Vec<PathBuf> = Vec::new();

    for entry in entries {
        let entry = entry.context("Failed to read migrations directory entry")?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if is_sql_file(&path) {
            root_files.push(path);
        }
    }

    subdirs.sort();
    root_files.sort();

    let mut files = Vec::new();
    for subdir in subdirs {
        let mut batch: Vec<PathBuf> = fs::read_dir(&subdir)
            .with_context(|| format!("Failed to read migration directory: {}", subdir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_sql_file(p))
            .collect();
        batch.sort();
        files.extend(batch);
    }

    files.extend(root_files);

    Ok(files)
}

fn is_sql_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "sql")
}

/// SHA-256 checksum of a migration file body, hex-encoded
pub fn file_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create the ledger table when it does not exist yet
pub async fn ensure_ledger(pool: &DbPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            path TEXT PRIMARY KEY,
            checksum TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migration ledger table")?;

    Ok(())
}

/// Drop every table in the public schema, cascading, in one transaction.
/// Returns the number of tables dropped.
pub async fn reset_database(pool: &DbPool) -> Result<u64> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin reset transaction")?;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT tablename FROM pg_tables WHERE schemaname = 'public'")
            .fetch_all(&mut *tx)
            .await
            .context("Failed to enumerate tables for reset")?;

    for table in &tables {
        let stmt = format!(
            r#"DROP TABLE IF EXISTS public."{}" CASCADE"#,
            table.replace('"', "\"\"")
        );
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to drop table {}", table))?;
    }

    tx.commit()
        .await
        .context("Failed to commit reset transaction")?;

    Ok(tables.len() as u64)
}

/// Applies a migration tree against a database
pub struct MigrationRunner<'a> {
    pool: &'a DbPool,
    options: RunnerOptions,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(pool: &'a DbPool, options: RunnerOptions) -> Self {
        Self { pool, options }
    }

    /// Run the full tree. A non-ignorable failure stops the run unless safe
    /// mode is set; warnings never do.
    pub async fn run(&self, dir: &Path) -> Result<MigrationReport> {
        let absent = missing_expected_dirs(dir);
        if !absent.is_empty() {
            warn!(directories = ?absent, "Expected migration directories are missing, skipping them");
        }

        let files = collect_migration_files(dir)?;
        info!(count = files.len(), dir = %dir.display(), "Collected migration files");

        let mut report = MigrationReport::default();

        if self.options.reset {
            match reset_database(self.pool).await {
                Ok(count) => {
                    info!(tables = count, "Dropped all tables in public schema");
                    report.tables_dropped = Some(count);
                }
                Err(err) if self.options.safe_mode => {
                    warn!(error = %err, "Schema reset failed, continuing in safe mode");
                }
                Err(err) => {
                    return Err(err.context("Schema reset failed"));
                }
            }
        }

        ensure_ledger(self.pool).await?;

        for path in files {
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();

            let outcome = self.apply_file(&path, &relative).await?;

            match &outcome {
                FileOutcome::Applied => info!(file = %relative, "Applied"),
                FileOutcome::Skipped => debug!(file = %relative, "Already applied, skipping"),
                FileOutcome::Warned { code, message } => {
                    warn!(file = %relative, code = ?code, message = %message, "Warning")
                }
                FileOutcome::Failed { code, message } => {
                    warn!(file = %relative, code = ?code, message = %message, "Failed")
                }
            }

            report.summary.record(&outcome);
            let failed = matches!(outcome, FileOutcome::Failed { .. });
            report.results.push((relative, outcome));

            // Default mode aborts the remaining files on a hard failure
            if failed {
                break;
            }
        }

        Ok(report)
    }

    async fn apply_file(&self, path: &Path, relative: &str) -> Result<FileOutcome> {
        let sql = match fs::read_to_string(path) {
            Ok(sql) => sql,
            Err(err) => {
                return Ok(classify_failure(
                    self.options.safe_mode,
                    None,
                    format!("Failed to read {}: {}", relative, err),
                ));
            }
        };
        self.apply_sql(relative, &sql).await
    }

    /// Apply one migration body under the per-file contract: ledger check,
    /// single transaction, ignorable-error classification, ledger record.
    pub async fn apply_sql(&self, relative: &str, sql: &str) -> Result<FileOutcome> {
        let checksum = file_checksum(sql);

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT checksum FROM schema_migrations WHERE path = $1")
                .bind(relative)
                .fetch_optional(self.pool)
                .await
                .context("Failed to read migration ledger")?;

        match recorded.as_deref() {
            Some(prev) if prev == checksum && !self.options.force => {
                return Ok(FileOutcome::Skipped);
            }
            Some(prev) if prev != checksum => {
                warn!(
                    file = %relative,
                    "Migration file changed after being applied, re-applying"
                );
            }
            _ => {}
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin migration transaction")?;

        if let Err(err) = sqlx::raw_sql(sql).execute(&mut *tx).await {
            tx.rollback().await.ok();

            let (code, message) = describe_db_error(&err);
            if let Some(ref c) = code {
                if is_ignorable_code(c) {
                    // The change is already present; record the file so the
                    // next run skips it instead of re-hitting the error.
                    self.record_in_ledger(relative, &checksum).await?;
                    return Ok(FileOutcome::Warned { code, message });
                }
            }
            return Ok(classify_failure(self.options.safe_mode, code, message));
        }

        sqlx::query(
            r#"
            INSERT INTO schema_migrations (path, checksum, applied_at)
            VALUES ($1, $2, now())
            ON CONFLICT (path) DO UPDATE
            SET checksum = EXCLUDED.checksum, applied_at = now()
            "#,
        )
        .bind(relative)
        .bind(&checksum)
        .execute(&mut *tx)
        .await
        .context("Failed to record migration in ledger")?;

        tx.commit()
            .await
            .context("Failed to commit migration transaction")?;

        Ok(FileOutcome::Applied)
    }

    async fn record_in_ledger(&self, relative: &str, checksum: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schema_migrations (path, checksum, applied_at)
            VALUES ($1, $2, now())
            ON CONFLICT (path) DO UPDATE
            SET checksum = EXCLUDED.checksum, applied_at = now()
            "#,
        )
        .bind(relative)
        .bind(checksum)
        .execute(self.pool)
        .await
        .context("Failed to record migration in ledger")?;

        Ok(())
    }
}

fn classify_failure(safe_mode: bool, code: Option<String>, message: String) -> FileOutcome {
    if safe_mode {
        FileOutcome::Warned { code, message }
    } else {
        FileOutcome::Failed { code, message }
    }
}

fn describe_db_error(err: &sqlx::Error) -> (Option<String>, String) {
    match err {
        sqlx::Error::Database(db_err) => (
            db_err.code().map(|c| c.into_owned()),
            db_err.message().to_string(),
        ),
        other => (None, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    #[rstest]
    #[case("42710", true)] // duplicate_object
    #[case("42P07", true)] // duplicate_table
    #[case("42P16", true)] // invalid_table_definition
    #[case("42701", true)] // duplicate_column
    #[case("23505", true)] // unique_violation
    #[case("42883", false)] // undefined_function
    #[case("23503", false)] // foreign_key_violation
    #[case("", false)]
    fn test_ignorable_codes(#[case] code: &str, #[case] ignorable: bool) {
        assert_eq!(is_ignorable_code(code), ignorable);
    }

    #[test]
    fn test_missing_expected_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("00-init")).unwrap();
        fs::create_dir(root.path().join("02-functions")).unwrap();

        let absent = missing_expected_dirs(root.path());
        assert_eq!(absent, vec!["01-seed", "03-policies", "04-seed", "05-fixes"]);

        for name in EXPECTED_DIRECTORIES {
            fs::create_dir_all(root.path().join(name)).unwrap();
        }
        assert!(missing_expected_dirs(root.path()).is_empty());
    }

    #[test]
    fn test_file_checksum_is_stable_hex() {
        let sum = file_checksum("SELECT 1;");
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sum, file_checksum("SELECT 1;"));
        assert_ne!(sum, file_checksum("SELECT 2;"));
    }

    #[test]
    fn test_summary_counters_and_exit_code() {
        let mut summary = MigrationSummary::default();
        summary.record(&FileOutcome::Applied);
        summary.record(&FileOutcome::Skipped);
        summary.record(&FileOutcome::Warned {
            code: Some("42710".to_string()),
            message: "duplicate".to_string(),
        });

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.warned, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.exit_code(), 0);

        summary.record(&FileOutcome::Failed {
            code: None,
            message: "boom".to_string(),
        });
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_classify_failure_honors_safe_mode() {
        let outcome = classify_failure(true, Some("XX000".to_string()), "broken".to_string());
        assert!(matches!(outcome, FileOutcome::Warned { .. }));

        let outcome = classify_failure(false, Some("XX000".to_string()), "broken".to_string());
        assert!(matches!(outcome, FileOutcome::Failed { .. }));
    }

    #[test]
    fn test_collect_migration_files_ordering() {
        let root = tempfile::tempdir().unwrap();

        fs::create_dir(root.path().join("01-seed")).unwrap();
        fs::create_dir(root.path().join("00-init")).unwrap();
        fs::write(root.path().join("01-seed/0001_rows.sql"), "SELECT 1;").unwrap();
        fs::write(root.path().join("00-init/0002_later.sql"), "SELECT 1;").unwrap();
        fs::write(root.path().join("00-init/0001_first.sql"), "SELECT 1;").unwrap();
        fs::write(root.path().join("99-security-enhancements.sql"), "SELECT 1;").unwrap();
        // Files without a .sql extension are ignored
        fs::write(root.path().join("00-init/README.md"), "notes").unwrap();

        let files = collect_migration_files(root.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(root.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        assert_eq!(
            names,
            vec![
                "00-init/0001_first.sql",
                "00-init/0002_later.sql",
                "01-seed/0001_rows.sql",
                "99-security-enhancements.sql",
            ]
        );
    }

    #[test]
    fn test_collect_migration_files_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        assert!(collect_migration_files(&missing).is_err());
    }
}
