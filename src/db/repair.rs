//! Repair routines for damaged deployments
//!
//! Two known failure modes are handled here: organizations written with
//! missing or out-of-range timestamps, and databases carrying stale
//! row-security policies from earlier releases. The fix-dates and
//! fix-permissions tools drive these routines and print their reports.

use anyhow::{Context, Result};
use tracing::info;

use super::DbPool;

/// Rows are considered damaged when the creation timestamp is missing or
/// outside this window, or when the update timestamp is missing.
const INVALID_TIMESTAMP_PREDICATE: &str = "created_at IS NULL \
     OR created_at < '2000-01-01'::timestamptz \
     OR created_at > now() \
     OR updated_at IS NULL";

/// Outcome of a timestamp repair pass over the organizations table
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateFixReport {
    /// Total organization rows
    pub total: i64,
    /// Rows matching the damage predicate before the repair
    pub invalid_before: i64,
    /// Rows whose NULL created_at was set to now()
    pub fixed_null_created: u64,
    /// Rows whose out-of-range created_at was set to now()
    pub fixed_out_of_range: u64,
    /// Rows whose NULL updated_at was set to their created_at
    pub fixed_null_updated: u64,
    /// Rows passing the predicate after the repair
    pub valid_after: i64,
}

impl DateFixReport {
    /// True when every row passes the timestamp predicate
    pub fn is_clean(&self) -> bool {
        self.valid_after == self.total
    }
}

/// Repair missing and out-of-range organization timestamps.
/// Safe to run repeatedly; a clean table yields an all-zero report.
pub async fn fix_dates(pool: &DbPool) -> Result<DateFixReport> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
        .fetch_one(pool)
        .await
        .context("Failed to count organizations")?;

    let invalid_before: i64 = count_invalid(pool).await?;

    let mut report = DateFixReport {
        total,
        invalid_before,
        valid_after: total - invalid_before,
        ..Default::default()
    };

    if invalid_before == 0 {
        info!("All organization timestamps are valid");
        return Ok(report);
    }

    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin repair transaction")?;

    report.fixed_null_created =
        sqlx::query("UPDATE organizations SET created_at = now() WHERE created_at IS NULL")
            .execute(&mut *tx)
            .await
            .context("Failed to backfill NULL created_at")?
            .rows_affected();

    report.fixed_out_of_range = sqlx::query(
        "UPDATE organizations SET created_at = now() \
         WHERE created_at < '2000-01-01'::timestamptz OR created_at > now()",
    )
    .execute(&mut *tx)
    .await
    .context("Failed to repair out-of-range created_at")?
    .rows_affected();

    report.fixed_null_updated =
        sqlx::query("UPDATE organizations SET updated_at = created_at WHERE updated_at IS NULL")
            .execute(&mut *tx)
            .await
            .context("Failed to backfill NULL updated_at")?
            .rows_affected();

    tx.commit()
        .await
        .context("Failed to commit repair transaction")?;

    let invalid_after = count_invalid(pool).await?;
    report.valid_after = total - invalid_after;

    info!(
        fixed_null_created = report.fixed_null_created,
        fixed_out_of_range = report.fixed_out_of_range,
        fixed_null_updated = report.fixed_null_updated,
        "Timestamp repair finished"
    );

    Ok(report)
}

async fn count_invalid(pool: &DbPool) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM organizations WHERE {}",
        INVALID_TIMESTAMP_PREDICATE
    );
    sqlx::query_scalar(&sql)
        .fetch_one(pool)
        .await
        .context("Failed to count damaged organization rows")
}

/// Legacy view-policy names that earlier releases created under various
/// spellings. All of them are dropped before the canonical set is installed.
pub const LEGACY_POLICIES: [(&str, &str); 6] = [
    ("organizations", "Users can view organizations they belong to"),
    ("organizations", "Users can view their organizations"),
    ("organizations", "View all organizations"),
    ("organizations", "Users can view organizations they are members of"),
    ("organization_users", "Users can view other members"),
    ("organization_users", "Users can view their own memberships"),
];

const MEMBERSHIP_HELPER_SQL: &str = r#"
CREATE OR REPLACE FUNCTION is_org_member(
  org_id UUID,
  uid UUID
) RETURNS BOOLEAN
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = public
AS $$
BEGIN
  RETURN EXISTS (
    SELECT 1 FROM organization_users ou
    WHERE ou.organization_id = org_id
      AND ou.user_id = uid
  );
END;
$$
"#;

/// Canonical view policies, installed with drop-then-create so the routine
/// can be replayed.
const CANONICAL_POLICIES: [(&str, &str, &str); 2] = [
    (
        "organizations",
        "Members can view their organizations",
        r#"CREATE POLICY "Members can view their organizations" ON organizations
  FOR SELECT
  USING (is_org_member(id, auth.uid()))"#,
    ),
    (
        "organization_users",
        "Members can view co-memberships",
        r#"CREATE POLICY "Members can view co-memberships" ON organization_users
  FOR SELECT
  USING (
    user_id = auth.uid()
    OR is_org_member(organization_id, auth.uid())
  )"#,
    ),
];

/// One row of the pg_policies inventory
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PolicyInfo {
    pub tablename: String,
    pub policyname: String,
    pub cmd: Option<String>,
}

/// Outcome of a policy repair pass
#[derive(Debug, Default)]
pub struct PermissionFixReport {
    pub policies_before: Vec<PolicyInfo>,
    pub policies_after: Vec<PolicyInfo>,
    /// Legacy policy names the routine dropped (present or not)
    pub dropped: Vec<String>,
    /// Whether is_org_member exists after the repair
    pub helper_installed: bool,
}

/// Drop the legacy view policies and reinstall the canonical ones together
/// with the membership helper function.
pub async fn fix_permissions(pool: &DbPool) -> Result<PermissionFixReport> {
    let mut report = PermissionFixReport {
        policies_before: list_policies(pool).await?,
        ..Default::default()
    };

    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin policy repair transaction")?;

    sqlx::raw_sql(MEMBERSHIP_HELPER_SQL)
        .execute(&mut *tx)
        .await
        .context("Failed to install is_org_member")?;

    for (table, policy) in LEGACY_POLICIES {
        let stmt = format!(r#"DROP POLICY IF EXISTS "{}" ON {}"#, policy, table);
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to drop policy {} on {}", policy, table))?;
        report.dropped.push(policy.to_string());
    }

    for (table, policy, create_sql) in CANONICAL_POLICIES {
        let drop_stmt = format!(r#"DROP POLICY IF EXISTS "{}" ON {}"#, policy, table);
        sqlx::query(&drop_stmt)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to drop policy {} on {}", policy, table))?;
        sqlx::query(create_sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create policy {} on {}", policy, table))?;
    }

    tx.commit()
        .await
        .context("Failed to commit policy repair transaction")?;

    report.policies_after = list_policies(pool).await?;
    report.helper_installed = helper_exists(pool).await?;

    info!(
        before = report.policies_before.len(),
        after = report.policies_after.len(),
        helper = report.helper_installed,
        "Policy repair finished"
    );

    Ok(report)
}

async fn list_policies(pool: &DbPool) -> Result<Vec<PolicyInfo>> {
    sqlx::query_as::<_, PolicyInfo>(
        r#"
        SELECT tablename, policyname, cmd
        FROM pg_policies
        WHERE schemaname = 'public'
          AND tablename IN ('organizations', 'organization_users')
        ORDER BY tablename, policyname
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to inventory policies")
}

async fn helper_exists(pool: &DbPool) -> Result<bool> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = 'public' AND p.proname = 'is_org_member'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("Failed to check for is_org_member")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_fix_report_clean() {
        let report = DateFixReport {
            total: 10,
            invalid_before: 0,
            valid_after: 10,
            ..Default::default()
        };
        assert!(report.is_clean());

        let report = DateFixReport {
            total: 10,
            invalid_before: 3,
            valid_after: 8,
            ..Default::default()
        };
        assert!(!report.is_clean());
    }

    #[test]
    fn test_legacy_policy_set_is_complete() {
        let org_policies: Vec<&str> = LEGACY_POLICIES
            .iter()
            .filter(|(table, _)| *table == "organizations")
            .map(|(_, name)| *name)
            .collect();
        assert_eq!(org_policies.len(), 4);

        let member_policies: Vec<&str> = LEGACY_POLICIES
            .iter()
            .filter(|(table, _)| *table == "organization_users")
            .map(|(_, name)| *name)
            .collect();
        assert_eq!(member_policies.len(), 2);
    }

    #[test]
    fn test_canonical_policies_reference_helper() {
        for (_, _, sql) in CANONICAL_POLICIES {
            assert!(sql.contains("is_org_member"));
        }
    }
}
