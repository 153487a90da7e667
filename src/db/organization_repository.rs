//! Organization (tenant) repository
//!
//! Lifecycle mutations go through the privileged database functions when the
//! capability probe found them, and fall back to equivalent direct SQL in a
//! single transaction otherwise. Plain reads always use direct SQL.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::db::capabilities::ServerFunctions;
use crate::db::DbPool;
use crate::models::{
    Organization, OrganizationMember, OrgRole, UpdateOrganizationRequest, UserOrganization,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::validate_organization_name;

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    industry: Option<String>,
    size: Option<String>,
    vat_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    organization_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserOrgRow {
    organization_id: Uuid,
    organization_name: String,
    user_role: String,
}

pub struct OrganizationRepository<'a> {
    pool: &'a DbPool,
    functions: &'a ServerFunctions,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(pool: &'a DbPool, functions: &'a ServerFunctions) -> Self {
        Self { pool, functions }
    }

    /// List the organizations a user belongs to, with their role in each
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<UserOrganization>> {
        let rows = if self.functions.has("get_user_organizations") {
            sqlx::query_as::<_, UserOrgRow>(
                r#"
                SELECT organization_id, organization_name, user_role
                FROM get_user_organizations($1)
                "#,
            )
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(map_function_error)?
        } else {
            debug!("get_user_organizations missing, using direct query");
            sqlx::query_as::<_, UserOrgRow>(
                r#"
                SELECT o.id AS organization_id, o.name AS organization_name, ou.role AS user_role
                FROM organizations o
                JOIN organization_users ou ON ou.organization_id = o.id
                WHERE ou.user_id = $1
                ORDER BY o.name
                "#,
            )
            .bind(user_id)
            .fetch_all(self.pool)
            .await?
        };

        Ok(rows.into_iter().map(row_to_user_org).collect())
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, name, industry, size, vat_number, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_org))
    }

    /// Create an organization with the acting user as its founding admin.
    /// Optional profile fields are applied in a follow-up update.
    pub async fn create_with_admin(
        &self,
        name: &str,
        user_id: Uuid,
        profile: &UpdateOrganizationRequest,
    ) -> AppResult<Organization> {
        let trimmed = name.trim();
        if !validate_organization_name(trimmed) {
            return Err(AppError::BadRequest(
                "Organization name cannot be empty".to_string(),
            ));
        }

        let org_id = if self.functions.has("create_organization_with_admin") {
            sqlx::query_scalar::<_, Uuid>("SELECT create_organization_with_admin($1, $2)")
                .bind(trimmed)
                .bind(user_id)
                .fetch_one(self.pool)
                .await
                .map_err(map_function_error)?
        } else {
            debug!("create_organization_with_admin missing, using direct transaction");
            self.create_direct(trimmed, user_id).await?
        };

        let wants_profile = profile.industry.is_some()
            || profile.size.is_some()
            || profile.vat_number.is_some();
        if wants_profile {
            let update = UpdateOrganizationRequest {
                name: None,
                industry: profile.industry.clone(),
                size: profile.size.clone(),
                vat_number: profile.vat_number.clone(),
            };
            self.update(org_id, user_id, &update).await?;
        }

        self.get_by_id(org_id)
            .await?
            .ok_or_else(|| AppError::Internal("Created organization not found".to_string()))
    }

    async fn create_direct(&self, name: &str, user_id: Uuid) -> AppResult<Uuid> {
        let mut tx = self.pool.begin().await?;

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM auth.users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(AppError::BadRequest("User does not exist".to_string()));
        }

        let org_id: Uuid =
            sqlx::query_scalar("INSERT INTO organizations (name) VALUES ($1) RETURNING id")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            "INSERT INTO organization_users (organization_id, user_id, role) VALUES ($1, $2, 'admin')",
        )
        .bind(org_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        self.audit_in_tx(
            &mut tx,
            "create_organization",
            org_id,
            serde_json::json!({ "name": name, "created_by": user_id }),
        )
        .await?;

        tx.commit().await?;
        Ok(org_id)
    }

    /// Update profile fields. Returns false when the organization is gone.
    pub async fn update(
        &self,
        org_id: Uuid,
        acting_user: Uuid,
        req: &UpdateOrganizationRequest,
    ) -> AppResult<bool> {
        if let Some(ref name) = req.name {
            if !validate_organization_name(name) {
                return Err(AppError::BadRequest(
                    "Organization name cannot be empty".to_string(),
                ));
            }
        }

        if self.functions.has("update_organization") {
            let updated: bool =
                sqlx::query_scalar("SELECT update_organization($1, $2, $3, $4, $5, $6)")
                    .bind(org_id)
                    .bind(acting_user)
                    .bind(req.name.as_deref())
                    .bind(req.industry.as_deref())
                    .bind(req.size.as_deref())
                    .bind(req.vat_number.as_deref())
                    .fetch_one(self.pool)
                    .await
                    .map_err(map_function_error)?;
            return Ok(updated);
        }

        debug!("update_organization missing, using direct transaction");
        let mut tx = self.pool.begin().await?;

        self.require_admin_in_tx(&mut tx, org_id, acting_user).await?;

        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET name = COALESCE(NULLIF(trim($2), ''), name),
                industry = COALESCE($3, industry),
                size = COALESCE($4, size),
                vat_number = COALESCE($5, vat_number),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(req.name.as_deref())
        .bind(req.industry.as_deref())
        .bind(req.size.as_deref())
        .bind(req.vat_number.as_deref())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.audit_in_tx(
            &mut tx,
            "update_organization",
            org_id,
            serde_json::json!({
                "name": req.name,
                "industry": req.industry,
                "size": req.size,
                "vat_number": req.vat_number,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete an organization with its memberships and addresses.
    /// Returns false when it did not exist.
    pub async fn delete(&self, org_id: Uuid, acting_user: Uuid) -> AppResult<bool> {
        if self.functions.has("delete_organization") {
            let deleted: bool = sqlx::query_scalar("SELECT delete_organization($1, $2)")
                .bind(org_id)
                .bind(acting_user)
                .fetch_one(self.pool)
                .await
                .map_err(map_function_error)?;
            return Ok(deleted);
        }

        debug!("delete_organization missing, using direct transaction");
        let mut tx = self.pool.begin().await?;

        self.require_admin_in_tx(&mut tx, org_id, acting_user).await?;

        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM organizations WHERE id = $1")
                .bind(org_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(name) = name else {
            return Ok(false);
        };

        self.audit_in_tx(
            &mut tx,
            "delete_organization",
            org_id,
            serde_json::json!({ "name": name, "deleted_by": acting_user }),
        )
        .await?;

        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(org_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// List the members of an organization
    pub async fn members(&self, org_id: Uuid) -> AppResult<Vec<OrganizationMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT id, organization_id, user_id, role, created_at, updated_at
            FROM organization_users
            WHERE organization_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(org_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_member).collect())
    }

    /// The acting user's role in an organization, if any
    pub async fn member_role(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Option<OrgRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM organization_users WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(role.as_deref().and_then(OrgRole::parse))
    }

    /// True when the acting user holds an admin role in any organization
    pub async fn is_admin_anywhere(&self, user_id: Uuid) -> AppResult<bool> {
        let admin: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM organization_users WHERE user_id = $1 AND role = 'admin')",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(admin)
    }

    async fn require_admin_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        org_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let is_admin: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM organization_users
                WHERE organization_id = $1 AND user_id = $2 AND role = 'admin'
            )
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        if !is_admin {
            return Err(AppError::Forbidden(
                "User is not an admin of this organization".to_string(),
            ));
        }
        Ok(())
    }

    /// Write an audit row inside the caller's transaction. Uses the audit
    /// function when present; in degraded mode the action goes unaudited.
    async fn audit_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        action: &str,
        record_id: Uuid,
        details: serde_json::Value,
    ) -> AppResult<()> {
        if !self.functions.has("record_audit_log") {
            debug!(action = action, "record_audit_log missing, skipping audit entry");
            return Ok(());
        }

        sqlx::query("SELECT record_audit_log($1, $2, $3, $4)")
            .bind(action)
            .bind("organizations")
            .bind(record_id)
            .bind(Json(details))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

/// Map errors raised by the privileged functions onto API errors. RAISE
/// EXCEPTION surfaces as SQLSTATE P0001 with the raised message; a statement
/// timeout surfaces as 57014.
pub(crate) fn map_function_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if let Some(mapped) = classify_function_code(&code, db_err.message()) {
                return mapped;
            }
        }
    }
    AppError::from(err)
}

/// SQLSTATE routing for calls into the privileged functions: P0001 carries
/// a raised validation/permission message, 57014 is the statement timeout
/// on get_user_organizations. Anything else is left to the generic mapping.
fn classify_function_code(code: &str, message: &str) -> Option<AppError> {
    match code {
        "P0001" => Some(classify_raise_message(message.to_string())),
        "57014" => Some(AppError::ServiceUnavailable(
            "Database query timed out".to_string(),
        )),
        _ => None,
    }
}

/// Route a message raised by a privileged function to the right status:
/// permission checks become 403, unknown references 400, the rest 422.
fn classify_raise_message(message: String) -> AppError {
    let lowered = message.to_lowercase();
    if lowered.contains("not an admin") || lowered.contains("not a member") {
        AppError::Forbidden(message)
    } else if lowered.contains("does not exist") {
        AppError::BadRequest(message)
    } else {
        AppError::ValidationError(message)
    }
}

fn row_to_org(row: OrganizationRow) -> Organization {
    Organization {
        id: row.id,
        name: row.name,
        industry: row.industry,
        size: row.size,
        vat_number: row.vat_number,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn row_to_member(row: MemberRow) -> OrganizationMember {
    OrganizationMember {
        id: row.id,
        organization_id: row.organization_id,
        user_id: row.user_id,
        // The role column carries a CHECK constraint; fall back to the
        // least-privileged role if something slipped past it.
        role: OrgRole::parse(&row.role).unwrap_or(OrgRole::Viewer),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn row_to_user_org(row: UserOrgRow) -> UserOrganization {
    UserOrganization {
        organization_id: row.organization_id,
        organization_name: row.organization_name,
        role: OrgRole::parse(&row.user_role).unwrap_or(OrgRole::Viewer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_member_parses_role() {
        let now = Utc::now();
        let row = MemberRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "admin".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(row_to_member(row).role, OrgRole::Admin);
    }

    #[test]
    fn test_row_to_member_unknown_role_degrades() {
        let now = Utc::now();
        let row = MemberRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "superuser".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(row_to_member(row).role, OrgRole::Viewer);
    }

    #[test]
    fn test_raise_message_routing() {
        let err = classify_raise_message("User is not an admin of this organization".to_string());
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = classify_raise_message("User is not a member of this organization".to_string());
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = classify_raise_message("User does not exist".to_string());
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = classify_raise_message("Organization name cannot be empty".to_string());
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_function_code_routing() {
        let err = classify_function_code("P0001", "User is not an admin of this organization");
        assert!(matches!(err, Some(AppError::Forbidden(_))));

        // Statement timeout on the bounded listing function
        let err = classify_function_code("57014", "canceling statement due to statement timeout");
        assert!(matches!(err, Some(AppError::ServiceUnavailable(_))));

        assert!(classify_function_code("23505", "duplicate key").is_none());
        assert!(classify_function_code("XX000", "internal").is_none());
    }
}
