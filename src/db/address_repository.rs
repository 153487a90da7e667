//! Organization address repository

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::db::capabilities::ServerFunctions;
use crate::db::organization_repository::map_function_error;
use crate::db::DbPool;
use crate::models::{Address, AddressType, CreateAddressRequest, UpdateAddressRequest};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{validate_country_code, validate_street_line};

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    organization_id: Uuid,
    street_line1: String,
    street_line2: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    province: Option<String>,
    country: Option<String>,
    address_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct AddressRepository<'a> {
    pool: &'a DbPool,
    functions: &'a ServerFunctions,
}

impl<'a> AddressRepository<'a> {
    pub fn new(pool: &'a DbPool, functions: &'a ServerFunctions) -> Self {
        Self { pool, functions }
    }

    pub async fn list(&self, org_id: Uuid) -> AppResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, AddressRow>(
            r#"
            SELECT id, organization_id, street_line1, street_line2, postal_code,
                   city, province, country, address_type, created_at, updated_at
            FROM addresses
            WHERE organization_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(org_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_address).collect())
    }

    pub async fn get_by_id(&self, org_id: Uuid, address_id: Uuid) -> AppResult<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>(
            r#"
            SELECT id, organization_id, street_line1, street_line2, postal_code,
                   city, province, country, address_type, created_at, updated_at
            FROM addresses
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(address_id)
        .bind(org_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_address))
    }

    /// Create an address for an organization the acting user belongs to
    pub async fn create(
        &self,
        org_id: Uuid,
        acting_user: Uuid,
        req: &CreateAddressRequest,
    ) -> AppResult<Address> {
        validate_address_fields(Some(&req.street_line1), req.country.as_deref())?;

        let address_id = if self.functions.has("create_organization_address") {
            sqlx::query_scalar::<_, Uuid>(
                "SELECT create_organization_address($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(org_id)
            .bind(acting_user)
            .bind(req.street_line1.trim())
            .bind(req.street_line2.as_deref())
            .bind(req.postal_code.as_deref())
            .bind(req.city.as_deref())
            .bind(req.province.as_deref())
            .bind(req.country.as_deref())
            .bind(req.address_type.as_str())
            .fetch_one(self.pool)
            .await
            .map_err(map_function_error)?
        } else {
            debug!("create_organization_address missing, using direct transaction");
            self.create_direct(org_id, acting_user, req).await?
        };

        self.get_by_id(org_id, address_id)
            .await?
            .ok_or_else(|| AppError::Internal("Created address not found".to_string()))
    }

    async fn create_direct(
        &self,
        org_id: Uuid,
        acting_user: Uuid,
        req: &CreateAddressRequest,
    ) -> AppResult<Uuid> {
        let mut tx = self.pool.begin().await?;

        let is_member: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM organization_users
                WHERE organization_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(org_id)
        .bind(acting_user)
        .fetch_one(&mut *tx)
        .await?;
        if !is_member {
            return Err(AppError::Forbidden(
                "User is not a member of this organization".to_string(),
            ));
        }

        let address_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO addresses (
                organization_id, street_line1, street_line2, postal_code,
                city, province, country, address_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(org_id)
        .bind(req.street_line1.trim())
        .bind(req.street_line2.as_deref())
        .bind(req.postal_code.as_deref())
        .bind(req.city.as_deref())
        .bind(req.province.as_deref())
        .bind(req.country.as_deref())
        .bind(req.address_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        self.audit_in_tx(
            &mut tx,
            "create_address",
            address_id,
            serde_json::json!({
                "organization_id": org_id,
                "address_type": req.address_type.as_str(),
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(address_id)
    }

    /// Update address fields; absent fields keep their current value.
    /// Returns the refreshed address, or None when it does not exist.
    pub async fn update(
        &self,
        org_id: Uuid,
        address_id: Uuid,
        req: &UpdateAddressRequest,
    ) -> AppResult<Option<Address>> {
        validate_address_fields(req.street_line1.as_deref(), req.country.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE addresses
            SET street_line1 = COALESCE(NULLIF(trim($3), ''), street_line1),
                street_line2 = COALESCE($4, street_line2),
                postal_code = COALESCE($5, postal_code),
                city = COALESCE($6, city),
                province = COALESCE($7, province),
                country = COALESCE($8, country),
                address_type = COALESCE($9, address_type),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(address_id)
        .bind(org_id)
        .bind(req.street_line1.as_deref())
        .bind(req.street_line2.as_deref())
        .bind(req.postal_code.as_deref())
        .bind(req.city.as_deref())
        .bind(req.province.as_deref())
        .bind(req.country.as_deref())
        .bind(req.address_type.map(|t| t.as_str()))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.audit_in_tx(
            &mut tx,
            "update_address",
            address_id,
            serde_json::json!({ "organization_id": org_id }),
        )
        .await?;

        tx.commit().await?;

        self.get_by_id(org_id, address_id).await
    }

    /// Delete an address. Returns false when it did not exist.
    pub async fn delete(&self, org_id: Uuid, address_id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND organization_id = $2")
            .bind(address_id)
            .bind(org_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.audit_in_tx(
            &mut tx,
            "delete_address",
            address_id,
            serde_json::json!({ "organization_id": org_id }),
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

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
            .bind("addresses")
            .bind(record_id)
            .bind(Json(details))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

fn validate_address_fields(street_line1: Option<&str>, country: Option<&str>) -> AppResult<()> {
    if let Some(street) = street_line1 {
        if !validate_street_line(street) {
            return Err(AppError::BadRequest(
                "Street address cannot be empty".to_string(),
            ));
        }
    }
    if let Some(code) = country {
        if !validate_country_code(code) {
            return Err(AppError::ValidationError(
                "Country must be a 2-letter uppercase ISO code".to_string(),
            ));
        }
    }
    Ok(())
}

fn row_to_address(row: AddressRow) -> Address {
    Address {
        id: row.id,
        organization_id: row.organization_id,
        street_line1: row.street_line1,
        street_line2: row.street_line2,
        postal_code: row.postal_code,
        city: row.city,
        province: row.province,
        country: row.country,
        address_type: AddressType::parse(&row.address_type).unwrap_or(AddressType::Other),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address_fields() {
        assert!(validate_address_fields(Some("Main St 1"), Some("DE")).is_ok());
        assert!(validate_address_fields(None, None).is_ok());

        let err = validate_address_fields(Some("   "), None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = validate_address_fields(Some("Main St 1"), Some("deu")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_row_to_address_parses_type() {
        let now = Utc::now();
        let row = AddressRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            street_line1: "Main St 1".to_string(),
            street_line2: None,
            postal_code: None,
            city: None,
            province: None,
            country: Some("DE".to_string()),
            address_type: "billing".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(row_to_address(row).address_type, AddressType::Billing);
    }
}
