//! Organization (tenant) API endpoints
//!
//! Reads are gated on membership; mutations go through the repository, where
//! the privileged database functions enforce the admin requirement. A caller
//! who is not a member sees the organization as not found rather than
//! forbidden, matching the row-visibility policies.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::organization_repository::OrganizationRepository,
    middleware::AuthUser,
    models::{
        CreateOrganizationRequest, Organization, OrganizationMember, UpdateOrganizationRequest,
        UserOrganization,
    },
    utils::{AppError, AppResult},
    AppState,
};

use super::addresses;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route(
            "/{id}",
            get(get_organization)
                .put(update_organization)
                .delete(delete_organization),
        )
        .route("/{id}/members", get(list_members))
        .merge(addresses::routes())
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn list_organizations(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<UserOrganization>>> {
    let repo = OrganizationRepository::new(&state.db, &state.functions);
    let orgs = repo.list_for_user(auth_user.id).await?;

    Ok(Json(orgs))
}

async fn create_organization(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateOrganizationRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    payload.validate()?;

    let profile = UpdateOrganizationRequest {
        name: None,
        industry: payload.industry.clone(),
        size: payload.size.clone(),
        vat_number: payload.vat_number.clone(),
    };

    let repo = OrganizationRepository::new(&state.db, &state.functions);
    let org = repo
        .create_with_admin(&payload.name, auth_user.id, &profile)
        .await?;

    Ok((StatusCode::CREATED, Json(org)))
}

async fn get_organization(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Organization>> {
    let repo = OrganizationRepository::new(&state.db, &state.functions);
    require_member(&repo, id, &auth_user).await?;

    let org = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))?;

    Ok(Json(org))
}

async fn update_organization(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> AppResult<Json<Organization>> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }

    let repo = OrganizationRepository::new(&state.db, &state.functions);
    let updated = repo.update(id, auth_user.id, &payload).await?;
    if !updated {
        return Err(AppError::NotFound("Organization not found".to_string()));
    }

    let org = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))?;

    Ok(Json(org))
}

async fn delete_organization(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let repo = OrganizationRepository::new(&state.db, &state.functions);
    let deleted = repo.delete(id, auth_user.id).await?;

    Ok(Json(DeleteResponse { deleted }))
}

async fn list_members(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<OrganizationMember>>> {
    let repo = OrganizationRepository::new(&state.db, &state.functions);
    require_member(&repo, id, &auth_user).await?;

    let members = repo.members(id).await?;

    Ok(Json(members))
}

/// Membership gate for read endpoints. Non-members get NotFound so tenant
/// existence does not leak across organizations.
pub(super) async fn require_member(
    repo: &OrganizationRepository<'_>,
    org_id: Uuid,
    auth_user: &AuthUser,
) -> AppResult<()> {
    match repo.member_role(org_id, auth_user.id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Organization not found".to_string())),
    }
}
