//! Organization address API endpoints
//!
//! Nested under /organizations/{id}/addresses. Listing requires membership;
//! creation goes through the member-gated database function; updates and
//! deletes additionally require an admin role.

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
    db::{address_repository::AddressRepository, organization_repository::OrganizationRepository},
    middleware::AuthUser,
    models::{Address, CreateAddressRequest, OrgRole, UpdateAddressRequest},
    utils::{AppError, AppResult},
    AppState,
};

use super::organizations::require_member;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{id}/addresses", get(list_addresses).post(create_address))
        .route(
            "/{id}/addresses/{address_id}",
            get(get_address).put(update_address).delete(delete_address),
        )
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn list_addresses(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<Address>>> {
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    require_member(&org_repo, org_id, &auth_user).await?;

    let repo = AddressRepository::new(&state.db, &state.functions);
    let addresses = repo.list(org_id).await?;

    Ok(Json(addresses))
}

async fn get_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((org_id, address_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Address>> {
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    require_member(&org_repo, org_id, &auth_user).await?;

    let repo = AddressRepository::new(&state.db, &state.functions);
    let address = repo
        .get_by_id(org_id, address_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Address not found".to_string()))?;

    Ok(Json(address))
}

async fn create_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateAddressRequest>,
) -> AppResult<(StatusCode, Json<Address>)> {
    payload.validate()?;

    // Membership is re-checked inside the privileged function; the early
    // check keeps the not-found masking consistent with the read endpoints.
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    require_member(&org_repo, org_id, &auth_user).await?;

    let repo = AddressRepository::new(&state.db, &state.functions);
    let address = repo.create(org_id, auth_user.id, &payload).await?;

    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((org_id, address_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateAddressRequest>,
) -> AppResult<Json<Address>> {
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    require_admin(&org_repo, org_id, &auth_user).await?;

    let repo = AddressRepository::new(&state.db, &state.functions);
    let address = repo
        .update(org_id, address_id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Address not found".to_string()))?;

    Ok(Json(address))
}

async fn delete_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((org_id, address_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<DeleteResponse>> {
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    require_admin(&org_repo, org_id, &auth_user).await?;

    let repo = AddressRepository::new(&state.db, &state.functions);
    let deleted = repo.delete(org_id, address_id).await?;

    Ok(Json(DeleteResponse { deleted }))
}

/// Admin gate for address mutations
async fn require_admin(
    repo: &OrganizationRepository<'_>,
    org_id: Uuid,
    auth_user: &AuthUser,
) -> AppResult<()> {
    match repo.member_role(org_id, auth_user.id).await? {
        Some(OrgRole::Admin) => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "User is not an admin of this organization".to_string(),
        )),
        None => Err(AppError::NotFound("Organization not found".to_string())),
    }
}
