//! Audit log API endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::{audit_repository::AuditRepository, organization_repository::OrganizationRepository},
    middleware::AuthUser,
    models::{AuditLogEntry, AuditLogQuery},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

/// List audit log entries. Restricted to users holding an admin role in at
/// least one organization, mirroring the trail's view policy.
async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<Vec<AuditLogEntry>>> {
    let org_repo = OrganizationRepository::new(&state.db, &state.functions);
    if !org_repo.is_admin_anywhere(auth_user.id).await? {
        return Err(AppError::Forbidden(
            "Not allowed to view audit logs".to_string(),
        ));
    }

    let repo = AuditRepository::new(&state.db);
    let logs = repo.list(&query).await?;

    Ok(Json(logs))
}
