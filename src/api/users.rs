use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, ReferenceItemDto};
use crate::services::{IdentityInfo, IssuedResetToken};
use crate::validation::IdentityAttributes;

/// POST /users
/// Provision an identity. Without a password the initial one is derived.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IdentityAttributes>,
) -> Result<(StatusCode, Json<ApiResponse<IdentityInfo>>), ApiError> {
    let identity = state.identity_service.create_identity(payload).await?;
    let info = state.identity_service.describe(&identity).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(info))))
}

/// GET /users/{id}
/// Active identities only
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<IdentityInfo>>, ApiError> {
    let identity = state
        .identity_service
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Identity", id))?;

    let info = state.identity_service.describe(&identity).await?;
    Ok(Json(ApiResponse::success(info)))
}

/// PUT /users/{id}
/// Update profile, role and status. Any `password` field is ignored.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<IdentityAttributes>,
) -> Result<Json<ApiResponse<IdentityInfo>>, ApiError> {
    let identity = state.identity_service.update_identity(id, payload).await?;
    let info = state.identity_service.describe(&identity).await?;

    Ok(Json(ApiResponse::success(info)))
}

/// POST /users/{id}/password-reset
/// Issue a password reset token for an active identity
pub async fn issue_password_reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<IssuedResetToken>>, ApiError> {
    let issued = state
        .identity_service
        .generate_password_reset_token(id)
        .await?;

    Ok(Json(ApiResponse::success(issued)))
}

/// GET /roles
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ReferenceItemDto>>>, ApiError> {
    let roles = state.identity_service.role_list().await?;
    Ok(Json(ApiResponse::success(ReferenceItemDto::from_map(roles))))
}

/// GET /statuses
pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ReferenceItemDto>>>, ApiError> {
    let statuses = state.identity_service.status_list().await?;
    Ok(Json(ApiResponse::success(ReferenceItemDto::from_map(
        statuses,
    ))))
}
