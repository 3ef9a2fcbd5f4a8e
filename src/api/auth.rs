use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::identity::Identity;
use crate::services::IdentityInfo;

const SESSION_KEY: &str = "identity_id";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub id: i32,
    pub email: String,
    pub auth_key: String,
}

#[derive(Deserialize)]
pub struct ConfirmResetRequest {
    pub token: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthKeyResponse {
    pub auth_key: String,
}

/// Identity the request was authenticated as.
#[derive(Clone)]
pub struct CurrentIdentity(pub Identity);

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware that checks:
/// 1. Session cookie (from login), resolved to an active identity
/// 2. `X-Api-Key` header
/// 3. `Authorization: Bearer <auth_key>` header
///
/// Keys are matched against any identity regardless of status.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(id)) = session.get::<i32>(SESSION_KEY).await
        && let Some(identity) = state.identity_service.find_by_id(id).await?
    {
        tracing::Span::current().record("user_id", identity.id);
        request.extensions_mut().insert(CurrentIdentity(identity));
        return Ok(next.run(request).await);
    }

    if let Some(key) = extract_auth_key(&headers)
        && let Some(identity) = state.identity_service.find_by_access_token(&key).await?
    {
        tracing::Span::current().record("user_id", identity.id);
        request.extensions_mut().insert(CurrentIdentity(identity));
        return Ok(next.run(request).await);
    }

    Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response())
}

/// Runs inside [`auth_middleware`]. Only active identities holding the
/// configured admin role get through.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let identity_config = &state.config.identity;
    let is_admin = request
        .extensions()
        .get::<CurrentIdentity>()
        .is_some_and(|CurrentIdentity(identity)| {
            identity.role_id == identity_config.admin_role
                && identity.is_active(identity_config.active_status)
        });

    if !is_admin {
        return Err(ApiError::Forbidden(
            "Administrator role required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

fn extract_auth_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("X-Api-Key")
        && let Ok(key_str) = key.to_str()
    {
        return Some(key_str.to_string());
    }

    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with email and password, returns a fresh auth key on success
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let result = state
        .identity_service
        .login(&payload.email, &payload.password)
        .await?;

    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(SESSION_KEY, result.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    Ok(Json(ApiResponse::success(LoginResponse {
        id: result.id,
        email: result.email,
        auth_key: result.auth_key,
    })))
}

/// POST /auth/logout
pub async fn logout(session: Session) -> impl IntoResponse {
    if let Err(e) = session.flush().await {
        tracing::warn!(error = %e, "Failed to flush session on logout");
    }
    (StatusCode::OK, "Logged out")
}

/// GET /auth/me
pub async fn get_current_identity(
    State(state): State<Arc<AppState>>,
    Extension(CurrentIdentity(identity)): Extension<CurrentIdentity>,
) -> Result<Json<ApiResponse<IdentityInfo>>, ApiError> {
    let info = state.identity_service.describe(&identity).await?;
    Ok(Json(ApiResponse::success(info)))
}

/// POST /auth/password-reset/confirm
/// Set a new password with a reset token; the token is consumed
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmResetRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .identity_service
        .reset_password(&payload.token, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

/// POST /auth/auth-key/regenerate
pub async fn regenerate_auth_key(
    State(state): State<Arc<AppState>>,
    Extension(CurrentIdentity(identity)): Extension<CurrentIdentity>,
) -> Result<Json<ApiResponse<AuthKeyResponse>>, ApiError> {
    let auth_key = state
        .identity_service
        .regenerate_auth_key(identity.id)
        .await?;

    Ok(Json(ApiResponse::success(AuthKeyResponse { auth_key })))
}
