use axum::{
    Extension, Json,
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, MessageResponse, parse_permission, validation};
use crate::domain::{ActionClass, Identity};
use crate::services::{AuthError, Registration, UserInfo};

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_string()),
            AuthError::Unauthenticated => Self::Unauthorized("Not authenticated".to_string()),
            AuthError::UserNotFound => Self::NotFound("User not found".to_string()),
            AuthError::Forbidden(msg) => Self::Forbidden(msg),
            AuthError::Conflict(msg) => Self::Conflict(msg),
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::SessionError(msg) | AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub permission: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the session to an [`Identity`] and stores it as a request
/// extension for the handlers behind it.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state.identity().resolve(&session).await?;

    tracing::Span::current().record("user_id", identity.username.as_str());
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Runs the permission gate for a handler.
pub fn require(identity: &Identity, action: ActionClass) -> Result<(), ApiError> {
    if identity.can(action) {
        return Ok(());
    }

    tracing::warn!(
        username = %identity.username,
        permission = %identity.permission,
        ?action,
        "Permission denied"
    );
    Err(ApiError::forbidden("Permission denied"))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let username = validation::validate_required("Username", &payload.username)?;
    validation::validate_password(&payload.password)?;

    let identity = state.auth_service().login(username, &payload.password).await?;
    state.identity().create_session(&session, &identity).await?;

    let info = state.auth_service().get_user_info(&identity.username).await?;

    tracing::info!(username = %identity.username, "User logged in");
    Ok(Json(ApiResponse::success(info)))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.identity().end_session(&session).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new("Logged out"))))
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let username = validation::validate_username(&payload.username)?.to_string();
    let email = validation::validate_email(payload.email.as_deref())?;
    validation::validate_password(&payload.password)?;
    let permission = parse_permission(payload.permission.as_deref())?;

    let info = state
        .auth_service()
        .register(Registration {
            username,
            email,
            password: payload.password,
            permission,
        })
        .await?;

    Ok(Json(ApiResponse::success(info)))
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let info = state.auth_service().get_user_info(&identity.username).await?;
    Ok(Json(ApiResponse::success(info)))
}

/// PUT /auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service()
        .change_password(
            &identity.username,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}
