use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::require;
use super::{
    ApiError, ApiResponse, AppState, CreateUserRequest, MessageResponse, UpdateUserRequest,
    parse_permission, validation,
};
use crate::domain::{ActionClass, Identity};
use crate::services::{AccountUpdate, InventoryError, NamedRecord, NewAccount, UserInfo};

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            InventoryError::Conflict(msg) => Self::Conflict(msg),
            InventoryError::Validation(msg) => Self::ValidationError(msg),
            InventoryError::Database(msg) => Self::DatabaseError(msg),
            InventoryError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<UserInfo>>>, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;

    let users = state.inventory().list_users().await?;
    Ok(Json(ApiResponse::success(users)))
}

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require(&identity, ActionClass::ManageUsers)?;

    let username = validation::validate_username(&payload.username)?.to_string();
    let email = validation::validate_email(payload.email.as_deref())?;
    validation::validate_password(&payload.password)?;
    let permission = parse_permission(payload.permission.as_deref())?;

    let user = state
        .inventory()
        .create_user(NewAccount {
            username,
            email,
            password: payload.password,
            permission,
        })
        .await?;

    tracing::info!(
        username = %user.username,
        permission = %user.permission,
        created_by = %identity.username,
        "User created"
    );
    Ok(Json(ApiResponse::success(user)))
}

/// GET /users/{username}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;

    let user = state.inventory().get_user(&username).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PUT /users/{username}
///
/// Renaming the caller's own account re-binds the session to the new name.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    session: Session,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require(&identity, ActionClass::ManageUsers)?;

    let new_username = payload
        .new_username
        .as_deref()
        .map(validation::validate_username)
        .transpose()?
        .map(ToString::to_string);
    let email = validation::validate_email(payload.email.as_deref())?;
    let permission = parse_permission(payload.permission.as_deref())?;

    let user = state
        .inventory()
        .update_user(
            &username,
            AccountUpdate {
                new_username,
                email,
                permission,
            },
        )
        .await?;

    if username == identity.username && user.username != identity.username {
        let renamed = state.auth_service().resolve_identity(&user.username).await?;
        state.identity().create_session(&session, &renamed).await?;
    }

    tracing::info!(username = %user.username, updated_by = %identity.username, "User updated");
    Ok(Json(ApiResponse::success(user)))
}

/// DELETE /users/{username}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require(&identity, ActionClass::ManageUsers)?;

    state.inventory().delete_user(&username).await?;

    tracing::info!(%username, deleted_by = %identity.username, "User deleted");
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "User '{username}' deleted"
    )))))
}

/// GET /users/{username}/groups
pub async fn list_user_groups(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<Vec<NamedRecord>>>, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;

    let groups = state.inventory().user_groups(&username).await?;
    Ok(Json(ApiResponse::success(groups)))
}

/// PUT /users/{username}/groups/{group}
pub async fn add_to_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((username, group)): Path<(String, String)>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require(&identity, ActionClass::ManageUsers)?;

    state.inventory().add_user_to_group(&username, &group).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "User '{username}' added to group '{group}'"
    )))))
}

/// DELETE /users/{username}/groups/{group}
pub async fn remove_from_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((username, group)): Path<(String, String)>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require(&identity, ActionClass::ManageUsers)?;

    state
        .inventory()
        .remove_user_from_group(&username, &group)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "User '{username}' removed from group '{group}'"
    )))))
}
