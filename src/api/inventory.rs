//! Groups, tags and VM records.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::auth::require;
use super::{
    ApiError, ApiResponse, AppState, CreateNamedRequest, MembersResponse, MessageResponse,
    validation,
};
use crate::domain::{ActionClass, Identity};
use crate::services::NamedRecord;

type RecordList = Json<ApiResponse<Vec<NamedRecord>>>;
type Record = Json<ApiResponse<NamedRecord>>;
type Message = Json<ApiResponse<MessageResponse>>;

// ============================================================================
// Groups
// ============================================================================

pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<RecordList, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;
    Ok(Json(ApiResponse::success(
        state.inventory().list_groups().await?,
    )))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateNamedRequest>,
) -> Result<Record, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;
    let name = validation::validate_name("Group", &payload.name)?;

    let group = state.inventory().create_group(name).await?;
    tracing::info!(group = %group.name, "Group created");
    Ok(Json(ApiResponse::success(group)))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Message, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;

    state.inventory().delete_group(&name).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Group '{name}' deleted"
    )))))
}

pub async fn group_members(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<MembersResponse>>, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;

    let members = state.inventory().group_members(&name).await?;
    Ok(Json(ApiResponse::success(MembersResponse {
        group: name,
        members,
    })))
}

// ============================================================================
// Tags
// ============================================================================

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<RecordList, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;
    Ok(Json(ApiResponse::success(state.inventory().list_tags().await?)))
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateNamedRequest>,
) -> Result<Record, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;
    let name = validation::validate_name("Tag", &payload.name)?;

    let tag = state.inventory().create_tag(name).await?;
    tracing::info!(tag = %tag.name, "Tag created");
    Ok(Json(ApiResponse::success(tag)))
}

pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Message, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;

    state.inventory().delete_tag(&name).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Tag '{name}' deleted"
    )))))
}

// ============================================================================
// VM records
// ============================================================================

pub async fn list_vms(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<RecordList, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;
    Ok(Json(ApiResponse::success(state.inventory().list_vms().await?)))
}

pub async fn create_vm(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateNamedRequest>,
) -> Result<Record, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;
    let name = validation::validate_name("VM", &payload.name)?;

    let vm = state.inventory().create_vm(name).await?;
    tracing::info!(vm = %vm.name, "VM record created");
    Ok(Json(ApiResponse::success(vm)))
}

pub async fn delete_vm(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Message, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;

    state.inventory().delete_vm(&name).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "VM '{name}' deleted"
    )))))
}

pub async fn list_vm_tags(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<RecordList, ApiError> {
    require(&identity, ActionClass::ViewInventory)?;
    Ok(Json(ApiResponse::success(
        state.inventory().vm_tags(&name).await?,
    )))
}

pub async fn tag_vm(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Message, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;

    state.inventory().tag_vm(&name, &tag).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "VM '{name}' tagged '{tag}'"
    )))))
}

pub async fn untag_vm(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Message, ApiError> {
    require(&identity, ActionClass::ManageInventory)?;

    state.inventory().untag_vm(&name, &tag).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Tag '{tag}' removed from VM '{name}'"
    )))))
}
