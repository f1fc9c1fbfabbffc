use axum::{Extension, Json, body::Bytes, extract::State};
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, VmListResponse};
use crate::domain::{ActionClass, Identity};
use crate::services::{DispatchError, VmActionRequest, VmActionResult, VmTarget, authorize};
use crate::vault::VaultError;

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Forbidden(msg) => Self::Forbidden(msg),
            DispatchError::InvalidInput(msg) => Self::ValidationError(msg),
            DispatchError::CredentialsMissing(msg) => Self::CredentialsMissing(msg),
            DispatchError::Provider(msg) => Self::azure_error(msg),
            DispatchError::Timeout(after) => Self::Timeout(format!(
                "Azure operation timed out after {}s",
                after.as_secs()
            )),
            DispatchError::Vault(e) => Self::from(e),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        Self::InternalError(format!("Credential vault: {err}"))
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkActionRequest {
    #[serde(default)]
    pub vms: Vec<VmTarget>,
    #[serde(default)]
    pub action: Option<String>,
}

/// GET /azure/vms
pub async fn list_vms(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<VmListResponse>>, ApiError> {
    let vms = state.dispatcher().list_vms(&identity).await?;
    Ok(Json(ApiResponse::success(VmListResponse { vms })))
}

/// Decodes a lifecycle body only after the caller passed the gate, so a
/// Read identity is refused no matter what it sent.
fn gated_body<T: DeserializeOwned>(identity: &Identity, body: &[u8]) -> Result<T, ApiError> {
    authorize(identity, ActionClass::VmLifecycle)?;

    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))
}

/// POST /azure/vm/action
pub async fn vm_action(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<ApiResponse<VmActionResult>>, ApiError> {
    let payload: VmActionRequest = gated_body(&identity, &body)?;
    let result = state.dispatcher().act(&identity, payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// POST /azure/vms/bulk_action
pub async fn bulk_action(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<ApiResponse<Vec<VmActionResult>>>, ApiError> {
    let payload: BulkActionRequest = gated_body(&identity, &body)?;
    let results = state
        .dispatcher()
        .bulk_act(&identity, payload.vms, payload.action.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(results)))
}
