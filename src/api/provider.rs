use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::require;
use super::{ApiError, ApiResponse, AppState, validation};
use crate::domain::{ActionClass, Identity};
use crate::vault::{CredentialSummary, ProviderCredential};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCredentialRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderCredentialStatus {
    pub configured: bool,
    #[serde(flatten)]
    pub summary: Option<CredentialSummary>,
}

/// GET /provider/azure
///
/// Never includes the client secret.
pub async fn get_azure_credential(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<ProviderCredentialStatus>>, ApiError> {
    require(&identity, ActionClass::ManageCredentials)?;

    let summary = state.vault().summary().await?;
    Ok(Json(ApiResponse::success(ProviderCredentialStatus {
        configured: summary.is_some(),
        summary,
    })))
}

/// PUT /provider/azure
pub async fn save_azure_credential(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SaveCredentialRequest>,
) -> Result<Json<ApiResponse<ProviderCredentialStatus>>, ApiError> {
    require(&identity, ActionClass::ManageCredentials)?;

    let credential = ProviderCredential {
        client_id: validation::validate_required("clientId", &payload.client_id)?.to_string(),
        tenant_id: validation::validate_required("tenantId", &payload.tenant_id)?.to_string(),
        client_secret: validation::validate_required("clientSecret", &payload.client_secret)?
            .to_string(),
    };

    let summary = state.vault().save(&credential).await?;

    tracing::info!(
        client_id = %summary.client_id,
        tenant_id = %summary.tenant_id,
        updated_by = %identity.username,
        "Azure credentials saved"
    );

    Ok(Json(ApiResponse::success(ProviderCredentialStatus {
        configured: true,
        summary: Some(summary),
    })))
}
