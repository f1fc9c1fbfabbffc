use serde::{Deserialize, Serialize};

use crate::clients::CloudVm;
use crate::domain::Permission;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    #[serde(default)]
    pub permission: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub new_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permission: Option<String>,
}

/// Parses an optional permission from a request body.
///
/// Unknown levels are a 400, not a deserialization failure.
pub fn parse_permission(raw: Option<&str>) -> Result<Option<Permission>, ApiError> {
    raw.map(str::parse::<Permission>)
        .transpose()
        .map_err(ApiError::ValidationError)
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateNamedRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub group: String,
    pub members: Vec<String>,
}

// ============================================================================
// Cloud
// ============================================================================

#[derive(Debug, Serialize)]
pub struct VmListResponse {
    pub vms: Vec<CloudVm>,
}
