//! Domain service for the local inventory: users, groups, tags and VM records.
//!
//! Permission checks happen at the HTTP boundary; this layer enforces
//! uniqueness and existence.

use serde::Serialize;
use thiserror::Error;

use crate::db::DuplicateRecord;
use crate::domain::Permission;
use crate::entities::{groups, tags, vms};
use crate::services::auth_service::UserInfo;

/// Errors specific to inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for InventoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for InventoryError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<DuplicateRecord>() {
            Ok(duplicate) => Self::Conflict(duplicate.0),
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

/// A group, tag or VM record: just a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRecord {
    pub name: String,
    pub created_at: String,
}

impl From<groups::Model> for NamedRecord {
    fn from(model: groups::Model) -> Self {
        Self {
            name: model.name,
            created_at: model.created_at,
        }
    }
}

impl From<tags::Model> for NamedRecord {
    fn from(model: tags::Model) -> Self {
        Self {
            name: model.name,
            created_at: model.created_at,
        }
    }
}

impl From<vms::Model> for NamedRecord {
    fn from(model: vms::Model) -> Self {
        Self {
            name: model.name,
            created_at: model.created_at,
        }
    }
}

/// Account created by an administrator.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub permission: Option<Permission>,
}

/// Partial account update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub new_username: Option<String>,
    pub email: Option<String>,
    pub permission: Option<Permission>,
}

#[async_trait::async_trait]
pub trait InventoryService: Send + Sync {
    // Users

    async fn list_users(&self) -> Result<Vec<UserInfo>, InventoryError>;

    async fn get_user(&self, username: &str) -> Result<UserInfo, InventoryError>;

    /// Creates an account with any permission (default `Read`).
    async fn create_user(&self, account: NewAccount) -> Result<UserInfo, InventoryError>;

    /// Renames, re-addresses or re-grants a user.
    async fn update_user(
        &self,
        username: &str,
        update: AccountUpdate,
    ) -> Result<UserInfo, InventoryError>;

    /// Deletes a user along with its group memberships.
    async fn delete_user(&self, username: &str) -> Result<(), InventoryError>;

    async fn user_groups(&self, username: &str) -> Result<Vec<NamedRecord>, InventoryError>;

    /// Idempotent: adding an existing member succeeds.
    async fn add_user_to_group(&self, username: &str, group: &str) -> Result<(), InventoryError>;

    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), InventoryError>;

    // Groups

    async fn list_groups(&self) -> Result<Vec<NamedRecord>, InventoryError>;

    async fn create_group(&self, name: &str) -> Result<NamedRecord, InventoryError>;

    async fn delete_group(&self, name: &str) -> Result<(), InventoryError>;

    async fn group_members(&self, name: &str) -> Result<Vec<String>, InventoryError>;

    // Tags

    async fn list_tags(&self) -> Result<Vec<NamedRecord>, InventoryError>;

    async fn create_tag(&self, name: &str) -> Result<NamedRecord, InventoryError>;

    async fn delete_tag(&self, name: &str) -> Result<(), InventoryError>;

    // VM records

    async fn list_vms(&self) -> Result<Vec<NamedRecord>, InventoryError>;

    async fn create_vm(&self, name: &str) -> Result<NamedRecord, InventoryError>;

    async fn delete_vm(&self, name: &str) -> Result<(), InventoryError>;

    async fn vm_tags(&self, vm: &str) -> Result<Vec<NamedRecord>, InventoryError>;

    /// Idempotent: re-tagging succeeds.
    async fn tag_vm(&self, vm: &str, tag: &str) -> Result<(), InventoryError>;

    async fn untag_vm(&self, vm: &str, tag: &str) -> Result<(), InventoryError>;
}
