//! Domain service for authentication and self-service account operations.
//!
//! Handles login, registration, identity lookup and password changes.

use serde::Serialize;
use thiserror::Error;

use crate::db::{DuplicateRecord, User};
use crate::domain::{Identity, Permission};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<DuplicateRecord>() {
            Ok(duplicate) => Self::Conflict(duplicate.0),
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<tower_sessions::session::Error> for AuthError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::SessionError(err.to_string())
    }
}

/// User info DTO for responses. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub email: Option<String>,
    pub permission: Permission,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            permission: user.permission,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Self-service sign-up. Only `Read` may be requested.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub permission: Option<Permission>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and returns the identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails.
    async fn login(&self, username: &str, password: &str) -> Result<Identity, AuthError>;

    /// Creates a `Read` account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if a higher permission is requested and
    /// [`AuthError::Conflict`] if the username or email is taken.
    async fn register(&self, registration: Registration) -> Result<UserInfo, AuthError>;

    /// Looks up the identity a session points at.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UserNotFound`] when the account no longer exists.
    async fn resolve_identity(&self, username: &str) -> Result<Identity, AuthError>;

    /// Gets information for a specific user.
    async fn get_user_info(&self, username: &str) -> Result<UserInfo, AuthError>;

    /// Changes a user's password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if current password is incorrect or new password invalid.
    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}
