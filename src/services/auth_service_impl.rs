//! `SeaORM` implementation of the `AuthService` trait.

use crate::config::SecurityConfig;
use crate::db::{NewUser, Store};
use crate::domain::{Identity, Permission};
use crate::services::auth_service::{AuthError, AuthService, Registration, UserInfo};
use async_trait::async_trait;

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let is_valid = self
            .store
            .verify_user_password(username, password)
            .await?;

        if !is_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(Identity::from(user))
    }

    async fn register(&self, registration: Registration) -> Result<UserInfo, AuthError> {
        let permission = registration.permission.unwrap_or_default();
        if permission != Permission::Read {
            return Err(AuthError::Forbidden(format!(
                "Self-registration cannot request {permission} permission"
            )));
        }

        if self
            .store
            .get_user_by_username(&registration.username)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("Username already exists".to_string()));
        }

        if let Some(email) = registration.email.as_deref()
            && self.store.get_user_by_email(email).await?.is_some()
        {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }

        let user = self
            .store
            .create_user(
                NewUser {
                    username: registration.username,
                    email: registration.email,
                    password: registration.password,
                    permission,
                },
                &self.security,
            )
            .await?;

        tracing::info!(username = %user.username, "User registered");

        Ok(UserInfo::from(user))
    }

    async fn resolve_identity(&self, username: &str) -> Result<Identity, AuthError> {
        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Identity::from(user))
    }

    async fn get_user_info(&self, username: &str) -> Result<UserInfo, AuthError> {
        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(UserInfo::from(user))
    }

    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation(
                "New password must be at least 8 characters".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let is_valid = self
            .store
            .verify_user_password(username, current_password)
            .await?;

        if !is_valid {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        self.store
            .update_user_password(username, new_password, &self.security)
            .await?;

        tracing::info!("Password changed for user: {username}");

        Ok(())
    }
}
