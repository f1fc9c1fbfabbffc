//! Maps a server-side session to the identity it was issued for.

use std::sync::Arc;
use tower_sessions::Session;

use crate::domain::Identity;
use crate::services::auth_service::{AuthError, AuthService};

/// Session key holding the username.
pub const SESSION_USER_KEY: &str = "user";

#[derive(Clone)]
pub struct IdentityResolver {
    auth: Arc<dyn AuthService>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }

    /// Bind `identity` to the session under a freshly rotated id.
    pub async fn create_session(
        &self,
        session: &Session,
        identity: &Identity,
    ) -> Result<(), AuthError> {
        session.cycle_id().await?;
        session.insert(SESSION_USER_KEY, &identity.username).await?;
        Ok(())
    }

    /// `Unauthenticated` without a session user, `UserNotFound` when the user
    /// has since been deleted or renamed.
    pub async fn resolve(&self, session: &Session) -> Result<Identity, AuthError> {
        let username = session
            .get::<String>(SESSION_USER_KEY)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        self.auth.resolve_identity(&username).await
    }

    pub async fn end_session(&self, session: &Session) -> Result<(), AuthError> {
        session.flush().await?;
        Ok(())
    }
}
