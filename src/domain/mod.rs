//! Domain types shared by the services and the HTTP layer.

pub mod permission;

pub use permission::{ActionClass, Permission, can_perform};

use serde::Serialize;
use std::fmt;

/// Unique identifier for a stored user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

/// An authenticated caller, resolved from its session.
///
/// Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub permission: Permission,
}

impl Identity {
    /// Shorthand for running the permission gate against this identity.
    #[must_use]
    pub const fn can(&self, action: ActionClass) -> bool {
        self.permission.allows(action)
    }
}
