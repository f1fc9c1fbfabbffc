//! Permission levels and the decision table that gates every operation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission level of an identity.
///
/// Levels form a loose hierarchy: `Read < Write < Admin`. Stored as its
/// display string so existing rows stay readable from plain SQL.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Permission {
    #[default]
    #[sea_orm(string_value = "Read")]
    Read,
    #[sea_orm(string_value = "Write")]
    Write,
    #[sea_orm(string_value = "Admin")]
    Admin,
}

impl Permission {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Admin => "Admin",
        }
    }

    /// Returns whether this level may perform `action`.
    #[must_use]
    pub const fn allows(self, action: ActionClass) -> bool {
        match action {
            ActionClass::ListVms | ActionClass::ViewInventory => true,
            ActionClass::VmLifecycle | ActionClass::ManageInventory => {
                matches!(self, Self::Write | Self::Admin)
            }
            ActionClass::ManageCredentials | ActionClass::ManageUsers => {
                matches!(self, Self::Admin)
            }
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Read" | "read" => Ok(Self::Read),
            "Write" | "write" => Ok(Self::Write),
            "Admin" | "admin" => Ok(Self::Admin),
            other => Err(format!(
                "Invalid permission '{other}'. Expected one of: Read, Write, Admin"
            )),
        }
    }
}

/// Operation classes the gate decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// List or view live cloud VMs.
    ListVms,
    /// start / poweroff / deallocate / restart, single or bulk.
    VmLifecycle,
    /// Read or replace the provider credential.
    ManageCredentials,
    /// List users, groups, tags and VM records.
    ViewInventory,
    /// Create or delete groups, tags, VM records and tag assignments.
    ManageInventory,
    /// Create, update and delete users, grant permissions, edit membership.
    ManageUsers,
}

/// The permission gate.
///
/// A missing identity is denied everything.
#[must_use]
pub const fn can_perform(permission: Option<Permission>, action: ActionClass) -> bool {
    match permission {
        Some(level) => level.allows(action),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_allowed_for_every_level() {
        for level in [Permission::Read, Permission::Write, Permission::Admin] {
            assert!(can_perform(Some(level), ActionClass::ListVms));
            assert!(can_perform(Some(level), ActionClass::ViewInventory));
        }
    }

    #[test]
    fn test_lifecycle_requires_write() {
        assert!(!can_perform(Some(Permission::Read), ActionClass::VmLifecycle));
        assert!(can_perform(Some(Permission::Write), ActionClass::VmLifecycle));
        assert!(can_perform(Some(Permission::Admin), ActionClass::VmLifecycle));
    }

    #[test]
    fn test_credentials_and_users_are_admin_only() {
        for action in [ActionClass::ManageCredentials, ActionClass::ManageUsers] {
            assert!(!can_perform(Some(Permission::Read), action));
            assert!(!can_perform(Some(Permission::Write), action));
            assert!(can_perform(Some(Permission::Admin), action));
        }
    }

    #[test]
    fn test_missing_identity_denied() {
        assert!(!can_perform(None, ActionClass::ListVms));
        assert!(!can_perform(None, ActionClass::VmLifecycle));
        assert!(!can_perform(None, ActionClass::ManageCredentials));
    }

    #[test]
    fn test_permission_defaults_to_read() {
        assert_eq!(Permission::default(), Permission::Read);
    }

    #[test]
    fn test_permission_parsing() {
        assert_eq!("Admin".parse::<Permission>(), Ok(Permission::Admin));
        assert_eq!("write".parse::<Permission>(), Ok(Permission::Write));
        assert!("Owner".parse::<Permission>().is_err());
    }
}
