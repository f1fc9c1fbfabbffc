//! `SeaORM` implementation of the `InventoryService` trait.

use crate::config::SecurityConfig;
use crate::db::{NewUser, Store, User, UserChanges};
use crate::entities::{groups, tags, vms};
use crate::services::auth_service::UserInfo;
use crate::services::inventory_service::{
    AccountUpdate, InventoryError, InventoryService, NamedRecord, NewAccount,
};
use async_trait::async_trait;
use tracing::info;

pub struct SeaOrmInventoryService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmInventoryService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    async fn require_user(&self, username: &str) -> Result<User, InventoryError> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("User '{username}'")))
    }

    async fn require_group(&self, name: &str) -> Result<groups::Model, InventoryError> {
        self.store
            .get_group(name)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("Group '{name}'")))
    }

    async fn require_tag(&self, name: &str) -> Result<tags::Model, InventoryError> {
        self.store
            .get_tag(name)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("Tag '{name}'")))
    }

    async fn require_vm(&self, name: &str) -> Result<vms::Model, InventoryError> {
        self.store
            .get_vm(name)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("VM '{name}'")))
    }

    async fn ensure_email_free(
        &self,
        email: &str,
        owner: Option<i32>,
    ) -> Result<(), InventoryError> {
        match self.store.get_user_by_email(email).await? {
            Some(existing) if Some(existing.id) != owner => Err(InventoryError::Conflict(
                "Email already registered".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl InventoryService for SeaOrmInventoryService {
    async fn list_users(&self) -> Result<Vec<UserInfo>, InventoryError> {
        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(UserInfo::from).collect())
    }

    async fn get_user(&self, username: &str) -> Result<UserInfo, InventoryError> {
        Ok(UserInfo::from(self.require_user(username).await?))
    }

    async fn create_user(&self, account: NewAccount) -> Result<UserInfo, InventoryError> {
        if self
            .store
            .get_user_by_username(&account.username)
            .await?
            .is_some()
        {
            return Err(InventoryError::Conflict(
                "Username already exists".to_string(),
            ));
        }

        if let Some(email) = account.email.as_deref() {
            self.ensure_email_free(email, None).await?;
        }

        let user = self
            .store
            .create_user(
                NewUser {
                    username: account.username,
                    email: account.email,
                    password: account.password,
                    permission: account.permission.unwrap_or_default(),
                },
                &self.security,
            )
            .await?;

        info!(username = %user.username, permission = %user.permission, "User created");

        Ok(UserInfo::from(user))
    }

    async fn update_user(
        &self,
        username: &str,
        update: AccountUpdate,
    ) -> Result<UserInfo, InventoryError> {
        let current = self.require_user(username).await?;

        let new_username = update.new_username.filter(|name| name != username);
        if let Some(name) = new_username.as_deref()
            && self.store.get_user_by_username(name).await?.is_some()
        {
            return Err(InventoryError::Conflict(
                "Username already exists".to_string(),
            ));
        }

        if let Some(email) = update.email.as_deref() {
            self.ensure_email_free(email, Some(current.id)).await?;
        }

        let updated = self
            .store
            .update_user(
                username,
                UserChanges {
                    username: new_username,
                    email: update.email,
                    permission: update.permission,
                },
            )
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("User '{username}'")))?;

        info!(
            username = %username,
            new_username = %updated.username,
            permission = %updated.permission,
            "User updated"
        );

        Ok(UserInfo::from(updated))
    }

    async fn delete_user(&self, username: &str) -> Result<(), InventoryError> {
        if !self.store.delete_user(username).await? {
            return Err(InventoryError::NotFound(format!("User '{username}'")));
        }

        info!(username = %username, "User deleted");
        Ok(())
    }

    async fn user_groups(&self, username: &str) -> Result<Vec<NamedRecord>, InventoryError> {
        let user = self.require_user(username).await?;
        let groups = self.store.groups_for_user(user.id).await?;
        Ok(groups.into_iter().map(NamedRecord::from).collect())
    }

    async fn add_user_to_group(&self, username: &str, group: &str) -> Result<(), InventoryError> {
        let user = self.require_user(username).await?;
        let group = self.require_group(group).await?;

        self.store.add_group_member(user.id, group.id).await?;
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), InventoryError> {
        let user = self.require_user(username).await?;
        let group_model = self.require_group(group).await?;

        if !self
            .store
            .remove_group_member(user.id, group_model.id)
            .await?
        {
            return Err(InventoryError::NotFound(format!(
                "Membership of '{username}' in '{group}'"
            )));
        }
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<NamedRecord>, InventoryError> {
        let groups = self.store.list_groups().await?;
        Ok(groups.into_iter().map(NamedRecord::from).collect())
    }

    async fn create_group(&self, name: &str) -> Result<NamedRecord, InventoryError> {
        if self.store.get_group(name).await?.is_some() {
            return Err(InventoryError::Conflict(format!(
                "Group '{name}' already exists"
            )));
        }
        Ok(NamedRecord::from(self.store.create_group(name).await?))
    }

    async fn delete_group(&self, name: &str) -> Result<(), InventoryError> {
        if !self.store.delete_group(name).await? {
            return Err(InventoryError::NotFound(format!("Group '{name}'")));
        }
        Ok(())
    }

    async fn group_members(&self, name: &str) -> Result<Vec<String>, InventoryError> {
        let group = self.require_group(name).await?;
        let members = self.store.group_members(group.id).await?;
        Ok(members.into_iter().map(|m| m.username).collect())
    }

    async fn list_tags(&self) -> Result<Vec<NamedRecord>, InventoryError> {
        let tags = self.store.list_tags().await?;
        Ok(tags.into_iter().map(NamedRecord::from).collect())
    }

    async fn create_tag(&self, name: &str) -> Result<NamedRecord, InventoryError> {
        if self.store.get_tag(name).await?.is_some() {
            return Err(InventoryError::Conflict(format!(
                "Tag '{name}' already exists"
            )));
        }
        Ok(NamedRecord::from(self.store.create_tag(name).await?))
    }

    async fn delete_tag(&self, name: &str) -> Result<(), InventoryError> {
        if !self.store.delete_tag(name).await? {
            return Err(InventoryError::NotFound(format!("Tag '{name}'")));
        }
        Ok(())
    }

    async fn list_vms(&self) -> Result<Vec<NamedRecord>, InventoryError> {
        let vms = self.store.list_vms().await?;
        Ok(vms.into_iter().map(NamedRecord::from).collect())
    }

    async fn create_vm(&self, name: &str) -> Result<NamedRecord, InventoryError> {
        if self.store.get_vm(name).await?.is_some() {
            return Err(InventoryError::Conflict(format!(
                "VM '{name}' already exists"
            )));
        }
        Ok(NamedRecord::from(self.store.create_vm(name).await?))
    }

    async fn delete_vm(&self, name: &str) -> Result<(), InventoryError> {
        if !self.store.delete_vm(name).await? {
            return Err(InventoryError::NotFound(format!("VM '{name}'")));
        }
        Ok(())
    }

    async fn vm_tags(&self, vm: &str) -> Result<Vec<NamedRecord>, InventoryError> {
        let vm = self.require_vm(vm).await?;
        let tags = self.store.tags_for_vm(vm.id).await?;
        Ok(tags.into_iter().map(NamedRecord::from).collect())
    }

    async fn tag_vm(&self, vm: &str, tag: &str) -> Result<(), InventoryError> {
        let vm = self.require_vm(vm).await?;
        let tag = self.require_tag(tag).await?;

        self.store.tag_vm(vm.id, tag.id).await?;
        Ok(())
    }

    async fn untag_vm(&self, vm: &str, tag: &str) -> Result<(), InventoryError> {
        let vm_model = self.require_vm(vm).await?;
        let tag_model = self.require_tag(tag).await?;

        if !self.store.untag_vm(vm_model.id, tag_model.id).await? {
            return Err(InventoryError::NotFound(format!(
                "Tag '{tag}' on VM '{vm}'"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Permission;

    async fn service() -> SeaOrmInventoryService {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        SeaOrmInventoryService::new(
            store,
            SecurityConfig {
                argon2_memory_cost_kib: 1024,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
            },
        )
    }

    fn account(username: &str, permission: Option<Permission>) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: Some(format!("{username}@x.com")),
            password: "pw".to_string(),
            permission,
        }
    }

    #[tokio::test]
    async fn test_create_user_defaults_to_read() {
        let inventory = service().await;
        let user = inventory.create_user(account("dave", None)).await.unwrap();
        assert_eq!(user.permission, Permission::Read);

        let admin = inventory
            .create_user(account("erin", Some(Permission::Admin)))
            .await
            .unwrap();
        assert_eq!(admin.permission, Permission::Admin);

        let names: Vec<String> = inventory
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["dave", "erin"]);
    }

    #[tokio::test]
    async fn test_update_user_rename_conflict() {
        let inventory = service().await;
        inventory.create_user(account("frank", None)).await.unwrap();
        inventory.create_user(account("grace", None)).await.unwrap();

        let clash = inventory
            .update_user(
                "frank",
                AccountUpdate {
                    new_username: Some("grace".to_string()),
                    ..AccountUpdate::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(InventoryError::Conflict(_))));

        let updated = inventory
            .update_user(
                "frank",
                AccountUpdate {
                    new_username: Some("frankie".to_string()),
                    email: Some("frank@x.com".to_string()),
                    permission: Some(Permission::Write),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "frankie");
        assert_eq!(updated.permission, Permission::Write);

        assert!(matches!(
            inventory.get_user("frank").await,
            Err(InventoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_violation_on_insert_is_conflict() {
        let inventory = service().await;
        let security = inventory.security.clone();

        // Insert straight through the store, as a request that lost the
        // check-then-insert race would.
        inventory.store.create_group("ops").await.unwrap();
        let err = InventoryError::from(inventory.store.create_group("ops").await.unwrap_err());
        match err {
            InventoryError::Conflict(msg) => assert_eq!(msg, "Group 'ops' already exists"),
            other => panic!("unexpected error: {other}"),
        }

        let new_user = |username: &str, email: &str| NewUser {
            username: username.to_string(),
            email: Some(email.to_string()),
            password: "pw".to_string(),
            permission: Permission::Read,
        };

        inventory
            .store
            .create_user(new_user("ivan", "ivan@x.com"), &security)
            .await
            .unwrap();

        let same_name = inventory
            .store
            .create_user(new_user("ivan", "other@x.com"), &security)
            .await
            .unwrap_err();
        assert!(matches!(
            InventoryError::from(same_name),
            InventoryError::Conflict(msg) if msg == "Username already exists"
        ));

        let same_email = inventory
            .store
            .create_user(new_user("judy", "ivan@x.com"), &security)
            .await
            .unwrap_err();
        assert!(matches!(
            InventoryError::from(same_email),
            InventoryError::Conflict(msg) if msg == "Email already registered"
        ));
    }

    #[tokio::test]
    async fn test_membership_lifecycle() {
        let inventory = service().await;
        inventory.create_user(account("heidi", None)).await.unwrap();
        inventory.create_group("ops").await.unwrap();

        inventory.add_user_to_group("heidi", "ops").await.unwrap();
        inventory.add_user_to_group("heidi", "ops").await.unwrap();
        assert_eq!(inventory.group_members("ops").await.unwrap(), vec!["heidi"]);

        inventory
            .remove_user_from_group("heidi", "ops")
            .await
            .unwrap();
        assert!(matches!(
            inventory.remove_user_from_group("heidi", "ops").await,
            Err(InventoryError::NotFound(_))
        ));
        assert!(matches!(
            inventory.add_user_to_group("heidi", "missing").await,
            Err(InventoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_named_records_conflict_and_delete() {
        let inventory = service().await;
        inventory.create_tag("prod").await.unwrap();
        assert!(matches!(
            inventory.create_tag("prod").await,
            Err(InventoryError::Conflict(_))
        ));

        inventory.create_vm("web-01").await.unwrap();
        inventory.tag_vm("web-01", "prod").await.unwrap();
        assert_eq!(inventory.vm_tags("web-01").await.unwrap().len(), 1);

        inventory.delete_vm("web-01").await.unwrap();
        assert!(matches!(
            inventory.delete_vm("web-01").await,
            Err(InventoryError::NotFound(_))
        ));
    }
}
