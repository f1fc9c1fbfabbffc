use crate::config::{BootstrapConfig, SecurityConfig};
use crate::domain::Permission;
use crate::entities::{groups, tags, users, vms};
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::DuplicateRecord;
pub use repositories::user::{NewUser, User, UserChanges};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if db_url.starts_with("sqlite:") && !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn group_repo(&self) -> repositories::group::GroupRepository {
        repositories::group::GroupRepository::new(self.conn.clone())
    }

    fn tag_repo(&self) -> repositories::tag::TagRepository {
        repositories::tag::TagRepository::new(self.conn.clone())
    }

    fn vm_repo(&self) -> repositories::vm::VmRepository {
        repositories::vm::VmRepository::new(self.conn.clone())
    }

    /// Make sure the configured bootstrap admin exists and holds `Admin`.
    ///
    /// An existing account keeps its password; only the permission is
    /// restored if it was downgraded.
    pub async fn ensure_admin(
        &self,
        bootstrap: &BootstrapConfig,
        security: &SecurityConfig,
    ) -> Result<()> {
        if bootstrap.admin_username.is_empty() {
            return Ok(());
        }

        match self.get_user_by_username(&bootstrap.admin_username).await? {
            Some(user) if user.permission == Permission::Admin => {}
            Some(user) => {
                self.update_user(
                    &user.username,
                    UserChanges {
                        permission: Some(Permission::Admin),
                        ..UserChanges::default()
                    },
                )
                .await?;
                info!("Restored Admin permission for '{}'", user.username);
            }
            None => {
                self.create_user(
                    NewUser {
                        username: bootstrap.admin_username.clone(),
                        email: bootstrap.admin_email.clone(),
                        password: bootstrap.admin_password.clone(),
                        permission: Permission::Admin,
                    },
                    security,
                )
                .await?;
                info!("Created bootstrap admin '{}'", bootstrap.admin_username);
            }
        }

        Ok(())
    }

    // ========== User Repository Methods ==========

    pub async fn create_user(&self, new_user: NewUser, security: &SecurityConfig) -> Result<User> {
        self.user_repo().create(new_user, security).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, security)
            .await
    }

    pub async fn update_user(&self, username: &str, changes: UserChanges) -> Result<Option<User>> {
        self.user_repo().update(username, changes).await
    }

    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        self.user_repo().delete(username).await
    }

    // ========== Group Repository Methods ==========

    pub async fn create_group(&self, name: &str) -> Result<groups::Model> {
        self.group_repo().create(name).await
    }

    pub async fn list_groups(&self) -> Result<Vec<groups::Model>> {
        self.group_repo().list().await
    }

    pub async fn get_group(&self, name: &str) -> Result<Option<groups::Model>> {
        self.group_repo().get_by_name(name).await
    }

    pub async fn delete_group(&self, name: &str) -> Result<bool> {
        self.group_repo().delete(name).await
    }

    pub async fn add_group_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        self.group_repo().add_member(user_id, group_id).await
    }

    pub async fn remove_group_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        self.group_repo().remove_member(user_id, group_id).await
    }

    pub async fn groups_for_user(&self, user_id: i32) -> Result<Vec<groups::Model>> {
        self.group_repo().groups_for_user(user_id).await
    }

    pub async fn group_members(&self, group_id: i32) -> Result<Vec<users::Model>> {
        self.group_repo().members(group_id).await
    }

    // ========== Tag Repository Methods ==========

    pub async fn create_tag(&self, name: &str) -> Result<tags::Model> {
        self.tag_repo().create(name).await
    }

    pub async fn list_tags(&self) -> Result<Vec<tags::Model>> {
        self.tag_repo().list().await
    }

    pub async fn get_tag(&self, name: &str) -> Result<Option<tags::Model>> {
        self.tag_repo().get_by_name(name).await
    }

    pub async fn delete_tag(&self, name: &str) -> Result<bool> {
        self.tag_repo().delete(name).await
    }

    // ========== VM Record Repository Methods ==========

    pub async fn create_vm(&self, name: &str) -> Result<vms::Model> {
        self.vm_repo().create(name).await
    }

    pub async fn list_vms(&self) -> Result<Vec<vms::Model>> {
        self.vm_repo().list().await
    }

    pub async fn get_vm(&self, name: &str) -> Result<Option<vms::Model>> {
        self.vm_repo().get_by_name(name).await
    }

    pub async fn delete_vm(&self, name: &str) -> Result<bool> {
        self.vm_repo().delete(name).await
    }

    pub async fn tag_vm(&self, vm_id: i32, tag_id: i32) -> Result<bool> {
        self.vm_repo().add_tag(vm_id, tag_id).await
    }

    pub async fn untag_vm(&self, vm_id: i32, tag_id: i32) -> Result<bool> {
        self.vm_repo().remove_tag(vm_id, tag_id).await
    }

    pub async fn tags_for_vm(&self, vm_id: i32) -> Result<Vec<tags::Model>> {
        self.vm_repo().tags_for_vm(vm_id).await
    }
}
