use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::{is_unique_violation, write_error};
use crate::entities::{groups, user_groups, users};

pub struct GroupRepository {
    conn: DatabaseConnection,
}

impl GroupRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, name: &str) -> Result<groups::Model> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = groups::Entity::insert(groups::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(&self.conn)
        .await
        .map_err(|e| {
            write_error(e, "Failed to insert group", |_| format!("Group '{name}' already exists"))
        })?;

        groups::Entity::find_by_id(result.last_insert_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created group"))
    }

    pub async fn list(&self) -> Result<Vec<groups::Model>> {
        groups::Entity::find()
            .order_by_asc(groups::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list groups")
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<groups::Model>> {
        groups::Entity::find()
            .filter(groups::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query group by name")
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(group) = groups::Entity::find()
            .filter(groups::Column::Name.eq(name))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        user_groups::Entity::delete_many()
            .filter(user_groups::Column::GroupId.eq(group.id))
            .exec(&txn)
            .await?;
        group.delete(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    /// Returns `false` if the membership already existed.
    pub async fn add_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        let existing = user_groups::Entity::find_by_id((user_id, group_id))
            .one(&self.conn)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let inserted = user_groups::Entity::insert(user_groups::ActiveModel {
            user_id: Set(user_id),
            group_id: Set(group_id),
        })
        .exec_without_returning(&self.conn)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            // A concurrent insert won the race.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to add group member")),
        }
    }

    pub async fn remove_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        let result = user_groups::Entity::delete_by_id((user_id, group_id))
            .exec(&self.conn)
            .await
            .context("Failed to remove group member")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn groups_for_user(&self, user_id: i32) -> Result<Vec<groups::Model>> {
        let group_ids: Vec<i32> = user_groups::Entity::find()
            .filter(user_groups::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();

        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        groups::Entity::find()
            .filter(groups::Column::Id.is_in(group_ids))
            .order_by_asc(groups::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to load groups for user")
    }

    pub async fn members(&self, group_id: i32) -> Result<Vec<users::Model>> {
        let user_ids: Vec<i32> = user_groups::Entity::find()
            .filter(user_groups::Column::GroupId.eq(group_id))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        users::Entity::find()
            .filter(users::Column::Id.is_in(user_ids))
            .order_by_asc(users::Column::Username)
            .all(&self.conn)
            .await
            .context("Failed to load group members")
    }
}
