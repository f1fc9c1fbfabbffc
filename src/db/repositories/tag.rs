use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::write_error;
use crate::entities::{tags, vm_tags};

pub struct TagRepository {
    conn: DatabaseConnection,
}

impl TagRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, name: &str) -> Result<tags::Model> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = tags::Entity::insert(tags::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(&self.conn)
        .await
        .map_err(|e| {
            write_error(e, "Failed to insert tag", |_| format!("Tag '{name}' already exists"))
        })?;

        tags::Entity::find_by_id(result.last_insert_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created tag"))
    }

    pub async fn list(&self) -> Result<Vec<tags::Model>> {
        tags::Entity::find()
            .order_by_asc(tags::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list tags")
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<tags::Model>> {
        tags::Entity::find()
            .filter(tags::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query tag by name")
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(tag) = tags::Entity::find()
            .filter(tags::Column::Name.eq(name))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        vm_tags::Entity::delete_many()
            .filter(vm_tags::Column::TagId.eq(tag.id))
            .exec(&txn)
            .await?;
        tag.delete(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }
}
