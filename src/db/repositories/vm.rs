use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::{is_unique_violation, write_error};
use crate::entities::{tags, vm_tags, vms};

pub struct VmRepository {
    conn: DatabaseConnection,
}

impl VmRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, name: &str) -> Result<vms::Model> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = vms::Entity::insert(vms::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(&self.conn)
        .await
        .map_err(|e| {
            write_error(e, "Failed to insert VM record", |_| format!("VM '{name}' already exists"))
        })?;

        vms::Entity::find_by_id(result.last_insert_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created VM record"))
    }

    pub async fn list(&self) -> Result<Vec<vms::Model>> {
        vms::Entity::find()
            .order_by_asc(vms::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list VM records")
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<vms::Model>> {
        vms::Entity::find()
            .filter(vms::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query VM record by name")
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let txn = self.conn.begin().await?;

        let Some(vm) = vms::Entity::find()
            .filter(vms::Column::Name.eq(name))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        vm_tags::Entity::delete_many()
            .filter(vm_tags::Column::VmId.eq(vm.id))
            .exec(&txn)
            .await?;
        vm.delete(&txn).await?;

        txn.commit().await?;
        Ok(true)
    }

    /// Returns `false` if the tag was already assigned.
    pub async fn add_tag(&self, vm_id: i32, tag_id: i32) -> Result<bool> {
        let existing = vm_tags::Entity::find_by_id((vm_id, tag_id))
            .one(&self.conn)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let inserted = vm_tags::Entity::insert(vm_tags::ActiveModel {
            vm_id: Set(vm_id),
            tag_id: Set(tag_id),
        })
        .exec_without_returning(&self.conn)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            // A concurrent insert won the race.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to tag VM record")),
        }
    }

    pub async fn remove_tag(&self, vm_id: i32, tag_id: i32) -> Result<bool> {
        let result = vm_tags::Entity::delete_by_id((vm_id, tag_id))
            .exec(&self.conn)
            .await
            .context("Failed to untag VM record")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn tags_for_vm(&self, vm_id: i32) -> Result<Vec<tags::Model>> {
        let tag_ids: Vec<i32> = vm_tags::Entity::find()
            .filter(vm_tags::Column::VmId.eq(vm_id))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| m.tag_id)
            .collect();

        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        tags::Entity::find()
            .filter(tags::Column::Id.is_in(tag_ids))
            .order_by_asc(tags::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to load tags for VM record")
    }
}
