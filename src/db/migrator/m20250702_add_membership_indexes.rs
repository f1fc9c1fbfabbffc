use crate::entities::{user_groups, vm_tags};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Composite primary keys already cover lookups by the leading column.
        manager
            .create_index(
                Index::create()
                    .name("idx_user_groups_group_id")
                    .table(user_groups::Entity)
                    .col(user_groups::Column::GroupId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vm_tags_tag_id")
                    .table(vm_tags::Entity)
                    .col(vm_tags::Column::TagId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_vm_tags_tag_id")
                    .table(vm_tags::Entity)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_user_groups_group_id")
                    .table(user_groups::Entity)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
