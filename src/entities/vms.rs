use sea_orm::entity::prelude::*;

/// Locally tracked VM placeholder. Not the live cloud object.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "vms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vm_tags::Entity")]
    VmTags,
}

impl Related<super::vm_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VmTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
