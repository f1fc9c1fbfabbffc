use sea_orm_migration::prelude::*;

mod m20250610_initial;
mod m20250702_add_membership_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250610_initial::Migration),
            Box::new(m20250702_add_membership_indexes::Migration),
        ]
    }
}
