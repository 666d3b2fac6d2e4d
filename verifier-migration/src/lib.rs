pub use sea_orm_migration::prelude::*;

mod m20250301_000001_initialize_verifier_schema;
mod m20250301_000002_create_sourcify_tables;
mod m20250301_000003_create_signature_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_initialize_verifier_schema::Migration),
            Box::new(m20250301_000002_create_sourcify_tables::Migration),
            Box::new(m20250301_000003_create_signature_tables::Migration),
        ]
    }
}
