pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_orders_table;
mod m20250301_000002_create_order_measurements_table;
mod m20250315_000003_create_email_logs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_orders_table::Migration),
            Box::new(m20250301_000002_create_order_measurements_table::Migration),
            Box::new(m20250315_000003_create_email_logs_table::Migration),
        ]
    }
}
