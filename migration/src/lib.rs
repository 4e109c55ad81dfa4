pub use sea_orm_migration::prelude::*;

mod m20260820_000001_create_entries;
mod m20260820_000002_create_orders;
mod m20260820_000003_create_transactions;
mod m20260820_000004_create_rider_assignment_requests;
mod m20260820_000005_create_trip_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260820_000001_create_entries::Migration),
            Box::new(m20260820_000002_create_orders::Migration),
            Box::new(m20260820_000003_create_transactions::Migration),
            Box::new(m20260820_000004_create_rider_assignment_requests::Migration),
            Box::new(m20260820_000005_create_trip_events::Migration),
        ]
    }
}
