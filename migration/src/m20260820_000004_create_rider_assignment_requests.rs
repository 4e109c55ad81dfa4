//! Migration to create the rider_assignment_requests table (per-rider offers)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RiderAssignmentRequests::Table)
                    .if_not_exists()
                    .col(pk_auto(RiderAssignmentRequests::Id))
                    .col(integer(RiderAssignmentRequests::EntryId).not_null())
                    .col(string(RiderAssignmentRequests::CompanyId).not_null())
                    .col(string(RiderAssignmentRequests::RiderId).not_null())
                    .col(string(RiderAssignmentRequests::Status).not_null())
                    .col(
                        timestamp_with_time_zone(RiderAssignmentRequests::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(
                        RiderAssignmentRequests::ResolvedAt,
                    ))
                    .to_owned(),
            )
            .await?;

        // One offer per rider per entry
        manager
            .create_index(
                Index::create()
                    .name("idx_assignment_requests_entry_rider")
                    .table(RiderAssignmentRequests::Table)
                    .col(RiderAssignmentRequests::EntryId)
                    .col(RiderAssignmentRequests::RiderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Riders list their own pending offers
        manager
            .create_index(
                Index::create()
                    .name("idx_assignment_requests_rider_status")
                    .table(RiderAssignmentRequests::Table)
                    .col(RiderAssignmentRequests::RiderId)
                    .col(RiderAssignmentRequests::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RiderAssignmentRequests::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RiderAssignmentRequests {
    Table,
    Id,
    EntryId,
    CompanyId,
    RiderId,
    Status,
    CreatedAt,
    ResolvedAt,
}
