//! Migration to create the entries table (one row per delivery request)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entries::Table)
                    .if_not_exists()
                    .col(pk_auto(Entries::Id))
                    .col(string(Entries::ShipperId).not_null())
                    .col(string(Entries::Status).not_null())
                    .col(string(Entries::PaymentMethod).not_null())
                    .col(string(Entries::VehicleClass).not_null())
                    .col(string(Entries::RecipientName).not_null())
                    .col(string(Entries::RecipientPhone).not_null())
                    .col(string(Entries::Country).not_null())
                    .col(string(Entries::State).not_null())
                    .col(string_null(Entries::OtpCode))
                    .col(json_binary_null(Entries::OtpAttempts))
                    .col(string_null(Entries::CompanyId))
                    .col(string_null(Entries::RiderId))
                    .col(integer_null(Entries::TransactionId))
                    .col(
                        timestamp_with_time_zone(Entries::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Entries::CompanyAcceptedAt))
                    .col(timestamp_with_time_zone_null(Entries::RiderAcceptedAt))
                    .col(timestamp_with_time_zone_null(Entries::CancelledAt))
                    .to_owned(),
            )
            .await?;

        // Pool queries filter on status + state and sort by age
        manager
            .create_index(
                Index::create()
                    .name("idx_entries_status_state")
                    .table(Entries::Table)
                    .col(Entries::Status)
                    .col(Entries::State)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_entries_company_id")
                    .table(Entries::Table)
                    .col(Entries::CompanyId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_entries_rider_id")
                    .table(Entries::Table)
                    .col(Entries::RiderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Entries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Entries {
    Table,
    Id,
    ShipperId,
    Status,
    PaymentMethod,
    VehicleClass,
    RecipientName,
    RecipientPhone,
    Country,
    State,
    OtpCode,
    OtpAttempts,
    CompanyId,
    RiderId,
    TransactionId,
    CreatedAt,
    CompanyAcceptedAt,
    RiderAcceptedAt,
    CancelledAt,
}
