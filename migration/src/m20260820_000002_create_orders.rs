//! Migration to create the orders table (one row per parcel within an entry)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_auto(Orders::Id))
                    .col(integer(Orders::EntryId).not_null())
                    .col(string(Orders::Status).not_null())
                    .col(string_null(Orders::OtpCode))
                    .col(json_binary_null(Orders::OtpAttempts))
                    .col(string_null(Orders::CompanyId))
                    .col(string_null(Orders::RiderId))
                    .col(integer_null(Orders::TransactionId))
                    .col(string(Orders::PickupAddress).not_null())
                    .col(double(Orders::PickupLat).not_null())
                    .col(double(Orders::PickupLng).not_null())
                    .col(string(Orders::DeliveryAddress).not_null())
                    .col(double(Orders::DeliveryLat).not_null())
                    .col(double(Orders::DeliveryLng).not_null())
                    .col(string(Orders::RecipientName).not_null())
                    .col(string(Orders::RecipientPhone).not_null())
                    .col(decimal(Orders::Cost).not_null())
                    .col(decimal(Orders::Weight).not_null())
                    .col(
                        timestamp_with_time_zone(Orders::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Orders::DeliveredAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_entry_id")
                    .table(Orders::Table)
                    .col(Orders::EntryId)
                    .to_owned(),
            )
            .await?;

        // Rider load check counts open orders per rider
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_rider_status")
                    .table(Orders::Table)
                    .col(Orders::RiderId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    EntryId,
    Status,
    OtpCode,
    OtpAttempts,
    CompanyId,
    RiderId,
    TransactionId,
    PickupAddress,
    PickupLat,
    PickupLng,
    DeliveryAddress,
    DeliveryLat,
    DeliveryLng,
    RecipientName,
    RecipientPhone,
    Cost,
    Weight,
    CreatedAt,
    DeliveredAt,
}
