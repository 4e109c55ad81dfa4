//! Migration to create the trip_events table (append-only transition audit log)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TripEvents::Table)
                    .if_not_exists()
                    .col(pk_auto(TripEvents::Id))
                    .col(string(TripEvents::EventType).not_null())
                    .col(string_null(TripEvents::RiderId))
                    .col(integer(TripEvents::EntryId).not_null())
                    .col(integer(TripEvents::OrderId).not_null())
                    .col(double_null(TripEvents::Lat))
                    .col(double_null(TripEvents::Lng))
                    .col(json_binary_null(TripEvents::Metadata))
                    .col(
                        timestamp_with_time_zone(TripEvents::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trip_events_entry_id")
                    .table(TripEvents::Table)
                    .col(TripEvents::EntryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trip_events_order_id")
                    .table(TripEvents::Table)
                    .col(TripEvents::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TripEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TripEvents {
    Table,
    Id,
    EventType,
    RiderId,
    EntryId,
    OrderId,
    Lat,
    Lng,
    Metadata,
    CreatedAt,
}
