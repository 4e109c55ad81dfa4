//! Migration to create the transactions table (one settlement record per entry)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(pk_auto(Transactions::Id))
                    .col(integer(Transactions::EntryId).not_null())
                    .col(string(Transactions::PaymentMethod).not_null())
                    .col(decimal(Transactions::Amount).not_null())
                    .col(string(Transactions::Status).not_null())
                    .col(string(Transactions::Reference).not_null())
                    .col(string_null(Transactions::CompanyId))
                    .col(string_null(Transactions::RiderId))
                    .col(
                        timestamp_with_time_zone(Transactions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Transactions::ApprovedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_entry_id")
                    .table(Transactions::Table)
                    .col(Transactions::EntryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    EntryId,
    PaymentMethod,
    Amount,
    Status,
    Reference,
    CompanyId,
    RiderId,
    CreatedAt,
    ApprovedAt,
}
