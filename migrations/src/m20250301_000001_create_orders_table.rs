use sea_orm_migration::prelude::*;

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
                    .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Orders::ReferenceNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::BudgetNumber).string().null())
                    .col(ColumnDef::new(Orders::CustomerName).string().null())
                    .col(ColumnDef::new(Orders::CustomerTaxId).string().null())
                    .col(ColumnDef::new(Orders::CustomerAddress).text().null())
                    .col(ColumnDef::new(Orders::CustomerRegion).string().null())
                    .col(ColumnDef::new(Orders::CustomerEmail).string().null())
                    .col(ColumnDef::new(Orders::CustomerPhone).string().null())
                    .col(ColumnDef::new(Orders::ProductType).string().null())
                    .col(ColumnDef::new(Orders::TotalPrice).decimal().null())
                    .col(
                        ColumnDef::new(Orders::TotalUnits)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Orders::Notes).text().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_created_at")
                    .table(Orders::Table)
                    .col(Orders::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    ReferenceNumber,
    BudgetNumber,
    CustomerName,
    CustomerTaxId,
    CustomerAddress,
    CustomerRegion,
    CustomerEmail,
    CustomerPhone,
    ProductType,
    TotalPrice,
    TotalUnits,
    Status,
    Notes,
    CreatedAt,
    UpdatedAt,
}
