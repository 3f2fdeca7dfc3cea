use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_orders_table::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OrderMeasurements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderMeasurements::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderMeasurements::OrderId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderMeasurements::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OrderMeasurements::Width).decimal().not_null())
                    .col(ColumnDef::new(OrderMeasurements::Height).decimal().not_null())
                    .col(
                        ColumnDef::new(OrderMeasurements::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(OrderMeasurements::UnitPrice).decimal().null())
                    .col(ColumnDef::new(OrderMeasurements::ProductType).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_measurements_order")
                            .from(OrderMeasurements::Table, OrderMeasurements::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_measurements_order_id")
                    .table(OrderMeasurements::Table)
                    .col(OrderMeasurements::OrderId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderMeasurements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum OrderMeasurements {
    Table,
    Id,
    OrderId,
    Position,
    Width,
    Height,
    Quantity,
    UnitPrice,
    ProductType,
}
