use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmailLogs::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(EmailLogs::OrderId).uuid().null())
                    .col(ColumnDef::new(EmailLogs::TemplateId).string().not_null())
                    .col(ColumnDef::new(EmailLogs::Audience).string().not_null())
                    .col(ColumnDef::new(EmailLogs::Recipient).string().not_null())
                    .col(ColumnDef::new(EmailLogs::Subject).string().not_null())
                    .col(ColumnDef::new(EmailLogs::Status).string().not_null())
                    .col(ColumnDef::new(EmailLogs::Error).text().null())
                    .col(
                        ColumnDef::new(EmailLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_logs_created_at")
                    .table(EmailLogs::Table)
                    .col(EmailLogs::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum EmailLogs {
    Table,
    Id,
    OrderId,
    TemplateId,
    Audience,
    Recipient,
    Subject,
    Status,
    Error,
    CreatedAt,
}
