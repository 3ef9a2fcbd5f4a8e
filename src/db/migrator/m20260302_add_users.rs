use crate::entities::{prelude::*, users};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // No foreign keys on role_id/status_id; missing reference rows are allowed.
        manager
            .create_table(
                Table::create()
                    .table(Users)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(users::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(users::Column::FullName).string().not_null())
                    .col(ColumnDef::new(users::Column::NationalId).string().not_null())
                    .col(ColumnDef::new(users::Column::Phone).string().not_null())
                    .col(
                        ColumnDef::new(users::Column::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(users::Column::PasswordHash).string().not_null())
                    .col(ColumnDef::new(users::Column::AuthKey).string().not_null())
                    .col(ColumnDef::new(users::Column::PasswordResetToken).string().null())
                    .col(ColumnDef::new(users::Column::RoleId).integer().not_null())
                    .col(ColumnDef::new(users::Column::StatusId).integer().not_null())
                    .col(ColumnDef::new(users::Column::CreatedAt).string().not_null())
                    .col(ColumnDef::new(users::Column::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_auth_key")
                    .table(Users)
                    .col(users::Column::AuthKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_password_reset_token")
                    .table(Users)
                    .col(users::Column::PasswordResetToken)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
