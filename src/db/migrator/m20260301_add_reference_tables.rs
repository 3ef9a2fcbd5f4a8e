use crate::entities::{prelude::*, roles, statuses};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

const ROLES: [(i32, &str); 2] = [(10, "User"), (20, "Administrator")];

const STATUSES: [(i32, &str); 2] = [(0, "Inactive"), (10, "Active")];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Roles)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Statuses)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        let mut insert_roles = Query::insert()
            .into_table(Roles)
            .columns([roles::Column::RoleValue, roles::Column::RoleName])
            .to_owned();
        for (value, name) in ROLES {
            insert_roles.values_panic([value.into(), name.into()]);
        }
        manager.exec_stmt(insert_roles).await?;

        let mut insert_statuses = Query::insert()
            .into_table(Statuses)
            .columns([statuses::Column::StatusValue, statuses::Column::StatusName])
            .to_owned();
        for (value, name) in STATUSES {
            insert_statuses.values_panic([value.into(), name.into()]);
        }
        manager.exec_stmt(insert_statuses).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Statuses).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Roles).to_owned())
            .await?;

        Ok(())
    }
}
