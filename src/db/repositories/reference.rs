use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use std::collections::BTreeMap;

use crate::entities::{prelude::*, roles, statuses};

/// Role and status lookup tables.
pub struct ReferenceRepository {
    conn: DatabaseConnection,
}

impl ReferenceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// `role_value -> role_name`, ordered by value.
    pub async fn role_list(&self) -> Result<BTreeMap<i32, String>> {
        let rows = Roles::find()
            .order_by_asc(roles::Column::RoleValue)
            .all(&self.conn)
            .await
            .context("Failed to list roles")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.role_value, r.role_name))
            .collect())
    }

    /// `status_value -> status_name`, ordered by value.
    pub async fn status_list(&self) -> Result<BTreeMap<i32, String>> {
        let rows = Statuses::find()
            .order_by_asc(statuses::Column::StatusValue)
            .all(&self.conn)
            .await
            .context("Failed to list statuses")?;

        Ok(rows
            .into_iter()
            .map(|s| (s.status_value, s.status_name))
            .collect())
    }

    pub async fn role_name(&self, value: i32) -> Result<Option<String>> {
        let role = Roles::find_by_id(value)
            .one(&self.conn)
            .await
            .context("Failed to query role")?;

        Ok(role.map(|r| r.role_name))
    }

    pub async fn status_name(&self, value: i32) -> Result<Option<String>> {
        let status = Statuses::find_by_id(value)
            .one(&self.conn)
            .await
            .context("Failed to query status")?;

        Ok(status.map(|s| s.status_name))
    }
}
