use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr, sea_query::Expr,
};
use thiserror::Error;

use crate::entities::users;
use crate::identity::{Identity, NewIdentity};

/// Write failures the caller is expected to handle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `users.email` unique constraint rejected the row.
    #[error("Email already in use")]
    DuplicateEmail,

    #[error(transparent)]
    Database(#[from] DbErr),
}

fn classify(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::DuplicateEmail,
        _ => StoreError::Database(err),
    }
}

pub struct IdentityRepository {
    conn: DatabaseConnection,
}

impl IdentityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts a new row. Uniqueness of `email` is enforced by the table's
    /// unique index, so of two concurrent inserts with one address exactly
    /// one succeeds.
    pub async fn insert(&self, new: NewIdentity, now: &str) -> Result<Identity, StoreError> {
        let model = users::ActiveModel {
            full_name: Set(new.full_name),
            national_id: Set(new.national_id),
            phone: Set(new.phone),
            email: Set(new.email),
            password_hash: Set(new.password_hash),
            auth_key: Set(new.auth_key),
            password_reset_token: Set(None),
            role_id: Set(new.role_id),
            status_id: Set(new.status_id),
            created_at: Set(now.to_string()),
            updated_at: Set(now.to_string()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .map_err(classify)?;

        Ok(Identity::from(model))
    }

    /// Writes the profile, role and status columns only. Credentials have
    /// their own setters.
    pub async fn update_profile(
        &self,
        identity: &Identity,
        now: &str,
    ) -> Result<Identity, StoreError> {
        let model = users::ActiveModel {
            id: Unchanged(identity.id),
            full_name: Set(identity.full_name.clone()),
            national_id: Set(identity.national_id.clone()),
            phone: Set(identity.phone.clone()),
            email: Set(identity.email.clone()),
            role_id: Set(identity.role_id),
            status_id: Set(identity.status_id),
            updated_at: Set(now.to_string()),
            ..Default::default()
        }
        .update(&self.conn)
        .await
        .map_err(classify)?;

        Ok(Identity::from(model))
    }

    /// Returns false when no row has `id`.
    pub async fn set_auth_key(&self, id: i32, auth_key: &str, now: &str) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::AuthKey, Expr::value(auth_key))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update auth key")?;

        Ok(result.rows_affected == 1)
    }

    /// Stores `token` only if the row still holds `expected`.
    pub async fn replace_reset_token(
        &self,
        id: i32,
        expected: Option<&str>,
        token: &str,
        now: &str,
    ) -> Result<bool> {
        let current = match expected {
            Some(expected) => users::Column::PasswordResetToken.eq(expected),
            None => users::Column::PasswordResetToken.is_null(),
        };

        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordResetToken, Expr::value(token))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .filter(current)
            .exec(&self.conn)
            .await
            .context("Failed to store password reset token")?;

        Ok(result.rows_affected == 1)
    }

    /// Writes the new password hash and clears the reset token, but only
    /// while the row still holds `token`. Of two concurrent resets with one
    /// token exactly one gets `true`.
    pub async fn consume_reset_token(
        &self,
        identity: &Identity,
        token: &str,
        now: &str,
    ) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::PasswordHash,
                Expr::value(identity.password_hash.clone()),
            )
            .col_expr(
                users::Column::PasswordResetToken,
                Expr::value(identity.password_reset_token.clone()),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(identity.id))
            .filter(users::Column::PasswordResetToken.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to complete password reset")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Identity>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query identity by ID")?;

        Ok(user.map(Identity::from))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query identity by email")?;

        Ok(user.map(Identity::from))
    }

    pub async fn find_by_auth_key(&self, auth_key: &str) -> Result<Option<Identity>> {
        let user = users::Entity::find()
            .filter(users::Column::AuthKey.eq(auth_key))
            .one(&self.conn)
            .await
            .context("Failed to query identity by auth key")?;

        Ok(user.map(Identity::from))
    }

    pub async fn find_by_reset_token(&self, token: &str) -> Result<Option<Identity>> {
        let user = users::Entity::find()
            .filter(users::Column::PasswordResetToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query identity by reset token")?;

        Ok(user.map(Identity::from))
    }

    /// Whether another identity already uses `email`.
    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        let mut query = users::Entity::find().filter(users::Column::Email.eq(email));
        if let Some(id) = except_id {
            query = query.filter(users::Column::Id.ne(id));
        }

        let count = query
            .count(&self.conn)
            .await
            .context("Failed to check email uniqueness")?;

        Ok(count > 0)
    }
}
