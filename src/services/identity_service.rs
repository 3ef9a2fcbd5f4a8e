//! Domain service for identities and their credentials.
//!
//! Handles provisioning, profile updates, login, auth keys and the password
//! reset flow on top of the storage port.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::identity::Identity;
use crate::validation::{IdentityAttributes, ValidationErrors};

/// Shown when an identity points at a role that no longer exists.
pub const NO_ROLE: &str = "- no role -";

/// Shown when an identity points at a status that no longer exists.
pub const NO_STATUS: &str = "- no status -";

/// Errors specific to identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity not found")]
    NotFound,

    /// Unknown, expired and malformed tokens all map here.
    #[error("Invalid or expired password reset token")]
    InvalidResetToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for IdentityError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ValidationErrors> for IdentityError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Identity DTO for responses. Carries no secrets.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    pub id: i32,
    pub full_name: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub role_id: i32,
    pub role_name: String,
    pub status_id: i32,
    pub status_name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Login result containing the identity and its fresh auth key.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub id: i32,
    pub email: String,
    pub auth_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedResetToken {
    pub identity_id: i32,
    pub token: String,
    /// Unix time after which the token stops working.
    pub expires_at: i64,
}

/// Domain service trait for identities.
#[async_trait::async_trait]
pub trait IdentityService: Send + Sync {
    /// Validates and persists a new identity.
    ///
    /// Without an explicit password the initial password is derived from the
    /// full name and national id. A fresh auth key is always issued.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] with every failing field,
    /// including a duplicate email detected by the database.
    async fn create_identity(&self, attributes: IdentityAttributes)
    -> Result<Identity, IdentityError>;

    /// Updates profile, role and status. Never touches the password hash.
    async fn update_identity(
        &self,
        id: i32,
        attributes: IdentityAttributes,
    ) -> Result<Identity, IdentityError>;

    /// Active identities only.
    async fn find_by_id(&self, id: i32) -> Result<Option<Identity>, IdentityError>;

    /// Active identities only.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError>;

    /// Matches the auth key exactly, whatever the identity's status.
    async fn find_by_access_token(&self, token: &str) -> Result<Option<Identity>, IdentityError>;

    /// Active identity holding `token`, provided the token has not expired.
    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<Identity>, IdentityError>;

    /// Checks only the token's embedded timestamp; no lookup.
    fn is_password_reset_token_valid(&self, token: &str) -> bool;

    /// Verifies email and password and rotates the auth key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] if login fails.
    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, IdentityError>;

    /// Issues a reset token for an active identity, reusing a pending one
    /// that is still valid.
    async fn generate_password_reset_token(
        &self,
        identity_id: i32,
    ) -> Result<IssuedResetToken, IdentityError>;

    /// Sets a new password using a reset token and consumes the token.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidResetToken`] for unknown or expired
    /// tokens and [`IdentityError::Validation`] for a too short password.
    async fn reset_password(&self, token: &str, password: &str)
    -> Result<Identity, IdentityError>;

    /// Replaces the auth key and returns the new one.
    async fn regenerate_auth_key(&self, identity_id: i32) -> Result<String, IdentityError>;

    /// `role_value -> role_name` for dropdowns.
    async fn role_list(&self) -> Result<BTreeMap<i32, String>, IdentityError>;

    /// `status_value -> status_name` for dropdowns.
    async fn status_list(&self) -> Result<BTreeMap<i32, String>, IdentityError>;

    /// Read-only projection with role and status names resolved.
    async fn describe(&self, identity: &Identity) -> Result<IdentityInfo, IdentityError>;
}
