//! `SeaORM` implementation of the `IdentityService` trait.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::config::{Config, IdentityConfig, SecurityConfig};
use crate::db::{Store, StoreError};
use crate::identity::{self, Identity, NewIdentity, ResetState};
use crate::security::{Argon2Security, Clock, CredentialSecurity, SystemClock};
use crate::services::identity_service::{
    IdentityError, IdentityInfo, IdentityService, IssuedResetToken, LoginResult, NO_ROLE,
    NO_STATUS,
};
use crate::validation::{
    self, IdentityAttributes, ValidationContext, ValidationErrors, validate_identity,
};

pub struct SeaOrmIdentityService {
    store: Store,
    security: Arc<dyn CredentialSecurity>,
    clock: Arc<dyn Clock>,
    security_config: SecurityConfig,
    identity_config: IdentityConfig,
}

impl SeaOrmIdentityService {
    #[must_use]
    pub fn new(
        store: Store,
        security: Arc<dyn CredentialSecurity>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            security,
            clock,
            security_config: config.security.clone(),
            identity_config: config.identity.clone(),
        }
    }

    /// Argon2id hashing with the configured costs and the system clock.
    pub fn from_config(store: Store, config: &Config) -> anyhow::Result<Self> {
        let security = Argon2Security::new(&config.security)?;
        Ok(Self::new(
            store,
            Arc::new(security),
            Arc::new(SystemClock),
            config,
        ))
    }

    fn active(&self, identity: Option<Identity>) -> Option<Identity> {
        identity.filter(|i| i.is_active(self.identity_config.active_status))
    }

    async fn validation_context(
        &self,
        email: &str,
        except_id: Option<i32>,
    ) -> Result<ValidationContext, IdentityError> {
        let email_taken = if email.is_empty() {
            false
        } else {
            self.store.email_taken(email, except_id).await?
        };

        Ok(ValidationContext {
            role_values: self.store.role_list().await?.into_keys().collect(),
            status_values: self.store.status_list().await?.into_keys().collect(),
            email_taken,
        })
    }

    /// Hashes on the blocking pool.
    async fn set_password_blocking(
        &self,
        mut identity: Identity,
        password: String,
    ) -> Result<Identity, IdentityError> {
        let security = Arc::clone(&self.security);
        let identity = task::spawn_blocking(move || {
            identity.set_password(security.as_ref(), &password)?;
            Ok::<Identity, anyhow::Error>(identity)
        })
        .await
        .context("Password hashing task panicked")??;

        Ok(identity)
    }

    fn password_length_errors(&self, password: &str) -> ValidationErrors {
        let min = self.security_config.min_password_length;
        let mut errors = ValidationErrors::new();
        errors.check("password", validation::required("Password", password));
        if !password.is_empty() && password.chars().count() < min {
            errors.add(
                "password",
                format!("Password should contain at least {min} characters."),
            );
        }
        errors
    }
}

fn duplicate_email_as_validation(err: StoreError, email: &str) -> IdentityError {
    match err {
        StoreError::DuplicateEmail => {
            let mut errors = ValidationErrors::new();
            errors.check("email", validation::unique("Email", email, true));
            IdentityError::Validation(errors)
        }
        StoreError::Database(e) => e.into(),
    }
}

#[async_trait]
impl IdentityService for SeaOrmIdentityService {
    async fn create_identity(
        &self,
        attributes: IdentityAttributes,
    ) -> Result<Identity, IdentityError> {
        let attributes = attributes.trimmed();
        let role_id = attributes
            .role_id
            .unwrap_or(self.identity_config.default_role);
        let status_id = attributes
            .status_id
            .unwrap_or(self.identity_config.default_status);

        let context = self.validation_context(&attributes.email, None).await?;
        validate_identity(&attributes, role_id, status_id, &context).into_result()?;

        let email = attributes.email.clone();
        let security = Arc::clone(&self.security);
        let key_length = self.security_config.random_string_length;
        let new = task::spawn_blocking(move || {
            NewIdentity::provision(&attributes, role_id, status_id, security.as_ref(), key_length)
        })
        .await
        .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();
        let identity = self
            .store
            .insert_identity(new, &now)
            .await
            .map_err(|e| duplicate_email_as_validation(e, &email))?;

        info!(identity_id = identity.id, "Identity created");
        Ok(identity)
    }

    async fn update_identity(
        &self,
        id: i32,
        attributes: IdentityAttributes,
    ) -> Result<Identity, IdentityError> {
        let mut identity = self
            .store
            .find_identity_by_id(id)
            .await?
            .ok_or(IdentityError::NotFound)?;

        let attributes = attributes.trimmed();
        let role_id = attributes.role_id.unwrap_or(identity.role_id);
        let status_id = attributes.status_id.unwrap_or(identity.status_id);

        let context = self.validation_context(&attributes.email, Some(id)).await?;
        validate_identity(&attributes, role_id, status_id, &context).into_result()?;

        identity.full_name = attributes.full_name;
        identity.national_id = attributes.national_id;
        identity.phone = attributes.phone;
        identity.email = attributes.email;
        identity.role_id = role_id;
        identity.status_id = status_id;

        let now = chrono::Utc::now().to_rfc3339();
        let identity = self
            .store
            .update_identity_profile(&identity, &now)
            .await
            .map_err(|e| duplicate_email_as_validation(e, &identity.email))?;
        info!(identity_id = identity.id, "Identity updated");
        Ok(identity)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Identity>, IdentityError> {
        Ok(self.active(self.store.find_identity_by_id(id).await?))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.active(self.store.find_identity_by_email(email).await?))
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Identity>, IdentityError> {
        if token.is_empty() {
            return Ok(None);
        }
        let identity = self.store.find_identity_by_auth_key(token).await?;
        Ok(identity.filter(|i| i.validate_auth_key(token)))
    }

    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<Identity>, IdentityError> {
        if !self.is_password_reset_token_valid(token) {
            return Ok(None);
        }
        Ok(self.active(self.store.find_identity_by_reset_token(token).await?))
    }

    fn is_password_reset_token_valid(&self, token: &str) -> bool {
        identity::is_password_reset_token_valid(
            token,
            self.security_config.password_reset_token_expire_seconds,
            self.clock.now(),
        )
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, IdentityError> {
        let Some(identity) = self.find_by_email(email.trim()).await? else {
            warn!("Login failed: no active identity for the given email");
            return Err(IdentityError::InvalidCredentials);
        };

        let security = Arc::clone(&self.security);
        let password = password.to_string();
        let (identity, is_valid) = task::spawn_blocking(move || {
            let is_valid = identity.validate_password(security.as_ref(), &password);
            (identity, is_valid)
        })
        .await
        .context("Password verification task panicked")?;

        if !is_valid {
            warn!(identity_id = identity.id, "Login failed: wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        let auth_key = self.regenerate_auth_key(identity.id).await?;

        Ok(LoginResult {
            id: identity.id,
            email: identity.email,
            auth_key,
        })
    }

    async fn generate_password_reset_token(
        &self,
        identity_id: i32,
    ) -> Result<IssuedResetToken, IdentityError> {
        let mut identity = self
            .find_by_id(identity_id)
            .await?
            .ok_or(IdentityError::NotFound)?;

        let pending = identity
            .password_reset_token
            .as_deref()
            .is_some_and(|token| self.is_password_reset_token_valid(token));

        if !pending {
            let previous = identity.password_reset_token.clone();
            identity.generate_password_reset_token(
                self.security.as_ref(),
                self.security_config.random_string_length,
                self.clock.now(),
            );
            let token = identity.password_reset_token.clone().unwrap_or_default();

            let now = chrono::Utc::now().to_rfc3339();
            let stored = self
                .store
                .replace_reset_token(identity_id, previous.as_deref(), &token, &now)
                .await?;

            if stored {
                info!(identity_id, "Password reset token issued");
            } else {
                // Another request replaced the token first; hand out that one
                identity = self
                    .find_by_id(identity_id)
                    .await?
                    .ok_or(IdentityError::NotFound)?;
                let still_valid = identity
                    .password_reset_token
                    .as_deref()
                    .is_some_and(|token| self.is_password_reset_token_valid(token));
                if !still_valid {
                    return Err(IdentityError::Internal(
                        "Reset token changed concurrently".to_string(),
                    ));
                }
            }
        }

        let issued_at = match identity.reset_state() {
            ResetState::ResetPending {
                issued_at: Some(issued_at),
                ..
            } => issued_at,
            _ => return Err(IdentityError::Internal("Reset token was not stored".to_string())),
        };

        Ok(IssuedResetToken {
            identity_id,
            token: identity.password_reset_token.clone().unwrap_or_default(),
            expires_at: issued_at + self.security_config.password_reset_token_expire_seconds,
        })
    }

    async fn reset_password(
        &self,
        token: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        self.password_length_errors(password).into_result()?;

        let identity = self
            .find_by_password_reset_token(token)
            .await?
            .ok_or(IdentityError::InvalidResetToken)?;

        let identity_id = identity.id;
        let mut identity = self
            .set_password_blocking(identity, password.to_string())
            .await?;
        identity.remove_password_reset_token();

        let now = chrono::Utc::now().to_rfc3339();
        if !self.store.consume_reset_token(&identity, token, &now).await? {
            warn!(identity_id, "Password reset token already consumed");
            return Err(IdentityError::InvalidResetToken);
        }

        let identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        info!(identity_id, "Password reset completed");
        Ok(identity)
    }

    async fn regenerate_auth_key(&self, identity_id: i32) -> Result<String, IdentityError> {
        let mut identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(IdentityError::NotFound)?;

        identity.generate_auth_key(
            self.security.as_ref(),
            self.security_config.random_string_length,
        );
        let now = chrono::Utc::now().to_rfc3339();
        if !self
            .store
            .set_auth_key(identity_id, &identity.auth_key, &now)
            .await?
        {
            return Err(IdentityError::NotFound);
        }

        info!(identity_id, "Auth key regenerated");
        Ok(identity.auth_key)
    }

    async fn role_list(&self) -> Result<BTreeMap<i32, String>, IdentityError> {
        Ok(self.store.role_list().await?)
    }

    async fn status_list(&self) -> Result<BTreeMap<i32, String>, IdentityError> {
        Ok(self.store.status_list().await?)
    }

    async fn describe(&self, identity: &Identity) -> Result<IdentityInfo, IdentityError> {
        let role_name = self
            .store
            .role_name(identity.role_id)
            .await?
            .unwrap_or_else(|| NO_ROLE.to_string());
        let status_name = self
            .store
            .status_name(identity.status_id)
            .await?
            .unwrap_or_else(|| NO_STATUS.to_string());

        Ok(IdentityInfo {
            id: identity.id,
            full_name: identity.full_name.clone(),
            national_id: identity.national_id.clone(),
            phone: identity.phone.clone(),
            email: identity.email.clone(),
            role_id: identity.role_id,
            role_name,
            status_id: identity.status_id,
            status_name,
            created_at: identity.created_at.clone(),
            updated_at: identity.updated_at.clone(),
        })
    }
}
