//! The identity record and its credential lifecycle.
//!
//! Password hashing, the "remember me" auth key and the single-use password
//! reset token all live on [`Identity`]. Nothing here touches storage; the
//! service layer loads an identity, calls these methods and persists it.

use anyhow::Result;
use std::fmt;

use crate::entities::users;
use crate::security::{CredentialSecurity, constant_time_eq};
use crate::validation::IdentityAttributes;

/// Separator between the random part and the issue timestamp of a reset token.
const RESET_TOKEN_SEPARATOR: char = '_';

#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i32,
    pub full_name: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub auth_key: String,
    pub password_reset_token: Option<String>,
    pub role_id: i32,
    pub status_id: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .field("status_id", &self.status_id)
            .field("reset_pending", &self.password_reset_token.is_some())
            .finish_non_exhaustive()
    }
}

impl From<users::Model> for Identity {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            national_id: model.national_id,
            phone: model.phone,
            email: model.email,
            password_hash: model.password_hash,
            auth_key: model.auth_key,
            password_reset_token: model.password_reset_token,
            role_id: model.role_id,
            status_id: model.status_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Whether a password reset is in flight for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState<'a> {
    NoPendingReset,
    ResetPending {
        token: &'a str,
        /// `None` when the stored token has no readable timestamp.
        issued_at: Option<i64>,
    },
}

impl Identity {
    /// Hashes `password` and replaces the stored hash. The auth key is left alone.
    pub fn set_password(&mut self, security: &dyn CredentialSecurity, password: &str) -> Result<()> {
        self.password_hash = security.hash_password(password)?;
        Ok(())
    }

    #[must_use]
    pub fn validate_password(&self, security: &dyn CredentialSecurity, password: &str) -> bool {
        security.verify_password(password, &self.password_hash)
    }

    pub fn generate_auth_key(&mut self, security: &dyn CredentialSecurity, length: usize) {
        self.auth_key = security.random_string(length);
    }

    #[must_use]
    pub fn validate_auth_key(&self, candidate: &str) -> bool {
        constant_time_eq(&self.auth_key, candidate)
    }

    /// Issues a new reset token stamped with `now`, replacing any pending one.
    pub fn generate_password_reset_token(
        &mut self,
        security: &dyn CredentialSecurity,
        length: usize,
        now: i64,
    ) {
        self.password_reset_token = Some(format!(
            "{}{RESET_TOKEN_SEPARATOR}{now}",
            security.random_string(length)
        ));
    }

    pub fn remove_password_reset_token(&mut self) {
        self.password_reset_token = None;
    }

    #[must_use]
    pub fn reset_state(&self) -> ResetState<'_> {
        match self.password_reset_token.as_deref() {
            None | Some("") => ResetState::NoPendingReset,
            Some(token) => ResetState::ResetPending {
                token,
                issued_at: reset_token_timestamp(token),
            },
        }
    }

    #[must_use]
    pub fn is_active(&self, active_status: i32) -> bool {
        self.status_id == active_status
    }
}

/// Identity fields ready for the first insert: password hash and auth key
/// already derived.
#[derive(Clone)]
pub struct NewIdentity {
    pub full_name: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub auth_key: String,
    pub role_id: i32,
    pub status_id: i32,
}

impl NewIdentity {
    /// Builds the record for a freshly provisioned identity.
    ///
    /// Without an explicit password the initial one comes from
    /// [`derive_initial_password`]. A fresh auth key is always issued.
    pub fn provision(
        attributes: &IdentityAttributes,
        role_id: i32,
        status_id: i32,
        security: &dyn CredentialSecurity,
        auth_key_length: usize,
    ) -> Result<Self> {
        let password = match attributes.password.as_deref() {
            Some(password) if !password.is_empty() => password.to_string(),
            _ => derive_initial_password(&attributes.full_name, &attributes.national_id),
        };

        Ok(Self {
            full_name: attributes.full_name.clone(),
            national_id: attributes.national_id.clone(),
            phone: attributes.phone.clone(),
            email: attributes.email.clone(),
            password_hash: security.hash_password(&password)?,
            auth_key: security.random_string(auth_key_length),
            role_id,
            status_id,
        })
    }
}

/// Initial password for accounts created without one: first letter of the
/// full name, the national id, then the last letter of the full name, both
/// letters uppercased. A one-letter name contributes that letter twice.
#[must_use]
pub fn derive_initial_password(full_name: &str, national_id: &str) -> String {
    let first = full_name.chars().next();
    let last = full_name.chars().next_back();

    let mut password = String::with_capacity(national_id.len() + 2);
    password.extend(first.into_iter().flat_map(char::to_uppercase));
    password.push_str(national_id);
    password.extend(last.into_iter().flat_map(char::to_uppercase));
    password
}

/// Checks a reset token's embedded timestamp against the expiry window.
///
/// Valid while `timestamp + expire_seconds >= now`. Empty tokens and tokens
/// without a numeric suffix after the last `_` are never valid.
#[must_use]
pub fn is_password_reset_token_valid(token: &str, expire_seconds: i64, now: i64) -> bool {
    if token.is_empty() {
        return false;
    }

    reset_token_timestamp(token)
        .and_then(|issued_at| issued_at.checked_add(expire_seconds))
        .is_some_and(|expires_at| expires_at >= now)
}

fn reset_token_timestamp(token: &str) -> Option<i64> {
    let (_, suffix) = token.rsplit_once(RESET_TOKEN_SEPARATOR)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}
