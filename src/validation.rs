//! Field validation for identity attributes.
//!
//! Every rule is a small pure check returning an optional message. The
//! identity validator runs all of them and collects every failure per field
//! so a form can show all problems at once.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

pub const FULL_NAME_MAX: usize = 255;
pub const NATIONAL_ID_MAX: usize = 35;
pub const PHONE_MAX: usize = 32;

/// Field name → messages, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single error on one field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Records `check`'s message on `field` when it failed.
    pub fn check(&mut self, field: &str, check: Option<String>) {
        if let Some(message) = check {
            self.add(field, message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for messages in self.0.values() {
            for message in messages {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Attributes submitted when creating or editing an identity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityAttributes {
    pub full_name: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    /// Only honoured on creation; updates never touch the password hash.
    pub password: Option<String>,
    pub role_id: Option<i32>,
    pub status_id: Option<i32>,
}

impl IdentityAttributes {
    /// Applies the input filters (whitespace trimming).
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        trim_in_place(&mut self.full_name);
        trim_in_place(&mut self.national_id);
        trim_in_place(&mut self.phone);
        trim_in_place(&mut self.email);
        self
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Facts from storage the pure validator needs.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub role_values: Vec<i32>,
    pub status_values: Vec<i32>,
    pub email_taken: bool,
}

/// Runs every rule against already trimmed attributes, with `role_id` and
/// `status_id` already defaulted.
#[must_use]
pub fn validate_identity(
    attributes: &IdentityAttributes,
    role_id: i32,
    status_id: i32,
    context: &ValidationContext,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    errors.check("status_id", in_range("Status", &status_id, &context.status_values));
    errors.check("role_id", in_range("Role", &role_id, &context.role_values));

    errors.check("full_name", required("Full name", &attributes.full_name));
    errors.check(
        "full_name",
        max_length("Full name", &attributes.full_name, FULL_NAME_MAX),
    );

    errors.check("national_id", required("National ID", &attributes.national_id));
    errors.check(
        "national_id",
        max_length("National ID", &attributes.national_id, NATIONAL_ID_MAX),
    );

    errors.check("phone", required("Phone", &attributes.phone));
    errors.check("phone", max_length("Phone", &attributes.phone, PHONE_MAX));

    errors.check("email", required("Email", &attributes.email));
    errors.check("email", email("Email", &attributes.email));
    errors.check(
        "email",
        unique("Email", &attributes.email, context.email_taken),
    );

    errors
}

#[must_use]
pub fn required(label: &str, value: &str) -> Option<String> {
    value
        .trim()
        .is_empty()
        .then(|| format!("{label} cannot be blank."))
}

/// Length counted in characters. Empty values are left to [`required`].
#[must_use]
pub fn max_length(label: &str, value: &str, max: usize) -> Option<String> {
    (value.chars().count() > max)
        .then(|| format!("{label} should contain at most {max} characters."))
}

#[must_use]
pub fn email(label: &str, value: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?$",
        )
        .expect("Invalid regex")
    });

    if value.is_empty() || re.is_match(value) {
        None
    } else {
        Some(format!("{label} is not a valid email address."))
    }
}

#[must_use]
pub fn unique(label: &str, value: &str, taken: bool) -> Option<String> {
    (!value.is_empty() && taken).then(|| format!("{label} \"{value}\" has already been taken."))
}

#[must_use]
pub fn in_range<T: PartialEq>(label: &str, value: &T, allowed: &[T]) -> Option<String> {
    (!allowed.contains(value)).then(|| format!("{label} is invalid."))
}
