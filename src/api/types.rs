use serde::Serialize;
use std::collections::BTreeMap;

use crate::validation::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Field-level validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            errors: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            errors: None,
        }
    }

    pub fn invalid(errors: ValidationErrors) -> Self {
        Self {
            success: false,
            data: None,
            error: Some("Validation failed".to_string()),
            errors: Some(errors),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferenceItemDto {
    pub value: i32,
    pub name: String,
}

impl ReferenceItemDto {
    #[must_use]
    pub fn from_map(map: BTreeMap<i32, String>) -> Vec<Self> {
        map.into_iter()
            .map(|(value, name)| Self { value, name })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
