//! Error types for the remote resource client

use eventdesk_core::validation::{FieldError, ValidationErrors};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when talking to the EventDesk API
///
/// Every variant carries owned strings only, so errors can be cloned and
/// shared between the callers of one deduplicated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport failure or 5xx response
    #[error("Network error{}: {message}", fmt_status(.status))]
    Network {
        /// HTTP status code, `None` when no response arrived
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// 4xx response, or a payload rejected before it was sent
    #[error("Validation failed{}: {message}", fmt_status(.status))]
    Validation {
        /// HTTP status code, `None` when rejected client-side
        status: Option<u16>,
        /// Summary message
        message: String,
        /// Field-level messages
        fields: Vec<FieldError>,
    },

    /// 401 or 403 response
    #[error("Not authorized (status {status}): {message}")]
    Auth {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Response body could not be decoded
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Error body shape returned by the API for 4xx responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

impl ClientError {
    /// Classify a non-success response
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            401 | 403 => Self::Auth { status, message },
            400..=499 => Self::Validation {
                status: Some(status),
                message,
                fields: parsed
                    .errors
                    .into_iter()
                    .flat_map(|(field, messages)| {
                        messages
                            .into_iter()
                            .map(move |m| FieldError::new(field.clone(), m))
                    })
                    .collect(),
            },
            _ => Self::Network {
                status: Some(status),
                message,
            },
        }
    }

    /// HTTP status code, if a response was received
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } | Self::Validation { status, .. } => *status,
            Self::Auth { status, .. } => Some(*status),
            Self::ResponseParseFailed(_) => None,
        }
    }

    /// Field-level messages (empty for non-validation errors)
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Whether the failure is a transport or server problem a caller might retry
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Whether the failure is an authorization problem
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation {
            status: None,
            message: errors.to_string(),
            fields: errors.0,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::ResponseParseFailed(e.to_string())
        } else {
            Self::Network {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_from_body() {
        let body = r#"{"message":"The given data was invalid.","errors":{"email":["The email must be a valid email address."],"name":["The name field is required."]}}"#;
        let err = ClientError::from_response(422, body);

        assert_eq!(err.status(), Some(422));
        assert_eq!(
            err.field_errors(),
            &[
                FieldError::new("email", "The email must be a valid email address."),
                FieldError::new("name", "The name field is required."),
            ]
        );
        assert_eq!(
            err.to_string(),
            "Validation failed (status 422): The given data was invalid."
        );
    }

    #[test]
    fn test_auth_statuses() {
        assert!(ClientError::from_response(401, "").is_auth());
        assert!(ClientError::from_response(403, r#"{"message":"Forbidden"}"#).is_auth());
    }

    #[test]
    fn test_server_errors_are_network() {
        let err = ClientError::from_response(503, "upstream unavailable");
        assert!(err.is_network());
        assert_eq!(err.to_string(), "Network error (status 503): upstream unavailable");
    }

    #[test]
    fn test_client_side_validation_has_no_status() {
        let mut errors = ValidationErrors::new();
        errors.require("name", "");
        let err = ClientError::from(errors);

        assert_eq!(err.status(), None);
        assert_eq!(err.field_errors().len(), 1);
    }
}
