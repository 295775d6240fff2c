//! Client-side payload validation.
//!
//! Entities are checked before they are sent. A payload that fails here never
//! reaches the network; the caller gets the same field-level shape the server
//! would have returned for a 4xx, so forms render both the same way.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("hardcoded email pattern should always compile")
});

/// One failed check on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as it appears in the payload
    pub field: String,
    /// Human readable message
    pub message: String,
}

impl FieldError {
    /// Create a field error
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All failed checks for one payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Validation failed: {}", render(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Empty collector
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Record a failure
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    /// Messages recorded for `field`
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |error| error.field == field)
            .map(|error| error.message.as_str())
    }

    /// Whether no check failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail a required field that is blank
    pub fn require(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "is required");
        }
    }

    /// Fail an optional email field with a malformed address
    pub fn email(&mut self, field: &str, value: &str) {
        if !value.is_empty() && !is_email(value) {
            self.push(field, "must be a valid email address");
        }
    }

    /// Fail a negative amount
    pub fn non_negative(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.push(field, "must not be negative");
        }
    }

    /// `Ok(())` when empty, otherwise the collected errors
    ///
    /// # Errors
    ///
    /// Returns `self` if any check failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Whether `value` looks like an email address
#[must_use]
pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// Client-side checks run before a create or update is sent
pub trait Validate {
    /// Check the payload
    ///
    /// # Errors
    ///
    /// Returns every failed field check.
    fn validate(&self) -> Result<(), ValidationErrors>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_email("ops@acme.io"));
        assert!(!is_email("ops@acme"));
        assert!(!is_email("ops acme.io"));
        assert!(!is_email("@acme.io"));
    }

    #[test]
    fn test_collects_all_failures() {
        let mut errors = ValidationErrors::new();
        errors.require("name", "   ");
        errors.email("email", "nope");
        errors.non_negative("price", -5);
        errors.email("backup_email", "");

        assert_eq!(errors.0.len(), 3);
        assert_eq!(errors.for_field("email").collect::<Vec<_>>(), vec!["must be a valid email address"]);

        let rendered = errors.clone().into_result().err().map(|e| e.to_string());
        assert_eq!(
            rendered.as_deref(),
            Some("Validation failed: name: is required; email: must be a valid email address; price: must not be negative")
        );
    }

    #[test]
    fn test_empty_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }
}
