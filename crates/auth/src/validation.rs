//! Field-level input validation errors (HTTP 422).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AuthError;

/// Validation messages keyed by input field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single failing field.
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

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// First message, in field order. Used as the human-readable summary.
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }

    /// `Ok(())` when nothing failed, otherwise [`AuthError::Validation`].
    pub fn into_result(self) -> Result<(), AuthError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(self))
        }
    }

    /// Returns the trimmed value, or records "field is required".
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                self.add(field, format!("The {} field is required.", field.replace('_', " ")));
                None
            }
        }
    }
}

impl core::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.first_message().unwrap_or("The given data was invalid."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_records_missing_fields() {
        let mut errors = ValidationErrors::new();
        assert_eq!(errors.required("email", Some("  a@x.com ")), Some("a@x.com"));
        assert_eq!(errors.required("tenant_slug", Some("   ")), None);
        assert_eq!(errors.required("password", None), None);

        assert_eq!(
            errors.get("tenant_slug").unwrap(),
            ["The tenant slug field is required."]
        );
        assert!(errors.has("password"));
        assert!(!errors.has("email"));
        assert!(matches!(errors.into_result(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn serializes_as_field_map() {
        let errors = ValidationErrors::single("email", "The email has already been taken.");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({ "email": ["The email has already been taken."] })
        );
    }
}
