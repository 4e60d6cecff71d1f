//! # Validation
//!
//! Boundary checks for desired configuration. Every reconciler validates its
//! desired struct once, before the first remote call, so invalid input never
//! reaches the admin API.
//!
//! Constraints follow Garage / S3 naming rules:
//! - Bucket aliases: <https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html>
//! - Key names are free text but must be printable

use crate::permissions::Permissions;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Lowercase letters, digits, dots and hyphens; 3-63 characters; alphanumeric at both ends
const BUCKET_ALIAS_PATTERN: &str = r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$";

static BUCKET_ALIAS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(BUCKET_ALIAS_PATTERN).expect("Failed to compile bucket alias pattern")
});

/// Longest key name accepted
const MAX_KEY_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate an access key display name
pub fn validate_key_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name", "is required but is empty"));
    }

    if name.len() > MAX_KEY_NAME_LEN {
        return Err(ValidationError::new(
            "name",
            format!("must be at most {MAX_KEY_NAME_LEN} bytes (got {})", name.len()),
        ));
    }

    if name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "name",
            "must not contain control characters",
        ));
    }

    Ok(())
}

/// Validate a bucket global alias
pub fn validate_bucket_alias(alias: &str) -> Result<(), ValidationError> {
    if alias.is_empty() {
        return Err(ValidationError::new(
            "global_alias",
            "must not be empty; omit it to create a bucket without an alias",
        ));
    }

    if !BUCKET_ALIAS_REGEX.is_match(alias) {
        return Err(ValidationError::new(
            "global_alias",
            format!(
                "'{alias}' must be a valid bucket name (3-63 characters, lowercase letters/numbers/dots/hyphens, must start and end with a letter or number)"
            ),
        ));
    }

    // Consecutive dots are rejected by S3 clients
    if alias.contains("..") {
        return Err(ValidationError::new(
            "global_alias",
            format!("'{alias}' cannot contain consecutive dots"),
        ));
    }

    Ok(())
}

/// Validate a server-assigned identifier (bucket id or access key id)
///
/// Identifiers are opaque, but a `/` would make the printed grant identity
/// ambiguous and whitespace is never produced by the server.
pub fn validate_identifier(field: &'static str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new(field, "is required but is empty"));
    }

    if id.contains('/') {
        return Err(ValidationError::new(field, format!("'{id}' cannot contain '/'")));
    }

    if id.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(
            field,
            format!("'{id}' cannot contain whitespace"),
        ));
    }

    Ok(())
}

/// A grant being created must give the key at least one capability
pub fn validate_grant_permissions(permissions: &Permissions) -> Result<(), ValidationError> {
    if permissions.is_empty() {
        return Err(ValidationError::new(
            "permissions",
            "at least one of read, write or owner must be true",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_valid() {
        assert!(validate_key_name("alice").is_ok());
        assert!(validate_key_name("ci deploy key (prod)").is_ok());
    }

    #[test]
    fn test_key_name_invalid() {
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("   ").is_err());
        assert!(validate_key_name("tab\there").is_err());
        assert!(validate_key_name(&"k".repeat(MAX_KEY_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_bucket_alias_pattern_compiles() {
        assert!(BUCKET_ALIAS_REGEX.is_match("logs"));
        assert!(!BUCKET_ALIAS_REGEX.is_match("Logs"));
    }

    #[test]
    fn test_bucket_alias_valid() {
        for alias in ["logs", "my-bucket", "backups.2024", "a1b"] {
            assert!(validate_bucket_alias(alias).is_ok(), "{alias} should be valid");
        }
    }

    #[test]
    fn test_bucket_alias_invalid() {
        let too_long = "a".repeat(64);
        for alias in [
            "",
            "ab",
            "Logs",
            "-logs",
            "logs-",
            "under_score",
            "two..dots",
            too_long.as_str(),
        ] {
            let err = validate_bucket_alias(alias).unwrap_err();
            assert_eq!(err.field, "global_alias", "{alias}");
        }
    }

    #[test]
    fn test_identifier() {
        assert!(validate_identifier("bucket_id", "b1f0c2").is_ok());
        assert!(validate_identifier("access_key_id", "GK31c2f218a2e44f485b94239e").is_ok());

        assert_eq!(
            validate_identifier("bucket_id", "").unwrap_err().field,
            "bucket_id"
        );
        assert!(validate_identifier("bucket_id", "a/b").is_err());
        assert!(validate_identifier("access_key_id", "GK 1").is_err());
    }

    #[test]
    fn test_grant_permissions() {
        assert!(validate_grant_permissions(&Permissions::new(true, false, false)).is_ok());
        assert!(validate_grant_permissions(&Permissions::default()).is_err());
    }

    #[test]
    fn test_error_display_names_field() {
        let err = ValidationError::new("name", "is required but is empty");
        assert_eq!(err.to_string(), "name: is required but is empty");
    }
}
