//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! identifier that reaches generated SQL goes through validation and
//! engine-specific quoting here. This closes the injection hole that comes
//! with interpolating caller-supplied table names.

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across engines).
/// PostgreSQL allows 63 bytes, MySQL 64 characters.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier before it is quoted into SQL text.
///
/// Rejects empty names, names containing NUL bytes, and names exceeding the
/// maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains a NUL byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_pg_basic() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn quote_mysql_basic() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn quoting_defuses_injection() {
        // A malicious "table name" ends up as one (nonexistent) identifier,
        // not as extra SQL.
        let quoted = quote_pg("users\"; DROP TABLE users; --").unwrap();
        assert_eq!(quoted, "\"users\"\"; DROP TABLE users; --\"");
    }

    #[test]
    fn validate_rejects_bad_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("has\0nul").is_err());
        assert!(validate_identifier(&"x".repeat(65)).is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_ok());
    }
}
