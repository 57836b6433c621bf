// ABOUTME: Shared helpers for identifier validation and SQL quoting
// ABOUTME: Guards every identifier interpolated into generated SQL

use anyhow::{bail, Result};

/// Validate a PostgreSQL identifier (schema, table, or column name).
///
/// Identifiers discovered from the catalog are interpolated into generated
/// SQL, so everything that reaches a query string passes through here first.
/// Rules enforced:
/// - 1-63 characters
/// - starts with a letter or underscore
/// - contains only letters, digits, and underscores
///
/// # Examples
///
/// ```
/// # use postgres_table_backup::utils::validate_identifier;
/// assert!(validate_identifier("orders").is_ok());
/// assert!(validate_identifier("_audit_log").is_ok());
/// assert!(validate_identifier("123abc").is_err());
/// assert!(validate_identifier("t\"; DROP TABLE x; --").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    // PostgreSQL truncates at 63 bytes; anything longer is suspect input
    if trimmed.len() > 63 {
        bail!(
            "Identifier '{}' exceeds maximum length of 63 characters (got {})",
            sanitize_for_display(trimmed),
            trimmed.len()
        );
    }

    let first = trimmed.chars().next().unwrap_or('\0');
    if !first.is_ascii_alphabetic() && first != '_' {
        bail!(
            "Identifier '{}' must start with a letter or underscore, not '{}'",
            sanitize_for_display(trimmed),
            first
        );
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_for_display(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Double-quote an identifier for safe use in SQL text.
///
/// Embedded quotes are doubled per the SQL standard. Use together with
/// [`validate_identifier`] for identifiers from untrusted input.
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Strip control characters and cap length so hostile identifiers cannot
/// inject into log output or error messages.
pub fn sanitize_for_display(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_identifiers() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("table_2024").is_ok());
        assert!(validate_identifier("A").is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("   ").is_err());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_identifier("1users").is_err());
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(validate_identifier("users; DROP TABLE users").is_err());
        assert!(validate_identifier("users\"--").is_err());
        assert!(validate_identifier("users name").is_err());
    }

    #[test]
    fn rejects_overlong_identifier() {
        let long = "a".repeat(64);
        assert!(validate_identifier(&long).is_err());
        let max = "a".repeat(63);
        assert!(validate_identifier(&max).is_ok());
    }

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_display("tab\nle"), "table");
        assert_eq!(sanitize_for_display(&"x".repeat(200)).len(), 100);
    }
}
