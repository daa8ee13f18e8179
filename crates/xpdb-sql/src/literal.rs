//! SQL literal rendering and identifier validation.
//!
//! Reconciliation statements carry their row data inline as literals, so
//! every value is rendered here. Rendered statement text is in "format form":
//! `%%` stands for one literal `%`. [`unescape_percent`] is the formatting
//! pass applied by the connection right before a statement is sent.

use crate::error::Error;
use crate::types::Value;

/// Validate a SQL identifier (table and column names).
///
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// # Examples
///
/// ```
/// use xpdb_sql::literal::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("entity").is_ok());
/// assert!(validate_sql_identifier("_report_id").is_ok());
///
/// assert!(validate_sql_identifier("x; DROP TABLE entity--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("1abc").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max 255)",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

/// Quote a string as a SQL literal: `'` is doubled, `%` is doubled.
///
/// ```
/// use xpdb_sql::literal::quote_string;
///
/// assert_eq!(quote_string("don't"), "'don''t'");
/// assert_eq!(quote_string("50%"), "'50%%'");
/// ```
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '%' => out.push_str("%%"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Escape a value for interpolation inside an already quoted literal in
/// metadata queries. Only `'` is doubled.
pub fn escape_string_literal(value: &str) -> String {
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

/// Render a value as a SQL literal.
///
/// Non-finite floats have no SQL representation and become `NULL`.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::String(s) => quote_string(s),
        Value::Date(d) => quote_string(&d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => quote_string(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}

/// Pre-escape raw SQL text (such as a DDL script) into format form.
pub fn escape_percent(sql: &str) -> String {
    sql.replace('%', "%%")
}

/// Collapse format-form `%%` back to `%`. A lone `%` is left as is.
pub fn unescape_percent(sql: &str) -> String {
    if !sql.contains("%%") {
        return sql.to_string();
    }
    sql.replace("%%", "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_sql_identifier("filing").is_ok());
        assert!(validate_sql_identifier("data_point").is_ok());
        assert!(validate_sql_identifier("_private").is_ok());
        assert!(validate_sql_identifier("TABLE_123").is_ok());
    }

    #[test]
    fn test_too_long_identifier() {
        assert!(validate_sql_identifier(&"a".repeat(256)).is_err());
        assert!(validate_sql_identifier(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn test_injection_attempts() {
        assert!(validate_sql_identifier("x' OR '1'='1").is_err());
        assert!(validate_sql_identifier("x--").is_err());
        assert!(validate_sql_identifier("user name").is_err());
        assert!(validate_sql_identifier("schema.table").is_err());
        assert!(validate_sql_identifier("tabl\u{0435}").is_err());
    }

    #[test]
    fn test_literal_scalars() {
        assert_eq!(sql_literal(&Value::Null), "NULL");
        assert_eq!(sql_literal(&Value::Bool(true)), "TRUE");
        assert_eq!(sql_literal(&Value::Bool(false)), "FALSE");
        assert_eq!(sql_literal(&Value::Int(-42)), "-42");
        assert_eq!(sql_literal(&Value::Float(2.5)), "2.5");
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(sql_literal(&Value::Float(f64::INFINITY)), "NULL");
        assert_eq!(sql_literal(&Value::Float(f64::NEG_INFINITY)), "NULL");
        assert_eq!(sql_literal(&Value::Float(f64::NAN)), "NULL");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(sql_literal(&Value::from("O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(&Value::from("100%")), "'100%%'");
        assert_eq!(sql_literal(&Value::from("")), "''");
    }

    #[test]
    fn test_temporal_literals() {
        let d = NaiveDate::from_ymd_opt(2012, 12, 31).unwrap();
        assert_eq!(sql_literal(&Value::Date(d)), "'2012-12-31'");

        let dt = d.and_hms_opt(23, 59, 1).unwrap();
        assert_eq!(sql_literal(&Value::DateTime(dt)), "'2012-12-31 23:59:01'");
    }

    #[test]
    fn test_percent_round_trip() {
        let raw = "it's 50% of 100%%";
        let rendered = unescape_percent(&quote_string(raw));
        assert_eq!(rendered, "'it''s 50% of 100%%'");
        assert_eq!(unescape_percent(&escape_percent(raw)), raw);
    }

    #[test]
    fn test_lone_percent_untouched() {
        assert_eq!(unescape_percent("LIKE 'a%'"), "LIKE 'a%'");
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal("entity"), "entity");
        assert_eq!(escape_string_literal("don't"), "don''t");
    }
}
