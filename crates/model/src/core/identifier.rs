use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsafe SQL identifier: '{0}'")]
pub struct IdentifierError(pub String);

/// Allow-list check for SQL identifiers that end up in generated statements.
///
/// Table and column names come exclusively from configuration, never from
/// data, and every configured name must pass this check at load time so
/// query generation can assume its inputs are clean. Dotted schema
/// qualification (`dbo.traffic_log`) is allowed; each segment must be a
/// plain identifier.
pub fn is_safe_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Validate an identifier, returning it unchanged on success.
pub fn ensure_identifier(name: &str) -> Result<&str, IdentifierError> {
    if is_safe_identifier(name) {
        Ok(name)
    } else {
        Err(IdentifierError(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_qualified_names() {
        assert!(is_safe_identifier("traffic_log"));
        assert!(is_safe_identifier("dbo.traffic_log"));
        assert!(is_safe_identifier("_internal"));
    }

    #[test]
    fn rejects_injection_shapes() {
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("t; DROP TABLE x"));
        assert!(!is_safe_identifier("1starts_with_digit"));
        assert!(!is_safe_identifier("a..b"));
        assert!(!is_safe_identifier("col name"));
        assert!(!is_safe_identifier("col'name"));
    }

    #[test]
    fn ensure_returns_borrowed_name() {
        assert_eq!(ensure_identifier("store_id"), Ok("store_id"));
        assert!(ensure_identifier("bad ident").is_err());
    }
}
