//! Validation of allocator names and the document ids derived from them.

use fsdb_types::escape;

use crate::error::{CodeError, Result};

/// Separator between namespace and owner key in by-owner document ids.
pub const OWNER_SEPARATOR: char = '_';

/// Validate a namespace.
///
/// Namespaces may not be empty or contain [`OWNER_SEPARATOR`], so that
/// `{namespace}_{owner_key}` splits back unambiguously.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(invalid("namespace", "must not be empty"));
    }
    if namespace.contains(OWNER_SEPARATOR) {
        return Err(invalid(
            "namespace",
            &format!("{namespace:?} must not contain '{OWNER_SEPARATOR}'"),
        ));
    }
    Ok(())
}

pub fn validate_owner_key(owner_key: &str) -> Result<()> {
    if owner_key.is_empty() {
        return Err(invalid("owner key", "must not be empty"));
    }
    Ok(())
}

/// Collection names must be one plain path segment.
pub fn validate_collection(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(invalid(
            "collection",
            &format!("{name:?} must be a single non-empty segment"),
        ));
    }
    Ok(())
}

/// Document id of the by-owner entry.
pub fn owner_id(namespace: &str, owner_key: &str) -> String {
    format!("{}{OWNER_SEPARATOR}{}", escape(namespace), escape(owner_key))
}

/// Document id of the by-code entry.
pub fn code_id(code: &str) -> String {
    escape(code)
}

fn invalid(what: &'static str, reason: &str) -> CodeError {
    CodeError::Invalid {
        what,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_rules() {
        assert!(validate_namespace("mgr").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a_b").is_err());
    }

    #[test]
    fn owner_ids_escape_both_parts() {
        assert_eq!(owner_id("mgr", "user/7"), "mgr_user|7");
        assert_eq!(owner_id("m|x", "u"), "m\\|x_u");
        // Distinct owners never share an id.
        assert_ne!(owner_id("a", "b_c"), owner_id("a", "b|c"));
    }

    #[test]
    fn code_ids_are_single_segments() {
        assert!(!code_id("12/34").contains('/'));
    }
}
