//! Records and settings of the code allocator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodeError, Result};
use crate::names::validate_collection;

/// A code paired with the owner it was issued to.
///
/// The same record is stored twice: once keyed by code and once keyed by
/// namespace and owner. Both copies exist or neither does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code: String,
    pub namespace: String,
    pub owner_key: String,
    #[serde(default)]
    pub payload: Value,
}

/// Allocator settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Collection holding records keyed by code.
    pub by_code_collection: String,
    /// Collection holding records keyed by `{namespace}_{owner_key}`.
    pub by_owner_collection: String,
    /// Characters per code.
    pub code_length: usize,
    /// Characters a code is drawn from; each random byte picks one modulo
    /// the alphabet size.
    pub alphabet: String,
    /// Candidates drawn per transaction attempt before giving up.
    pub max_draws: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            by_code_collection: "by-code".into(),
            by_owner_collection: "by-owner".into(),
            code_length: 6,
            alphabet: "0123456789".into(),
            max_draws: 20,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        validate_collection(&self.by_code_collection)?;
        validate_collection(&self.by_owner_collection)?;
        if self.by_code_collection == self.by_owner_collection {
            return Err(invalid("collections must differ"));
        }
        if self.code_length == 0 {
            return Err(invalid("code_length must be at least 1"));
        }
        let size = self.alphabet.chars().count();
        if size == 0 || size > 256 {
            return Err(invalid("alphabet must have between 1 and 256 characters"));
        }
        if self.max_draws == 0 {
            return Err(invalid("max_draws must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> CodeError {
    CodeError::Invalid {
        what: "allocator config",
        reason: reason.to_string(),
    }
}

/// Records whose paired entry is missing or points elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Paths of by-code entries without a matching by-owner entry.
    pub orphaned_codes: Vec<String>,
    /// Paths of by-owner entries without a matching by-code entry.
    pub orphaned_owners: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_codes.is_empty() && self.orphaned_owners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orphaned_codes.len() + self.orphaned_owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AllocatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.code_length, 6);
        assert_eq!(config.max_draws, 20);
    }

    #[test]
    fn rejects_bad_settings() {
        let same = AllocatorConfig {
            by_owner_collection: "by-code".into(),
            ..Default::default()
        };
        assert!(same.validate().is_err());

        let empty_alphabet = AllocatorConfig {
            alphabet: String::new(),
            ..Default::default()
        };
        assert!(empty_alphabet.validate().is_err());

        let nested = AllocatorConfig {
            by_code_collection: "a/b".into(),
            ..Default::default()
        };
        assert!(nested.validate().is_err());
    }

    #[test]
    fn record_payload_defaults_to_null() {
        let record: CodeRecord = serde_json::from_str(
            r#"{"code": "123456", "namespace": "mgr", "owner_key": "u1"}"#,
        )
        .unwrap();
        assert_eq!(record.payload, Value::Null);
    }
}
