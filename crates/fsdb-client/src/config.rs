use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Database id used when none is configured.
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// Connection settings for a [`Database`](crate::Database).
///
/// ```toml
/// project_id = "acme-prod"
/// database_id = "orders"
///
/// [credentials]
/// kind = "file"
/// path = "/etc/fsdb/service-account.json"
///
/// [transaction]
/// max_attempts = 8
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub project_id: String,
    #[serde(default = "default_database_id")]
    pub database_id: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub transaction: TransactionOptions,
    #[serde(default)]
    pub listen: ListenOptions,
}

fn default_database_id() -> String {
    DEFAULT_DATABASE_ID.to_string()
}

impl ConnectionConfig {
    /// Config for `project_id` with every other setting at its default.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: default_database_id(),
            credentials: Credentials::default(),
            transaction: TransactionOptions::default(),
            listen: ListenOptions::default(),
        }
    }

    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction = options;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("project_id must not be empty".into()));
        }
        if self.database_id.trim().is_empty() {
            return Err(Error::Config("database_id must not be empty".into()));
        }
        self.credentials.validate()?;
        self.transaction.validate()
    }
}

/// How the client authenticates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// Ambient credentials of the environment.
    #[default]
    None,
    /// Service-account key file.
    File { path: PathBuf },
    /// Service-account key given inline.
    Json { json: String },
    /// File holding a bearer access token.
    AccessTokenFile { path: PathBuf },
}

impl Credentials {
    fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::File { path } | Self::AccessTokenFile { path } => {
                if path.is_file() {
                    Ok(())
                } else {
                    Err(Error::Config(format!(
                        "credentials file {} does not exist",
                        path.display()
                    )))
                }
            }
            Self::Json { json } => serde_json::from_str::<serde_json::Value>(json)
                .map(|_| ())
                .map_err(|e| Error::Config(format!("inline credentials are not JSON: {e}"))),
        }
    }
}

/// Retry policy of [`Database::run_transaction`](crate::Database::run_transaction).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Attempts before giving up with `Aborted`. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
        }
    }
}

impl TransactionOptions {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("transaction.max_attempts must be at least 1".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::Config(
                "transaction.initial_backoff_ms exceeds max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// Doubles per attempt up to `max_backoff_ms`; the result is drawn
    /// uniformly from the upper half of that window.
    pub fn backoff(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let exp = attempt.saturating_sub(1).min(20);
        let ceiling = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        Duration::from_millis(ms)
    }
}

/// Behaviour of listen loops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    /// How many times a listener that fell behind its stream subscribes
    /// again from a fresh snapshot before failing. 0 disables this.
    pub max_resubscribes: u32,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            max_resubscribes: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config = ConnectionConfig::from_toml_str(r#"project_id = "acme""#).unwrap();
        assert_eq!(config, ConnectionConfig::new("acme"));
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.transaction.max_attempts, 5);
        assert_eq!(config.credentials, Credentials::None);
    }

    #[test]
    fn full_toml() {
        let text = r#"
            project_id = "acme"
            database_id = "orders"

            [credentials]
            kind = "json"
            json = '{"type": "service_account"}'

            [transaction]
            max_attempts = 8
            max_backoff_ms = 250

            [listen]
            max_resubscribes = 0
        "#;
        let config = ConnectionConfig::from_toml_str(text).unwrap();
        assert_eq!(config.database_id, "orders");
        assert!(matches!(config.credentials, Credentials::Json { .. }));
        assert_eq!(config.transaction.max_attempts, 8);
        assert_eq!(config.transaction.initial_backoff_ms, 10);
        assert_eq!(config.transaction.max_backoff_ms, 250);
        assert_eq!(config.listen.max_resubscribes, 0);
    }

    #[test]
    fn validation_failures() {
        assert!(matches!(
            ConnectionConfig::from_toml_str(r#"project_id = """#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConnectionConfig::from_toml_str("project_id = \"a\"\n[transaction]\nmax_attempts = 0"),
            Err(Error::Config(_))
        ));
        let missing = ConnectionConfig::new("a").with_credentials(Credentials::File {
            path: "/nonexistent/key.json".into(),
        });
        assert!(missing.validate().is_err());
        assert!(ConnectionConfig::from_toml_str("database_id = \"x\"").is_err());
    }

    #[test]
    fn load_from_file_and_write_back() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.json");
        std::fs::write(&key, "{}").unwrap();

        let config = ConnectionConfig::new("acme")
            .with_database("orders")
            .with_credentials(Credentials::File { path: key });
        let file = dir.path().join("fsdb.toml");
        std::fs::write(&file, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(ConnectionConfig::load(&file).unwrap(), config);
    }

    #[test]
    fn backoff_grows_and_is_bounded() {
        let options = TransactionOptions {
            max_attempts: 10,
            initial_backoff_ms: 8,
            max_backoff_ms: 100,
        };
        let first = options.backoff(1);
        assert!(first >= Duration::from_millis(4) && first <= Duration::from_millis(8));
        let third = options.backoff(3);
        assert!(third >= Duration::from_millis(16) && third <= Duration::from_millis(32));
        for attempt in 1..40 {
            assert!(options.backoff(attempt) <= Duration::from_millis(100));
        }
    }
}
