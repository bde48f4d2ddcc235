//! The [`CodeAllocator`].

use std::collections::HashMap;
use std::sync::Arc;

use fsdb_client::{Database, Transaction};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{CodeError, Result};
use crate::names::{code_id, owner_id, validate_namespace, validate_owner_key};
use crate::source::{CodeSource, OsCodeSource};
use crate::types::{AllocatorConfig, AuditReport, CodeRecord};

/// Issues short random codes, each unique across the database and tied to
/// one `(namespace, owner_key)` pair.
///
/// Every operation runs in a single transaction, so the by-code and
/// by-owner entries of a record are created, rewritten, and deleted
/// together.
#[derive(Clone)]
pub struct CodeAllocator {
    db: Database,
    config: AllocatorConfig,
    alphabet: Vec<char>,
    source: Arc<dyn CodeSource>,
}

impl CodeAllocator {
    /// Allocator with default settings drawing from the OS CSPRNG.
    pub fn new(db: Database) -> Self {
        let config = AllocatorConfig::default();
        Self {
            db,
            alphabet: config.alphabet.chars().collect(),
            config,
            source: Arc::new(OsCodeSource),
        }
    }

    pub fn with_config(
        db: Database,
        config: AllocatorConfig,
        source: Arc<dyn CodeSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            alphabet: config.alphabet.chars().collect(),
            config,
            source,
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    fn code_path(&self, code: &str) -> String {
        format!("{}/{}", self.config.by_code_collection, code_id(code))
    }

    fn owner_path(&self, namespace: &str, owner_key: &str) -> String {
        format!(
            "{}/{}",
            self.config.by_owner_collection,
            owner_id(namespace, owner_key)
        )
    }

    fn draw(&self) -> Result<String> {
        let mut buf = vec![0u8; self.config.code_length];
        self.source.fill(&mut buf)?;
        Ok(buf
            .iter()
            .map(|b| self.alphabet[usize::from(*b) % self.alphabet.len()])
            .collect())
    }

    /// Return the code of `(namespace, owner_key)`, issuing one if needed.
    ///
    /// An owner that already holds a code gets it back unchanged, and
    /// `payload` is ignored. Otherwise candidates are drawn until one is
    /// free; after `max_draws` collisions the call fails with
    /// `CodespaceExhausted` and nothing is written.
    pub async fn allocate<P: Serialize + ?Sized>(
        &self,
        namespace: &str,
        owner_key: &str,
        payload: &P,
    ) -> Result<CodeRecord> {
        validate_namespace(namespace)?;
        validate_owner_key(owner_key)?;
        let payload = serde_json::to_value(payload).map_err(fsdb_client::Error::from)?;
        let owner_path = self.owner_path(namespace, owner_key);
        let (payload, owner_path) = (&payload, owner_path.as_str());

        self.db
            .run_transaction(|tx| async move {
                if let Some(existing) = read_optional(&tx, owner_path).await? {
                    debug!(code = %existing.code, namespace, "owner already holds a code");
                    return Ok(existing);
                }

                for draw in 1..=self.config.max_draws {
                    let record = CodeRecord {
                        code: self.draw()?,
                        namespace: namespace.to_string(),
                        owner_key: owner_key.to_string(),
                        payload: payload.clone(),
                    };
                    match tx.add(&self.code_path(&record.code), &record).await {
                        Ok(()) => {
                            tx.add(owner_path, &record).await?;
                            info!(code = %record.code, namespace, draw, "code allocated");
                            return Ok(record);
                        }
                        Err(e) if e.is_already_exists() => {
                            debug!(code = %record.code, draw, "code collision");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(CodeError::CodespaceExhausted {
                    attempts: self.config.max_draws,
                })
            })
            .await
    }

    pub async fn lookup_by_code(&self, code: &str) -> Result<CodeRecord> {
        match self.db.get(&self.code_path(code)).await {
            Err(e) if e.is_not_found() => Err(CodeError::NotFound {
                key: code.to_string(),
            }),
            other => Ok(other?),
        }
    }

    pub async fn lookup_by_owner(&self, namespace: &str, owner_key: &str) -> Result<CodeRecord> {
        validate_namespace(namespace)?;
        match self.db.get(&self.owner_path(namespace, owner_key)).await {
            Err(e) if e.is_not_found() => Err(CodeError::NotFound {
                key: format!("{namespace}/{owner_key}"),
            }),
            other => Ok(other?),
        }
    }

    /// [`lookup_by_code`](Self::lookup_by_code) inside a caller's transaction.
    pub async fn lookup_by_code_in(&self, tx: &Transaction, code: &str) -> Result<CodeRecord> {
        read_optional(tx, &self.code_path(code))
            .await?
            .ok_or_else(|| CodeError::NotFound {
                key: code.to_string(),
            })
    }

    /// Owner lookup inside a caller's transaction; `None` if the owner
    /// holds no code.
    pub async fn lookup_by_owner_in(
        &self,
        tx: &Transaction,
        namespace: &str,
        owner_key: &str,
    ) -> Result<Option<CodeRecord>> {
        validate_namespace(namespace)?;
        read_optional(tx, &self.owner_path(namespace, owner_key)).await
    }

    /// Rewrite the payload of an owner's record, in both entries.
    pub async fn update_payload<F>(
        &self,
        namespace: &str,
        owner_key: &str,
        update: F,
    ) -> Result<CodeRecord>
    where
        F: Fn(&mut Value) -> Result<()>,
    {
        validate_namespace(namespace)?;
        let owner_path = self.owner_path(namespace, owner_key);
        let (owner_path, update) = (owner_path.as_str(), &update);

        self.db
            .run_transaction(|tx| async move {
                let mut record =
                    read_optional(&tx, owner_path)
                        .await?
                        .ok_or_else(|| CodeError::NotFound {
                            key: format!("{namespace}/{owner_key}"),
                        })?;
                update(&mut record.payload)?;
                tx.add_or_replace(&self.code_path(&record.code), &record)
                    .await?;
                tx.add_or_replace(owner_path, &record).await?;
                Ok::<_, CodeError>(record)
            })
            .await
    }

    /// Delete an owner's record, both entries at once.
    pub async fn release(&self, namespace: &str, owner_key: &str) -> Result<CodeRecord> {
        validate_namespace(namespace)?;
        let owner_path = self.owner_path(namespace, owner_key);
        let owner_path = owner_path.as_str();

        let record = self
            .db
            .run_transaction(|tx| async move {
                let record = read_optional(&tx, owner_path)
                    .await?
                    .ok_or_else(|| CodeError::NotFound {
                        key: format!("{namespace}/{owner_key}"),
                    })?;
                tx.delete(owner_path).await?;
                tx.delete(&self.code_path(&record.code)).await?;
                Ok::<_, CodeError>(record)
            })
            .await?;
        info!(code = %record.code, namespace, "code released");
        Ok(record)
    }

    /// Every record, optionally limited to one namespace, ordered by code.
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<CodeRecord>> {
        let records = self
            .db
            .documents(&self.config.by_code_collection)?
            .collect_as::<CodeRecord>()
            .await?;
        Ok(records
            .into_iter()
            .map(|(_, record)| record)
            .filter(|r| namespace.map_or(true, |ns| r.namespace == ns))
            .collect())
    }

    /// Find entries whose twin is missing or disagrees.
    pub async fn audit(&self) -> Result<AuditReport> {
        self.db
            .run_transaction(|tx| async move { self.audit_in(&tx).await })
            .await
    }

    /// Delete every orphan found by [`audit`](Self::audit) in one
    /// transaction. Returns what was removed.
    pub async fn repair(&self) -> Result<AuditReport> {
        let report = self
            .db
            .run_transaction(|tx| async move {
                let report = self.audit_in(&tx).await?;
                for path in report.orphaned_codes.iter().chain(&report.orphaned_owners) {
                    tx.delete(path).await?;
                }
                Ok::<_, CodeError>(report)
            })
            .await?;
        if !report.is_clean() {
            info!(removed = report.len(), "orphaned code entries removed");
        }
        Ok(report)
    }

    async fn audit_in(&self, tx: &Transaction) -> Result<AuditReport> {
        let codes: HashMap<String, CodeRecord> = tx
            .documents(&self.config.by_code_collection)?
            .collect_as::<CodeRecord>()
            .await?
            .into_iter()
            .map(|(path, record)| (path.id().to_string(), record))
            .collect();
        let owners: HashMap<String, CodeRecord> = tx
            .documents(&self.config.by_owner_collection)?
            .collect_as::<CodeRecord>()
            .await?
            .into_iter()
            .map(|(path, record)| (path.id().to_string(), record))
            .collect();

        let mut report = AuditReport::default();
        for (id, record) in &codes {
            let paired = *id == code_id(&record.code)
                && owners
                    .get(&owner_id(&record.namespace, &record.owner_key))
                    .is_some_and(|owner| owner.code == record.code);
            if !paired {
                report.orphaned_codes.push(self.code_path_from_id(id));
            }
        }
        for (id, record) in &owners {
            let paired = *id == owner_id(&record.namespace, &record.owner_key)
                && codes.get(&code_id(&record.code)).is_some_and(|code| {
                    owner_id(&code.namespace, &code.owner_key) == *id
                });
            if !paired {
                report
                    .orphaned_owners
                    .push(format!("{}/{id}", self.config.by_owner_collection));
            }
        }
        report.orphaned_codes.sort();
        report.orphaned_owners.sort();
        Ok(report)
    }

    fn code_path_from_id(&self, id: &str) -> String {
        format!("{}/{id}", self.config.by_code_collection)
    }
}

impl std::fmt::Debug for CodeAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeAllocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn read_optional(tx: &Transaction, path: &str) -> Result<Option<CodeRecord>> {
    match tx.get::<CodeRecord>(path).await {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
