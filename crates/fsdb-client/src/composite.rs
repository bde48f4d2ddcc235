//! Read-modify-write helpers built on [`Database::run_transaction`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::{Error, Result};

impl Database {
    /// Return the document at `path`, creating it from `create()` if absent.
    ///
    /// Under contention exactly one caller's value is stored; the others
    /// retry and return the stored value. `create` may run more than once.
    pub async fn atomic_get_or_create<T, F>(&self, path: &str, create: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Result<T>,
    {
        let create = &create;
        self.run_transaction(|tx| async move {
            match tx.get::<T>(path).await {
                Ok(existing) => Ok(existing),
                Err(e) if e.is_not_found() => {
                    let value = create()?;
                    tx.add(path, &value).await?;
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Apply `update` to the document at `path` and store the result.
    ///
    /// Fails with `NotFound` if the document does not exist. Returns the
    /// value as written. `update` may run more than once.
    pub async fn atomic_update<T, F>(&self, path: &str, update: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T) -> Result<()>,
    {
        let update = &update;
        self.run_transaction(|tx| async move {
            let mut value: T = tx.get(path).await?;
            update(&mut value)?;
            tx.add_or_replace(path, &value).await?;
            Ok::<_, Error>(value)
        })
        .await
    }
}
