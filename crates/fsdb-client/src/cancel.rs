use std::future::Future;
use std::sync::Arc;

use fsdb_store::{StoreError, StoreResult};
use tokio::sync::watch;

/// A cancellation flag shared by every clone.
///
/// Attach it with [`Database::with_cancellation`](crate::Database::with_cancellation);
/// once [`cancel`](Self::cancel) is called, every in-flight and future
/// backend call made through that handle fails with `Canceled`.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the signal fires.
    pub async fn canceled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|fired| *fired).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `fut` unless `signal` fires first.
pub(crate) async fn race<T>(
    signal: Option<&CancelSignal>,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    let Some(signal) = signal else {
        return fut.await;
    };
    if signal.is_canceled() {
        return Err(StoreError::Canceled);
    }
    tokio::select! {
        biased;
        _ = signal.canceled() => Err(StoreError::Canceled),
        result = fut => result,
    }
}
