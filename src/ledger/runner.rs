//! Transaction boundary for units of work

use std::future::Future;

use futures::future::BoxFuture;

use crate::traits::*;
use crate::types::*;

/// Runs a unit of work inside one storage transaction
///
/// Commits when the work returns `Ok`, rolls back when it returns `Err`.
/// If the work panics or its future is dropped, the transaction handle is
/// dropped with it, which also rolls back.
#[derive(Debug, Clone)]
pub struct TxRunner<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> TxRunner<S> {
    /// Create a runner over the given storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Get the underlying storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Execute `work` inside a fresh transaction
    ///
    /// The error returned by `work` is passed through unchanged. A failed
    /// rollback is logged but never replaces that error.
    pub async fn exec_tx<T, F>(&self, work: F) -> LedgerResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut S::Tx) -> BoxFuture<'c, LedgerResult<T>> + Send,
    {
        self.exec_tx_until(work, std::future::pending()).await
    }

    /// Execute `work` inside a fresh transaction unless `cancel` fires first
    ///
    /// `cancel` is only raced against opening the transaction and running
    /// `work`. Once `work` has succeeded the commit runs to completion, so a
    /// `LedgerError::Cancelled` result always means nothing was committed.
    pub async fn exec_tx_until<T, F, C>(&self, work: F, cancel: C) -> LedgerResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut S::Tx) -> BoxFuture<'c, LedgerResult<T>> + Send,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let mut tx = tokio::select! {
            biased;
            tx = self.storage.begin() => tx?,
            _ = &mut cancel => return Err(LedgerError::Cancelled),
        };

        let outcome = tokio::select! {
            biased;
            result = work(&mut tx) => result,
            _ = &mut cancel => Err(LedgerError::Cancelled),
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        error = %err,
                        rollback_error = %rollback_err,
                        "Rollback failed after aborted unit of work"
                    );
                }
                Err(err)
            }
        }
    }
}
