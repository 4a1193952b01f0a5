//! Transaction Manager
//!
//! Runs a unit of work inside one ledger transaction:
//!
//! ```text
//! begin(opts) ──▶ unit_of_work(ExecCtx::in_tx) ──Ok──▶ commit ──Ok──▶ value
//!                        │                               │
//!                       Err ──▶ rollback ──▶ Err        Err ──▶ Commit error
//! ```
//!
//! Serialization failures (from a statement or from commit) re-run the
//! whole unit of work a bounded number of times. Dropping the returned
//! future drops the open transaction, which rolls it back.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use super::{ExecCtx, LedgerError, TxBackend, TxOptions};

/// Error type a unit of work may return.
///
/// Ledger errors raised by begin/commit are converted into it, and the
/// manager asks it whether a retry is worthwhile.
pub trait TxError: From<LedgerError> + Send {
    fn is_serialization_failure(&self) -> bool;
}

impl TxError for LedgerError {
    fn is_serialization_failure(&self) -> bool {
        LedgerError::is_serialization_failure(self)
    }
}

/// Transaction manager over a ledger backend
pub struct TxManager<L> {
    backend: Arc<L>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<L> Clone for TxManager<L> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        }
    }
}

impl<L: TxBackend> TxManager<L> {
    /// No retries: serialization failures surface immediately
    pub fn new(backend: Arc<L>) -> Self {
        Self::with_retry(backend, 0, Duration::ZERO)
    }

    /// Retry serialization failures up to `max_retries` extra times,
    /// sleeping `retry_backoff * attempt` in between
    pub fn with_retry(backend: Arc<L>, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            backend,
            max_retries,
            retry_backoff,
        }
    }

    /// Backend for statements that run outside a transaction
    pub fn backend(&self) -> &Arc<L> {
        &self.backend
    }

    /// Run `unit_of_work` inside one transaction and commit it.
    ///
    /// The unit-of-work error is returned unchanged after rollback. A commit
    /// failure is returned as `LedgerError::Commit` (converted into `E`).
    pub async fn with_tx<T, E, F>(&self, opts: TxOptions, unit_of_work: F) -> Result<T, E>
    where
        T: Send,
        E: TxError,
        F: for<'c> Fn(ExecCtx<'c, L::Tx>) -> BoxFuture<'c, Result<T, E>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.run_once(opts, &unit_of_work).await {
                Err(e) if e.is_serialization_failure() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        %opts,
                        "Serialization conflict, retrying transaction"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn run_once<T, E, F>(&self, opts: TxOptions, unit_of_work: &F) -> Result<T, E>
    where
        T: Send,
        E: TxError,
        F: for<'c> Fn(ExecCtx<'c, L::Tx>) -> BoxFuture<'c, Result<T, E>> + Send + Sync,
    {
        let mut tx = self.backend.begin(opts).await.map_err(|e| {
            error!(error = %e, %opts, "Begin transaction failed");
            E::from(e)
        })?;

        let result = unit_of_work(ExecCtx::in_tx(&mut tx)).await;

        match result {
            Ok(value) => {
                self.backend.commit(tx).await.map_err(|e| {
                    error!(error = %e, %opts, "Commit transaction failed");
                    E::from(e)
                })?;
                Ok(value)
            }
            Err(e) => {
                match self.backend.rollback(tx).await {
                    Ok(()) => {}
                    Err(LedgerError::TxClosed) => {
                        debug!("Rollback skipped: transaction already closed");
                    }
                    Err(rollback_err) => {
                        error!(error = %rollback_err, "Rollback transaction failed");
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that records lifecycle calls and fails commit on demand
    #[derive(Default)]
    struct ScriptedBackend {
        log: Mutex<Vec<String>>,
        commit_failures: AtomicU32,
        commit_error: Mutex<Option<LedgerError>>,
        rollback_closed: bool,
    }

    impl ScriptedBackend {
        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TxBackend for ScriptedBackend {
        type Tx = Vec<&'static str>;

        async fn begin(&self, opts: TxOptions) -> Result<Self::Tx, LedgerError> {
            self.log.lock().unwrap().push(format!("begin {}", opts));
            Ok(Vec::new())
        }

        async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError> {
            if self.commit_failures.load(Ordering::SeqCst) > 0 {
                self.commit_failures.fetch_sub(1, Ordering::SeqCst);
                self.log.lock().unwrap().push("commit failed".to_string());
                let err = self.commit_error.lock().unwrap().clone();
                return Err(err.unwrap_or(LedgerError::SerializationFailure("40001".into())));
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("commit {}", tx.join(",")));
            Ok(())
        }

        async fn rollback(&self, _tx: Self::Tx) -> Result<(), LedgerError> {
            self.log.lock().unwrap().push("rollback".to_string());
            if self.rollback_closed {
                Err(LedgerError::TxClosed)
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = TxManager::new(backend.clone());

        let value: Result<u32, LedgerError> = manager
            .with_tx::<_, LedgerError, _>(TxOptions::read_write_serializable(), |mut ctx| {
                Box::pin(async move {
                    if let Some(tx) = ctx.tx() {
                        tx.push("write");
                    }
                    Ok(42)
                })
            })
            .await;

        assert_eq!(value, Ok(42));
        assert_eq!(
            backend.calls(),
            vec!["begin SERIALIZABLE READ WRITE", "commit write"]
        );
    }

    #[tokio::test]
    async fn test_rollback_propagates_original_error() {
        let backend = Arc::new(ScriptedBackend {
            rollback_closed: true,
            ..Default::default()
        });
        let manager = TxManager::new(backend.clone());

        let result: Result<(), LedgerError> = manager
            .with_tx::<_, LedgerError, _>(TxOptions::read_only_committed(), |_ctx| {
                Box::pin(async move { Err(LedgerError::NotFound("account 9".into())) })
            })
            .await;

        // TxClosed on rollback is swallowed; the unit-of-work error wins
        assert_eq!(result, Err(LedgerError::NotFound("account 9".into())));
        assert_eq!(
            backend.calls(),
            vec!["begin READ COMMITTED READ ONLY", "rollback"]
        );
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.commit_failures.store(1, Ordering::SeqCst);
        *backend.commit_error.lock().unwrap() = Some(LedgerError::Commit("conn reset".into()));
        let manager = TxManager::with_retry(backend.clone(), 3, Duration::ZERO);

        let result: Result<(), LedgerError> = manager
            .with_tx::<_, LedgerError, _>(TxOptions::read_write_serializable(), |_ctx| {
                Box::pin(async move { Ok(()) })
            })
            .await;

        // Not a serialization failure: no retry
        assert_eq!(result, Err(LedgerError::Commit("conn reset".into())));
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_serialization_failure_retried_then_succeeds() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.commit_failures.store(2, Ordering::SeqCst);
        let manager = TxManager::with_retry(backend.clone(), 3, Duration::from_millis(1));
        let runs = Arc::new(AtomicU32::new(0));

        let r = runs.clone();
        let result: Result<u32, LedgerError> = manager
            .with_tx::<_, LedgerError, _>(TxOptions::read_write_serializable(), move |_ctx| {
                let r = r.clone();
                Box::pin(async move { Ok(r.fetch_add(1, Ordering::SeqCst) + 1) })
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_serialization_failure_exhausts_retries() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.commit_failures.store(10, Ordering::SeqCst);
        let manager = TxManager::with_retry(backend.clone(), 2, Duration::ZERO);

        let result: Result<(), LedgerError> = manager
            .with_tx::<_, LedgerError, _>(TxOptions::read_write_serializable(), |_ctx| {
                Box::pin(async move { Ok(()) })
            })
            .await;

        assert!(matches!(result, Err(LedgerError::SerializationFailure(_))));
        // 1 attempt + 2 retries, each begin + failed commit
        assert_eq!(backend.calls().len(), 6);
    }
}
