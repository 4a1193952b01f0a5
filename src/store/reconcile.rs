//! Reconcile Worker
//!
//! Background worker that copies ledger balances into the cache, bounding
//! how long a stale or cold entry can survive.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cache::BalanceCache;
use crate::core_types::AccountId;
use crate::ledger::{ExecCtx, Ledger, LedgerError};

/// Configuration for the reconcile worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between sweeps
    pub interval: Duration,
    /// Accounts read from the ledger per page
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

/// Result of one full pass over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub failed: usize,
}

/// Reconcile Worker
///
/// Periodically overwrites every cached balance with the ledger value.
/// Reads go to the pool directly; no transaction spans a sweep.
pub struct ReconcileWorker<L: Ledger> {
    ledger: Arc<L>,
    cache: Arc<dyn BalanceCache>,
    config: WorkerConfig,
}

impl<L: Ledger> ReconcileWorker<L> {
    pub fn new(ledger: Arc<L>, cache: Arc<dyn BalanceCache>, config: WorkerConfig) -> Self {
        Self {
            ledger,
            cache,
            config,
        }
    }

    /// Run the reconcile loop
    ///
    /// This method runs forever; abort its task to stop it.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting reconcile worker"
        );

        loop {
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Reconcile sweep failed");
            }

            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// One pass over all accounts.
    ///
    /// A failed cache write is counted and logged; the sweep continues.
    pub async fn sweep(&self) -> Result<SweepReport, LedgerError> {
        let mut report = SweepReport::default();
        let mut after: AccountId = 0;
        let batch_size = self.config.batch_size.max(1);

        loop {
            let page = self
                .ledger
                .list_balances(&mut ExecCtx::pool(), after, batch_size)
                .await?;

            for &(account_id, balance) in &page {
                report.scanned += 1;
                if let Err(e) = self.cache.set_balance(account_id, balance).await {
                    report.failed += 1;
                    error!(account_id, error = %e, "Failed to reconcile cached balance");
                }
            }

            match page.last() {
                Some(&(last_id, _)) if page.len() as i64 == batch_size => after = last_id,
                _ => break,
            }
            debug!(after, "Reconcile page done");
        }

        info!(
            scanned = report.scanned,
            failed = report.failed,
            "Reconcile sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryBalanceCache;
    use crate::ledger::{AccountRepository, MemoryLedger};
    use crate::models::NewAccount;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.batch_size, 500);
    }

    #[tokio::test]
    async fn test_sweep_overwrites_stale_and_cold_entries() {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(InMemoryBalanceCache::new());
        let mut ids = Vec::new();
        for (i, balance) in [100, 200, 300, 400, 500].into_iter().enumerate() {
            let id = ledger
                .create_account(
                    &mut ExecCtx::pool(),
                    &NewAccount {
                        username: format!("user{}", i),
                        password_hash: "h".to_string(),
                        initial_balance: balance,
                    },
                )
                .await
                .unwrap();
            ids.push(id);
        }
        // One stale, the rest cold
        cache.set_balance(ids[0], 999).await.unwrap();

        let worker = ReconcileWorker::new(
            ledger.clone(),
            cache.clone(),
            WorkerConfig {
                interval: Duration::from_secs(1),
                batch_size: 2,
            },
        );
        let report = worker.sweep().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 5,
                failed: 0
            }
        );
        assert_eq!(cache.get_balance(ids[0]).await, Ok(100));
        assert_eq!(cache.get_balance(ids[4]).await, Ok(500));
    }

    #[tokio::test]
    async fn test_sweep_empty_ledger() {
        let worker = ReconcileWorker::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(InMemoryBalanceCache::new()),
            WorkerConfig::default(),
        );
        assert_eq!(worker.sweep().await.unwrap(), SweepReport::default());
    }
}
