//! Merch store: the service that keeps ledger and cache consistent,
//! its error taxonomy, and the background reconcile sweep.

pub mod error;
pub mod reconcile;
pub mod service;

pub use error::StoreError;
pub use reconcile::{ReconcileWorker, SweepReport, WorkerConfig};
pub use service::{
    CacheSync, Committed, MerchStore, MerchStoreService, PurchaseReceipt, Session, StoreSettings,
    TransferReceipt,
};
