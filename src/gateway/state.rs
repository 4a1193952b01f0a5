use std::sync::Arc;

use crate::cache::BalanceCache;
use crate::db::Database;
use crate::store::MerchStore;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    /// Merch store service
    pub store: Arc<dyn MerchStore>,
    /// Balance cache, pinged by the health check
    pub cache: Arc<dyn BalanceCache>,
    /// PostgreSQL pool for health checks (absent in in-memory mode)
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MerchStore>,
        cache: Arc<dyn BalanceCache>,
        pg_db: Option<Arc<Database>>,
    ) -> Self {
        Self {
            store,
            cache,
            pg_db,
        }
    }
}
