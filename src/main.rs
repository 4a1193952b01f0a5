//! Merch Store - coin ledger service
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌────────────┐
//! │ Gateway  │───▶│ MerchStore   │───▶│ PostgreSQL │  (balance truth)
//! │ (axum)   │    │ Service      │    └────────────┘
//! └──────────┘    │              │    ┌────────────┐
//!                 │              │───▶│   Redis    │  (fast path, synced after commit)
//!                 └──────────────┘    └────────────┘
//! ```
//!
//! Flags: `--env <name>` (config/<name>.yaml), `--port <n>`, `--in-memory`.

use std::sync::Arc;

use anyhow::{Context, Result};

use merch_store::cache::{BalanceCache, InMemoryBalanceCache, RedisBalanceCache};
use merch_store::catalog::Catalog;
use merch_store::config::AppConfig;
use merch_store::db::Database;
use merch_store::gateway::{self, AppState};
use merch_store::ledger::{Ledger, MemoryLedger, PgLedger, TxManager};
use merch_store::store::{MerchStoreService, ReconcileWorker};
use merch_store::user_auth::{Argon2Hasher, JwtTokenService};

// ============================================================
// COMMAND LINE
// ============================================================

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_in_memory() -> bool {
    std::env::args().any(|a| a == "--in-memory")
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = merch_store::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        version = env!("GIT_HASH"),
        "Starting merch store"
    );

    let catalog = Arc::new(
        Catalog::from_config(app_config.catalog_items().as_deref())
            .context("Invalid merch catalog")?,
    );

    if use_in_memory() {
        tracing::warn!("In-memory mode: nothing is persisted");
        let cache: Arc<dyn BalanceCache> = Arc::new(InMemoryBalanceCache::new());
        serve(
            &app_config,
            Arc::new(MemoryLedger::new()),
            cache,
            catalog,
            None,
        )
        .await
    } else {
        let pg = &app_config.postgres;
        let db = Arc::new(
            Database::connect(&pg.url, pg.max_connections, pg.connect_attempts)
                .await
                .context("Failed to connect to PostgreSQL")?,
        );
        db.ensure_schema()
            .await
            .context("Failed to apply ledger schema")?;

        let redis = RedisBalanceCache::connect(
            &app_config.redis.url,
            app_config.redis.connect_attempts,
        )
        .await
        .context("Failed to connect to Redis")?;
        let cache: Arc<dyn BalanceCache> = Arc::new(redis);

        let ledger = Arc::new(PgLedger::new(db.pool().clone()));
        serve(&app_config, ledger, cache, catalog, Some(db)).await
    }
}

/// Wire the service over the chosen backends and serve until Ctrl-C
async fn serve<L: Ledger>(
    config: &AppConfig,
    ledger: Arc<L>,
    cache: Arc<dyn BalanceCache>,
    catalog: Arc<Catalog>,
    pg_db: Option<Arc<Database>>,
) -> Result<()> {
    catalog
        .load_into(cache.as_ref())
        .await
        .context("Failed to load merch catalog into cache")?;

    let store_config = &config.store;
    let tx = TxManager::with_retry(
        ledger.clone(),
        store_config.tx_max_retries,
        store_config.tx_retry_backoff(),
    );
    let service = MerchStoreService::new(
        tx,
        cache.clone(),
        catalog,
        Arc::new(JwtTokenService::new(
            &config.jwt.secret,
            config.jwt.token_expiry_secs,
        )),
        Arc::new(Argon2Hasher::new()),
        store_config.settings(),
    );

    let reconcile = store_config.reconcile().map(|worker_config| {
        let worker = ReconcileWorker::new(ledger.clone(), cache.clone(), worker_config);
        tokio::spawn(async move {
            worker.run().await;
        })
    });

    let state = Arc::new(AppState::new(Arc::new(service), cache.clone(), pg_db));
    let port = get_port_override().unwrap_or(config.gateway.port);

    let result = gateway::run_server(&config.gateway.host, port, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    })
    .await;

    if let Some(handle) = reconcile {
        handle.abort();
    }
    tracing::info!("Merch store stopped");

    result.context("Gateway server error")
}
