use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core_types::Coins;
use crate::store::{StoreSettings, WorkerConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Replaces the built-in merch table when present
    #[serde(default)]
    pub catalog: Option<Vec<CatalogItem>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: i64,
}

/// Merch store tuning. Missing keys take the defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub initial_balance: Coins,
    /// Extra attempts after a serialization failure
    pub tx_max_retries: u32,
    pub tx_retry_backoff_ms: u64,
    pub cache_sync_timeout_ms: u64,
    /// 0 disables the reconcile worker
    pub reconcile_interval_secs: u64,
    pub reconcile_batch: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1000,
            tx_max_retries: 3,
            tx_retry_backoff_ms: 20,
            cache_sync_timeout_ms: 500,
            reconcile_interval_secs: 300,
            reconcile_batch: 500,
        }
    }
}

impl StoreConfig {
    pub fn settings(&self) -> StoreSettings {
        StoreSettings {
            initial_balance: self.initial_balance,
            cache_sync_timeout: Duration::from_millis(self.cache_sync_timeout_ms),
        }
    }

    pub fn tx_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.tx_retry_backoff_ms)
    }

    /// `None` when the worker is disabled
    pub fn reconcile(&self) -> Option<WorkerConfig> {
        (self.reconcile_interval_secs > 0).then(|| WorkerConfig {
            interval: Duration::from_secs(self.reconcile_interval_secs),
            batch_size: self.reconcile_batch,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogItem {
    pub name: String,
    pub price: Coins,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_token_expiry_secs() -> i64 {
    24 * 3600
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `DATABASE_URL`, `REDIS_URL` and `JWT_SECRET_KEY` win over the file
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.postgres.url = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(secret) = lookup("JWT_SECRET_KEY") {
            self.jwt.secret = secret;
        }
    }

    pub fn catalog_items(&self) -> Option<Vec<(String, Coins)>> {
        self.catalog.as_ref().map(|items| {
            items
                .iter()
                .map(|item| (item.name.clone(), item.price))
                .collect()
        })
    }
}
