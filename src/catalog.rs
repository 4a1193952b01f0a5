//! Merch catalog loader
//!
//! The catalog is fixed for the life of the process: built once from the
//! default table (or the config override), validated, and pushed into the
//! cache before the gateway accepts traffic.

use std::collections::HashSet;

use thiserror::Error;

use crate::cache::{BalanceCache, CacheError};
use crate::core_types::Coins;

/// Default merchandise table
pub const DEFAULT_CATALOG: &[(&str, Coins)] = &[
    ("t-shirt", 80),
    ("cup", 20),
    ("book", 50),
    ("pen", 10),
    ("powerbank", 200),
    ("hoody", 300),
    ("umbrella", 200),
    ("socks", 10),
    ("wallet", 50),
    ("pink-hoody", 500),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog is empty")]
    Empty,

    #[error("Merch name must not be blank")]
    BlankName,

    #[error("Duplicate merch item: {0}")]
    Duplicate(String),

    #[error("Price of {name} must be positive, got {price}")]
    NonPositivePrice { name: String, price: Coins },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Validated merch name -> price list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<(String, Coins)>,
}

impl Catalog {
    pub fn new(items: Vec<(String, Coins)>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for (name, price) in &items {
            if name.trim().is_empty() {
                return Err(CatalogError::BlankName);
            }
            if *price <= 0 {
                return Err(CatalogError::NonPositivePrice {
                    name: name.clone(),
                    price: *price,
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(CatalogError::Duplicate(name.clone()));
            }
        }
        Ok(Self { items })
    }

    /// Config override if present, default table otherwise
    pub fn from_config(overrides: Option<&[(String, Coins)]>) -> Result<Self, CatalogError> {
        match overrides {
            Some(items) => Self::new(items.to_vec()),
            None => Ok(Self::default()),
        }
    }

    pub fn items(&self) -> &[(String, Coins)] {
        &self.items
    }

    pub fn price(&self, merch_name: &str) -> Option<Coins> {
        self.items
            .iter()
            .find(|(name, _)| name == merch_name)
            .map(|(_, price)| *price)
    }

    /// Replace the cached catalog with this one
    pub async fn load_into(&self, cache: &dyn BalanceCache) -> Result<(), CatalogError> {
        cache.load_catalog(&self.items).await?;
        tracing::info!(items = self.items.len(), "Merch catalog loaded");
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            items: DEFAULT_CATALOG
                .iter()
                .map(|(name, price)| (name.to_string(), *price))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryBalanceCache;

    #[test]
    fn test_default_catalog_is_valid() {
        let items = Catalog::default().items().to_vec();
        assert_eq!(items.len(), 10);
        assert!(Catalog::new(items).is_ok());
        assert_eq!(Catalog::default().price("pink-hoody"), Some(500));
        assert_eq!(Catalog::default().price("yacht"), None);
    }

    #[test]
    fn test_validation() {
        assert_eq!(Catalog::new(vec![]), Err(CatalogError::Empty));
        assert_eq!(
            Catalog::new(vec![(" ".to_string(), 5)]),
            Err(CatalogError::BlankName)
        );
        assert_eq!(
            Catalog::new(vec![("cup".to_string(), 0)]),
            Err(CatalogError::NonPositivePrice {
                name: "cup".to_string(),
                price: 0
            })
        );
        assert_eq!(
            Catalog::new(vec![("cup".to_string(), 5), ("cup".to_string(), 6)]),
            Err(CatalogError::Duplicate("cup".to_string()))
        );
    }

    #[test]
    fn test_config_override_wins() {
        let custom = vec![("sticker".to_string(), 3)];
        let catalog = Catalog::from_config(Some(custom.as_slice())).unwrap();
        assert_eq!(catalog.items(), custom.as_slice());
        assert_eq!(Catalog::from_config(None).unwrap(), Catalog::default());
    }

    #[tokio::test]
    async fn test_load_into_cache() {
        let cache = InMemoryBalanceCache::new();
        Catalog::default().load_into(&cache).await.unwrap();
        assert_eq!(cache.get_price("hoody").await, Ok(300));
    }
}
