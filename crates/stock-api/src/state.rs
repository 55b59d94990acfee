//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the catalogs, the item registry and the mutable stockroom
//! (ledgers, item host, funds).

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use stock_core::{
    rng_for, CatalogConfig, CatalogError, CatalogFile, CatalogSession, InMemoryFunds, InMemoryHost,
    ItemRegistry, LedgerRegistry, Resolver,
};
use tokio::sync::Mutex;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Explicit catalog file (falls back to config/catalogs.toml)
    pub catalog_config: Option<String>,
    /// Explicit item registry file (falls back to config/items.toml)
    pub items_config: Option<String>,
    /// Balance given to an account the first time it pays
    pub starting_funds: i64,
    /// Master seed for every session RNG
    pub rng_seed: Option<u64>,
    /// Upper bound on units in one purchase request
    pub max_units_per_purchase: u64,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            catalog_config: std::env::var("CATALOG_CONFIG").ok(),
            items_config: std::env::var("ITEMS_CONFIG").ok(),
            starting_funds: std::env::var("STARTING_FUNDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000),
            rng_seed: std::env::var("RNG_SEED").ok().and_then(|v| v.parse().ok()),
            max_units_per_purchase: std::env::var("MAX_UNITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Mutable engine state, guarded by one lock
#[derive(Debug)]
pub struct Stockroom {
    pub ledgers: LedgerRegistry,
    pub host: InMemoryHost,
    pub funds: InMemoryFunds,
    seed_rng: Option<ChaCha8Rng>,
}

impl Stockroom {
    pub fn new(rng_seed: Option<u64>) -> Self {
        Self {
            ledgers: LedgerRegistry::new(),
            host: InMemoryHost::new(),
            funds: InMemoryFunds::new(),
            seed_rng: rng_seed.map(ChaCha8Rng::seed_from_u64),
        }
    }

    /// Open a session; with a master seed each session gets the next derived seed
    pub fn session(&mut self, config: &CatalogConfig, resolver: Resolver) -> CatalogSession {
        let rng = match self.seed_rng.as_mut() {
            Some(master) => ChaCha8Rng::seed_from_u64(master.gen()),
            None => rng_for(config),
        };
        CatalogSession::new(config.clone(), resolver).with_rng(rng)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Catalogs by id
    pub catalogs: Arc<HashMap<String, CatalogConfig>>,
    /// Item definitions, recipes and inventories
    pub registry: Arc<ItemRegistry>,
    /// Ledgers, host and funds
    pub stockroom: Arc<Mutex<Stockroom>>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create a new AppState from config files
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let registry = load_item_registry(config.items_config.as_deref())?;
        let catalogs = load_catalogs(config.catalog_config.as_deref())?;
        Ok(Self::from_parts(config, registry, catalogs))
    }

    /// Assemble state from already-loaded parts
    pub fn from_parts(config: AppConfig, registry: ItemRegistry, catalogs: Vec<CatalogConfig>) -> Self {
        let stockroom = Stockroom::new(config.rng_seed);
        Self {
            catalogs: Arc::new(catalogs.into_iter().map(|c| (c.id.clone(), c)).collect()),
            registry: Arc::new(registry),
            stockroom: Arc::new(Mutex::new(stockroom)),
            config,
        }
    }

    /// Look up a catalog
    pub fn catalog(&self, catalog_id: &str) -> Result<&CatalogConfig, CatalogError> {
        self.catalogs
            .get(catalog_id)
            .ok_or_else(|| CatalogError::CatalogNotFound {
                catalog_id: catalog_id.to_string(),
            })
    }
}

/// Config file locations tried when no explicit path is set
fn candidate_paths(explicit: Option<&str>, file: &str) -> Vec<String> {
    match explicit {
        Some(path) => vec![path.to_string()],
        None => ["config", "../config", "../../config"]
            .iter()
            .map(|dir| format!("{}/{}", dir, file))
            .collect(),
    }
}

/// Load the item registry from config file
fn load_item_registry(explicit: Option<&str>) -> anyhow::Result<ItemRegistry> {
    for path in candidate_paths(explicit, "items.toml") {
        if let Ok(content) = std::fs::read_to_string(&path) {
            let registry = ItemRegistry::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} items from {}", registry.items.len(), path);
            return Ok(registry);
        }
    }

    if let Some(path) = explicit {
        anyhow::bail!("Item registry not found at {}", path);
    }
    tracing::warn!("No item registry found, using empty registry");
    Ok(ItemRegistry::new())
}

/// Load catalogs from config file
fn load_catalogs(explicit: Option<&str>) -> anyhow::Result<Vec<CatalogConfig>> {
    for path in candidate_paths(explicit, "catalogs.toml") {
        if let Ok(content) = std::fs::read_to_string(&path) {
            let file = CatalogFile::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} catalogs from {}", file.catalogs.len(), path);
            return Ok(file.catalogs);
        }
    }

    if let Some(path) = explicit {
        anyhow::bail!("Catalog file not found at {}", path);
    }
    tracing::warn!("No catalog file found, serving no catalogs");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            catalog_config: None,
            items_config: None,
            starting_funds: 500,
            rng_seed: Some(42),
            max_units_per_purchase: 100,
            environment: "test".to_string(),
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = config().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_bad_socket_addr_is_an_error() {
        let config = AppConfig {
            host: "not a host".to_string(),
            ..config()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_candidate_paths() {
        assert_eq!(candidate_paths(Some("/etc/shop.toml"), "catalogs.toml"), vec!["/etc/shop.toml"]);
        assert_eq!(candidate_paths(None, "items.toml")[0], "config/items.toml");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(load_catalogs(Some("/nonexistent/catalogs.toml")).is_err());
        assert!(load_item_registry(Some("/nonexistent/items.toml")).is_err());
    }

    #[test]
    fn test_unknown_catalog() {
        let state = AppState::from_parts(config(), ItemRegistry::new(), Vec::new());
        let err = state.catalog("nope").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_master_seed_derives_reproducible_sessions() {
        let catalog = CatalogConfig::builder("store").build().unwrap();
        let mut a = Stockroom::new(Some(9));
        let mut b = Stockroom::new(Some(9));

        let first = a.session(&catalog, Resolver::new("bella"));
        let second = b.session(&catalog, Resolver::new("bella"));
        assert_eq!(first.config().id, second.config().id);
        assert_eq!(a.seed_rng.as_mut().map(|r| r.gen::<u64>()), b.seed_rng.as_mut().map(|r| r.gen::<u64>()));
    }
}
