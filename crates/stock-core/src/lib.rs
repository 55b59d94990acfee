//! # stock-core
//!
//! Core types for the stockroom catalog engine.
//!
//! This crate provides:
//! - `ItemSource` and `ItemRegistry` for resolving catalog candidates
//! - `StockLedger` and `LedgerRegistry` for TTL-bounded stock and row caching
//! - `pipeline::generate` for turning a `CatalogConfig` into priced rows
//! - `transaction::execute` for debit, create and deliver per purchased unit
//! - `CatalogSession` for the open / confirm lifecycle with preview cleanup
//! - `ItemHost` and `Funds` traits for plugging in a host world
//! - `CatalogError` for typed configuration errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use stock_core::{CatalogSession, InMemoryFunds, InMemoryHost, LedgerRegistry, PresentationResponse};
//!
//! let mut session = CatalogSession::new(catalog, Resolver::new("bella"));
//!
//! // Generate rows (or replay them inside the refresh window)
//! let rows = session.open(&registry, &mut ledgers, &mut host, Utc::now());
//!
//! // Buy two of the first row
//! let response = PresentationResponse::accept(vec![SelectionEntry::new(rows[0].row_id, 2)]);
//! let result = session.confirm(response, &mut ledgers, &mut host, &mut funds);
//! ```

pub mod config;
pub mod error;
pub mod funds;
pub mod host;
pub mod item;
pub mod ledger;
pub mod materialize;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod transaction;

// Re-exports for convenience
pub use config::{
    CatalogConfig, CatalogConfigBuilder, CatalogFile, PurchaseItemDefinition, PurchasePolicy,
    QualityTier, StockPolicy, StockRange,
};
pub use error::{CatalogError, CatalogResult};
pub use funds::{Funds, InMemoryFunds, PaymentDestination, PaymentSource};
pub use host::{DeliveryMethod, InMemoryHost, ItemHost};
pub use item::{Candidate, ItemDefinition, ItemRegistry, ItemSource, Recipe};
pub use ledger::{LedgerRegistry, StockKey, StockLedger, UNLIMITED_STOCK};
pub use materialize::{ItemEffect, ItemInstanceId, MaterializedItem, PreviewPool, Purpose};
pub use pipeline::{compute_price, CachedRow, GenerationContext};
pub use resolver::{MultiplierModifier, Predicate, Resolver, TestedMultiplier};
pub use session::{rng_for, CatalogSession, PresentationResponse};
pub use transaction::{
    total_units, Delivered, PurchaseContext, PurchaseFailure, PurchaseOutcome, SelectionEntry, TransactionResult,
};
