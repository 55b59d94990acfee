//! # Stock Ledger
//!
//! TTL-bounded stock counters and the row cache for one catalog.
//!
//! Stock and randomized row choices stay fixed for the lifetime of a
//! refresh window so reopening a catalog never re-rolls what was already
//! shown. Staleness is only checked when the ledger is read; nothing evicts
//! in the background.
//!
//! Ledgers are owned by a [`LedgerRegistry`] keyed by catalog id, created
//! lazily on first open and dropped together when the hosting session ends.

use crate::config::CatalogConfig;
use crate::pipeline::CachedRow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Stock sentinel for unlimited rows
pub const UNLIMITED_STOCK: i64 = -1;

/// Identity scoping one stock counter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    /// Definition id, or the stock pool it shares
    pub scope: String,
    pub item_id: String,
    pub source_index: usize,
}

impl StockKey {
    pub fn new(scope: impl Into<String>, item_id: impl Into<String>, source_index: usize) -> Self {
        Self {
            scope: scope.into(),
            item_id: item_id.into(),
            source_index,
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.item_id, self.source_index)
    }
}

/// Stock counters and cached rows for one catalog
#[derive(Debug)]
pub struct StockLedger {
    refresh_period: Duration,
    stock_map: HashMap<StockKey, i64>,
    row_cache: Vec<CachedRow>,
    next_refresh_time: Option<DateTime<Utc>>,
    refresh_required: bool,
}

impl StockLedger {
    /// Create a ledger that needs a refresh before first use
    pub fn new(refresh_period: Duration) -> Self {
        Self {
            refresh_period,
            stock_map: HashMap::new(),
            row_cache: Vec::new(),
            next_refresh_time: None,
            refresh_required: true,
        }
    }

    pub fn should_refresh(&self, now: DateTime<Utc>) -> bool {
        self.refresh_required
            || self
                .next_refresh_time
                .map(|next| now >= next)
                .unwrap_or(true)
    }

    /// Drop all counters and rows and open a new window starting at `now`
    pub fn begin_refresh(&mut self, now: DateTime<Utc>) {
        self.stock_map.clear();
        self.row_cache.clear();
        let next = now
            .checked_add_signed(self.refresh_period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.next_refresh_time = Some(next);
        debug!("Stock refresh started, next refresh at {}", next);
    }

    pub fn end_refresh(&mut self) {
        self.refresh_required = false;
    }

    /// Make the next read regenerate regardless of the window
    pub fn force_refresh(&mut self) {
        self.refresh_required = true;
    }

    pub fn next_refresh_time(&self) -> Option<DateTime<Utc>> {
        self.next_refresh_time
    }

    pub fn get(&self, key: &StockKey) -> Option<i64> {
        self.stock_map.get(key).copied()
    }

    /// Track a counter. Negative values other than the unlimited sentinel
    /// are stored as 0.
    pub fn set(&mut self, key: StockKey, value: i64) {
        let value = if value == UNLIMITED_STOCK { value } else { value.max(0) };
        self.stock_map.insert(key, value);
    }

    /// Lower a tracked counter, clamped at 0. Unlimited and untracked keys
    /// are left alone. Returns the new count for tracked keys.
    pub fn decrement(&mut self, key: &StockKey, amount: u32) -> Option<i64> {
        let count = self.stock_map.get_mut(key)?;
        if *count != UNLIMITED_STOCK {
            *count = (*count - i64::from(amount)).max(0);
        }
        Some(*count)
    }

    /// Live count for a key; untracked keys are unlimited
    pub fn remaining(&self, key: &StockKey) -> i64 {
        self.get(key).unwrap_or(UNLIMITED_STOCK)
    }

    pub fn tracked_keys(&self) -> usize {
        self.stock_map.len()
    }

    pub fn cache_row(&mut self, row: CachedRow) {
        self.row_cache.push(row);
    }

    pub fn cached_rows(&self) -> impl Iterator<Item = &CachedRow> {
        self.row_cache.iter()
    }

    pub(crate) fn cached_rows_mut(&mut self) -> impl Iterator<Item = &mut CachedRow> {
        self.row_cache.iter_mut()
    }

    pub fn has_cached_rows(&self) -> bool {
        !self.row_cache.is_empty()
    }
}

/// Ledgers for every catalog, keyed by catalog id
#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledgers: HashMap<String, StockLedger>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger for a catalog, created on first use
    pub fn ledger_for(&mut self, catalog: &CatalogConfig) -> &mut StockLedger {
        self.ledgers.entry(catalog.id.clone()).or_insert_with(|| {
            info!("Creating stock ledger for catalog {}", catalog.id);
            StockLedger::new(catalog.refresh_period())
        })
    }

    pub fn get(&self, catalog_id: &str) -> Option<&StockLedger> {
        self.ledgers.get(catalog_id)
    }

    /// Force a catalog to regenerate on next open. Returns false if the
    /// catalog has no ledger yet (it will generate anyway).
    pub fn force_refresh(&mut self, catalog_id: &str) -> bool {
        match self.ledgers.get_mut(catalog_id) {
            Some(ledger) => {
                ledger.force_refresh();
                true
            }
            None => false,
        }
    }

    /// Drop every ledger (hosting session ended)
    pub fn clear(&mut self) {
        if !self.ledgers.is_empty() {
            info!("Dropping {} stock ledgers", self.ledgers.len());
        }
        self.ledgers.clear();
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}
