//! # Transaction Engine
//!
//! Executes a confirmed selection against the most recently generated rows.
//!
//! Every requested unit is attempted independently, in selection order:
//!
//! ```text
//! access + stock check ─▶ debit ─▶ materialize ─▶ apply tier/effects ─▶ deliver
//!                  │            │                                  │
//!                  ▼            ▼                                  ▼
//!          InsufficientFunds  CreateFailed (refund)   DeliveryFailed (destroy + refund)
//! ```
//!
//! Access is decided against the purchasing actor, never against whoever
//! generated the cached row.
//! Funds are taken before anything is materialized, so a failed debit never
//! needs compensation. Any failure after the debit refunds the unit, and a
//! refused delivery destroys the instance it was handed.
//! Unit results are folded into a [`TransactionResult`]; no unit failure
//! ever escapes [`execute`].

use crate::config::{CatalogConfig, PurchaseItemDefinition, PurchasePolicy};
use crate::funds::Funds;
use crate::host::ItemHost;
use crate::ledger::{StockKey, StockLedger};
use crate::materialize::{ItemInstanceId, PreviewPool, Purpose};
use crate::pipeline::CachedRow;
use crate::resolver::Resolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a single unit was not delivered
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseFailure {
    #[error("insufficient funds for price {price}")]
    InsufficientFunds { price: i64 },

    #[error("item creation failed")]
    CreateFailed,

    #[error("delivery failed")]
    DeliveryFailed,

    #[error("sold out")]
    SoldOut,

    #[error("row is not available to this actor")]
    Unavailable,

    #[error("unknown row {row_id}")]
    UnknownRow { row_id: u32 },

    /// The row under this id no longer matches what the buyer was shown
    #[error("row {row_id} changed since it was presented")]
    Stale { row_id: u32 },

    /// Not attempted because an earlier unit failed under stop-on-first-failure
    #[error("not attempted after an earlier failure")]
    Halted,
}

/// A successfully delivered unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub price: i64,
    pub item: ItemInstanceId,
}

/// Outcome of one attempted unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Delivered {
        row_id: u32,
        price: i64,
        item: ItemInstanceId,
    },
    Failed {
        row_id: u32,
        reason: PurchaseFailure,
    },
}

impl PurchaseOutcome {
    pub fn row_id(&self) -> u32 {
        match self {
            PurchaseOutcome::Delivered { row_id, .. } | PurchaseOutcome::Failed { row_id, .. } => *row_id,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, PurchaseOutcome::Delivered { .. })
    }
}

/// Requested quantity of one row
///
/// Row ids are only meaningful within one refresh window. A client that
/// echoes the row's `stock_key` and `price` gets a [`PurchaseFailure::Stale`]
/// instead of a different item when the window rolled over in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub row_id: u32,
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_key: Option<StockKey>,

    /// Unit price the buyer agreed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
}

impl SelectionEntry {
    pub fn new(row_id: u32, quantity: u32) -> Self {
        Self {
            row_id,
            quantity,
            stock_key: None,
            price: None,
        }
    }

    /// Builder: pin the entry to the row as presented
    pub fn expecting(mut self, row: &CachedRow) -> Self {
        self.stock_key = Some(row.stock_key.clone());
        self.price = Some(row.price);
        self
    }

    /// Whether the row still matches every pinned expectation
    pub fn matches(&self, row: &CachedRow) -> bool {
        self.stock_key.as_ref().map_or(true, |key| *key == row.stock_key)
            && self.price.map_or(true, |price| price == row.price)
    }
}

/// Units requested by a selection, without overflow
pub fn total_units(selection: &[SelectionEntry]) -> u64 {
    selection.iter().map(|entry| u64::from(entry.quantity)).sum()
}

/// Aggregate of a whole transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub purchased_count: u32,
    pub failed_count: u32,
    /// Sum of prices of delivered units
    pub total_debited: i64,
    pub outcomes: Vec<PurchaseOutcome>,
    pub completed_at: DateTime<Utc>,
}

impl TransactionResult {
    fn new() -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            purchased_count: 0,
            failed_count: 0,
            total_debited: 0,
            outcomes: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    fn record(mut self, row_id: u32, unit: Result<Delivered, PurchaseFailure>) -> Self {
        let outcome = match unit {
            Ok(delivered) => {
                self.purchased_count = self.purchased_count.saturating_add(1);
                self.total_debited = self.total_debited.saturating_add(delivered.price);
                PurchaseOutcome::Delivered {
                    row_id,
                    price: delivered.price,
                    item: delivered.item,
                }
            }
            Err(reason) => {
                self.failed_count = self.failed_count.saturating_add(1);
                PurchaseOutcome::Failed { row_id, reason }
            }
        };
        self.outcomes.push(outcome);
        self
    }

    /// Number of units requested
    pub fn attempted(&self) -> u32 {
        self.purchased_count.saturating_add(self.failed_count)
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_count == 0 && self.purchased_count > 0
    }
}

/// Collaborators for one transaction
pub struct PurchaseContext<'a> {
    pub resolver: &'a Resolver,
    pub host: &'a mut dyn ItemHost,
    pub funds: &'a mut dyn Funds,
    /// Previews from row generation, disposed when the transaction ends
    pub previews: &'a mut PreviewPool,
}

/// Execute a selection, then dispose every preview of the session
#[instrument(skip_all, fields(catalog = %config.id, actor = %ctx.resolver.actor))]
pub fn execute(
    selection: &[SelectionEntry],
    rows: &[CachedRow],
    config: &CatalogConfig,
    ledger: &mut StockLedger,
    ctx: &mut PurchaseContext<'_>,
    policy: PurchasePolicy,
) -> TransactionResult {
    let units = selection
        .iter()
        .flat_map(|entry| std::iter::repeat(entry).take(entry.quantity as usize));

    let result = units.fold(TransactionResult::new(), |result, entry| {
        let row_id = entry.row_id;
        let unit = if policy.stop_on_first_failure && result.failed_count > 0 {
            Err(PurchaseFailure::Halted)
        } else {
            match rows.iter().find(|row| row.row_id == row_id) {
                Some(row) if !entry.matches(row) => Err(PurchaseFailure::Stale { row_id }),
                Some(row) => attempt_unit(row, config, ledger, ctx),
                None => Err(PurchaseFailure::UnknownRow { row_id }),
            }
        };

        match &unit {
            Ok(delivered) => debug!("Row {} delivered as {}", row_id, delivered.item),
            Err(PurchaseFailure::Halted) => {}
            Err(reason) => warn!("Row {} unit failed: {}", row_id, reason),
        }
        result.record(row_id, unit)
    });

    settle(&result, config, ctx);

    let disposed = ctx.previews.dispose_all(&mut *ctx.host);
    info!(
        "Transaction {}: purchased={}, failed={}, total_debited={}, previews_disposed={}",
        result.transaction_id, result.purchased_count, result.failed_count, result.total_debited, disposed
    );
    result
}

/// Catalog-level effects, payout and notification
fn settle(result: &TransactionResult, config: &CatalogConfig, ctx: &mut PurchaseContext<'_>) {
    if result.purchased_count > 0 {
        for effect in &config.on_success {
            ctx.host.run_effect(effect, ctx.resolver);
        }
        if !config
            .payment_destination
            .give_payment(&mut *ctx.funds, result.total_debited)
        {
            warn!(
                "Payment destination refused {} for transaction {}",
                result.total_debited, result.transaction_id
            );
        }
    }
    if result.failed_count > 0 {
        for effect in &config.on_failure {
            ctx.host.run_effect(effect, ctx.resolver);
        }
    }
    if result.attempted() > 0 {
        ctx.host.notify(ctx.resolver, result);
    }
}

fn attempt_unit(
    row: &CachedRow,
    config: &CatalogConfig,
    ledger: &mut StockLedger,
    ctx: &mut PurchaseContext<'_>,
) -> Result<Delivered, PurchaseFailure> {
    let definition = config
        .definitions
        .get(row.definition_index)
        .filter(|d| d.id == row.definition_id);
    let permitted = match definition {
        Some(d) => d.visibility.evaluate(ctx.resolver) && d.enabled.evaluate(ctx.resolver),
        None => row.available,
    };
    if !permitted {
        return Err(PurchaseFailure::Unavailable);
    }
    if ledger.get(&row.stock_key) == Some(0) {
        return Err(PurchaseFailure::SoldOut);
    }

    let source = &config.payment_source;
    let charged = row.price > 0;
    if charged && !source.try_remove_funds(&mut *ctx.funds, ctx.resolver, row.price) {
        return Err(PurchaseFailure::InsufficientFunds { price: row.price });
    }

    match create_and_deliver(row, definition, config, ctx) {
        Ok(item) => {
            ledger.decrement(&row.stock_key, 1);
            Ok(Delivered {
                price: row.price,
                item,
            })
        }
        Err(reason) => {
            if charged && !source.refund(&mut *ctx.funds, ctx.resolver, row.price) {
                warn!("Refund of {} failed for row {}", row.price, row.row_id);
            }
            Err(reason)
        }
    }
}

fn create_and_deliver(
    row: &CachedRow,
    definition: Option<&PurchaseItemDefinition>,
    config: &CatalogConfig,
    ctx: &mut PurchaseContext<'_>,
) -> Result<ItemInstanceId, PurchaseFailure> {
    let mut item = ctx
        .host
        .materialize(&row.candidate, Purpose::Purchase)
        .ok_or(PurchaseFailure::CreateFailed)?;

    if let Some(tier) = &row.quality {
        item.quality = Some(tier.name.clone());
        for effect in &tier.state {
            effect.apply(&mut item);
        }
    }
    if let Some(definition) = definition {
        item.depreciation = definition.depreciation_multiplier;
        for effect in &definition.on_creation {
            effect.apply(&mut item);
        }
    }

    let method = definition
        .and_then(|d| d.delivery.as_ref())
        .unwrap_or(&config.delivery);
    let id = item.id;
    match ctx.host.deliver(method, ctx.resolver, item) {
        Ok(()) => Ok(id),
        Err(item) => {
            ctx.host.destroy(item);
            Err(PurchaseFailure::DeliveryFailed)
        }
    }
}
