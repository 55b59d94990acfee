//! # Row Pipeline
//!
//! Turns a catalog's purchase definitions into presentation-ready rows.
//!
//! Within a refresh window the ledger's cached rows are replayed: the rolled
//! candidate, tier and stock draw stay fixed, while the live stock snapshot,
//! sold-out presentation and everything decided by the viewing actor
//! (visibility, enable state, price) are re-derived.
//!
//! At a refresh boundary every definition is re-evaluated: sources
//! enumerated, appearance chances and stock rolled, quality tiers picked,
//! previews materialized and prices composed.

use crate::config::{CatalogConfig, PurchaseItemDefinition, QualityTier};
use crate::error::{CatalogError, CatalogResult};
use crate::host::ItemHost;
use crate::item::{Candidate, ItemRegistry};
use crate::ledger::{StockKey, StockLedger, UNLIMITED_STOCK};
use crate::materialize::{ItemInstanceId, PreviewPool, Purpose};
use crate::resolver::Resolver;
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// A realized, presentation-ready row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRow {
    /// Row identity within the current refresh window
    pub row_id: u32,

    pub definition_id: String,

    /// Position of the definition in the catalog
    pub definition_index: usize,

    pub stock_key: StockKey,

    pub candidate: Candidate,

    /// Rolled quality tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,

    /// Price per unit
    pub price: i64,

    /// Cost before multipliers
    pub base_cost: i64,

    /// Price below base cost
    pub discounted: bool,

    /// Live stock snapshot (-1 = unlimited)
    pub stock: i64,

    pub sold_out: bool,

    /// Result of the enable test
    pub available: bool,

    /// Tooltip for a failed enable test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_tooltip: Option<String>,

    /// Tooltip currently shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,

    pub tags: Vec<String>,

    /// Preview instance backing this row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ItemInstanceId>,
}

impl CachedRow {
    /// Shown enabled: the enable test passed and stock remains
    pub fn is_purchasable(&self) -> bool {
        self.available && !self.sold_out
    }

    /// Quality tier name, if one was rolled
    pub fn quality_name(&self) -> Option<&str> {
        self.quality.as_ref().map(|t| t.name.as_str())
    }

    /// Re-derive everything that depends on who is looking: enable state,
    /// disabled tooltip and price. Returns the visibility test result.
    fn apply_actor(
        &mut self,
        config: &CatalogConfig,
        definition: &PurchaseItemDefinition,
        resolver: &Resolver,
    ) -> bool {
        self.available = definition.enabled.evaluate(resolver);
        self.disabled_tooltip = if self.available {
            None
        } else {
            definition.disabled_tooltip.clone()
        };

        let tier_multiplier = self.quality.as_ref().map(|t| t.static_multiplier).unwrap_or(1.0);
        self.price = compute_price(
            self.base_cost,
            tier_multiplier,
            definition.price_multiplier.evaluate(resolver),
            config.global_multiplier.evaluate(resolver),
        );
        self.discounted = self.price < self.base_cost;

        definition.visibility.evaluate(resolver)
    }

    /// Re-derive stock-dependent presentation
    fn apply_stock(&mut self, stock: i64, sold_out_tooltip: Option<&str>) {
        self.stock = stock;
        self.sold_out = stock == 0;
        self.tooltip = if self.sold_out {
            sold_out_tooltip
                .map(str::to_string)
                .or_else(|| self.disabled_tooltip.clone())
        } else {
            self.disabled_tooltip.clone()
        };
    }
}

/// Everything generation needs besides the catalog and its ledger
pub struct GenerationContext<'a, R: Rng> {
    pub registry: &'a ItemRegistry,
    pub resolver: &'a Resolver,
    pub now: DateTime<Utc>,
    pub host: &'a mut dyn ItemHost,
    pub previews: &'a mut PreviewPool,
    pub rng: &'a mut R,
}

/// Compose a unit price: `round(base × tier × per-item × global)`, never negative
pub fn compute_price(base_cost: i64, tier_multiplier: f64, item_multiplier: f64, global_multiplier: f64) -> i64 {
    let price = (base_cost as f64 * tier_multiplier * item_multiplier * global_multiplier).round();
    if price.is_finite() {
        (price as i64).max(0)
    } else {
        0
    }
}

/// Produce the catalog's rows, replaying the cache inside a refresh window
#[instrument(skip_all, fields(catalog = %config.id, actor = %ctx.resolver.actor))]
pub fn generate<R: Rng>(
    config: &CatalogConfig,
    ledger: &mut StockLedger,
    ctx: &mut GenerationContext<'_, R>,
) -> Vec<CachedRow> {
    if !ledger.should_refresh(ctx.now) && ledger.has_cached_rows() {
        return replay(config, ledger, ctx);
    }

    ledger.begin_refresh(ctx.now);

    let mut rows = Vec::new();
    let mut next_row_id = 0u32;

    for (definition_index, definition) in config.definitions.iter().enumerate() {
        // Hidden definitions are still rolled and cached so stock does not
        // depend on who opened the catalog first; they get no rows or previews.
        let visible = definition.visibility.evaluate(ctx.resolver);
        if !visible {
            debug!("Definition {} hidden by visibility test", definition.id);
        }

        match generate_definition(config, definition_index, definition, visible, ledger, ctx) {
            Ok(definition_rows) => {
                for mut row in definition_rows {
                    row.row_id = next_row_id;
                    next_row_id += 1;
                    ledger.cache_row(row.clone());
                    if visible {
                        rows.push(row);
                    }
                }
            }
            Err(err) => {
                warn!("Skipping definition {}: {}", definition.id, err);
            }
        }
    }

    ledger.end_refresh();
    info!("Generated {} rows", rows.len());
    rows
}

/// Rows for one definition; an error discards the whole definition
fn generate_definition<R: Rng>(
    config: &CatalogConfig,
    definition_index: usize,
    definition: &PurchaseItemDefinition,
    visible: bool,
    ledger: &mut StockLedger,
    ctx: &mut GenerationContext<'_, R>,
) -> CatalogResult<Vec<CachedRow>> {
    if !(0.0..=1.0).contains(&definition.chance) {
        return Err(CatalogError::Configuration(format!(
            "chance {} outside [0, 1]",
            definition.chance
        )));
    }

    let mut rows = Vec::new();

    for (source_index, source) in definition.sources.iter().enumerate() {
        for candidate in source.candidates(ctx.registry) {
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(err) if err.is_row_scoped() => {
                    warn!("Skipping candidate of {}: {}", definition.id, err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if definition.chance < 1.0 && !ctx.rng.gen_bool(definition.chance) {
                continue;
            }

            let key = StockKey::new(definition.stock_scope(), candidate.resolved_id(), source_index);
            let stock = resolve_stock(definition, &key, ledger, ctx.rng)?;
            if stock == 0 && config.hide_if_sold_out() {
                debug!("Hiding sold-out {}", key);
                continue;
            }

            let tier = choose_tier(&definition.quality_tiers, ctx.rng)?;

            let preview = if visible {
                let Some(preview) = ctx.host.materialize(&candidate, Purpose::Preview) else {
                    warn!("Preview creation failed for {}, row skipped", key);
                    continue;
                };
                Some(ctx.previews.track(preview))
            } else {
                None
            };

            let mut row = CachedRow {
                row_id: 0,
                definition_id: definition.id.clone(),
                definition_index,
                stock_key: key,
                quality: tier.cloned(),
                price: 0,
                base_cost: candidate.base_cost,
                discounted: false,
                stock,
                sold_out: false,
                available: true,
                disabled_tooltip: None,
                tooltip: None,
                tags: candidate.tags.clone(),
                preview,
                candidate,
            };
            row.apply_actor(config, definition, ctx.resolver);
            row.apply_stock(stock, config.sold_out_tooltip());

            debug!(
                "Row {} price={} stock={} quality={:?}",
                row.stock_key,
                row.price,
                row.stock,
                row.quality_name()
            );
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Tracked count for the key, or a fresh draw registered into the ledger
fn resolve_stock<R: Rng>(
    definition: &PurchaseItemDefinition,
    key: &StockKey,
    ledger: &mut StockLedger,
    rng: &mut R,
) -> CatalogResult<i64> {
    if !definition.always_restock {
        if let Some(count) = ledger.get(key) {
            return Ok(count);
        }
    }

    let count = match definition.limited_stock {
        Some(range) if range.lower > range.upper => {
            return Err(CatalogError::InvalidStockRange {
                definition_id: definition.id.clone(),
                lower: range.lower,
                upper: range.upper,
            })
        }
        Some(range) => i64::from(rng.gen_range(range.lower..=range.upper)),
        None => UNLIMITED_STOCK,
    };
    ledger.set(key.clone(), count);
    Ok(count)
}

/// Weighted choice over the tier table; `None` for an empty table
fn choose_tier<'t, R: Rng>(tiers: &'t [QualityTier], rng: &mut R) -> CatalogResult<Option<&'t QualityTier>> {
    if tiers.is_empty() {
        return Ok(None);
    }
    let index = WeightedIndex::new(tiers.iter().map(|t| t.weight))
        .map_err(|err| CatalogError::Configuration(format!("quality tiers: {}", err)))?;
    Ok(Some(&tiers[index.sample(rng)]))
}

/// Replay cached rows with live stock, re-creating disposed previews
fn replay<R: Rng>(
    config: &CatalogConfig,
    ledger: &mut StockLedger,
    ctx: &mut GenerationContext<'_, R>,
) -> Vec<CachedRow> {
    let stocks: Vec<i64> = ledger
        .cached_rows()
        .map(|row| ledger.remaining(&row.stock_key))
        .collect();

    let mut rows = Vec::with_capacity(stocks.len());
    for (row, stock) in ledger.cached_rows_mut().zip(stocks) {
        let Some(definition) = config.definitions.get(row.definition_index) else {
            warn!("Cached row {} has no definition, skipped", row.stock_key);
            continue;
        };
        if !row.apply_actor(config, definition, ctx.resolver) {
            continue;
        }
        row.apply_stock(stock, config.sold_out_tooltip());
        if row.sold_out && config.hide_if_sold_out() {
            continue;
        }

        let preview_live = row.preview.map(|id| ctx.previews.contains(id)).unwrap_or(false);
        if !preview_live {
            row.preview = ctx
                .host
                .materialize(&row.candidate, Purpose::Preview)
                .map(|item| ctx.previews.track(item));
            if row.preview.is_none() {
                warn!("Preview re-creation failed for {}", row.stock_key);
            }
        }
        rows.push(row.clone());
    }

    debug!("Replayed {} cached rows", rows.len());
    rows
}
