//! # Catalog Configuration
//!
//! Statically typed catalog configuration. Built once with
//! [`CatalogConfigBuilder`] or loaded from `config/catalogs.toml`, validated,
//! and treated as immutable afterwards.

use crate::error::{CatalogError, CatalogResult};
use crate::funds::{PaymentDestination, PaymentSource};
use crate::host::DeliveryMethod;
use crate::item::ItemSource;
use crate::materialize::ItemEffect;
use crate::resolver::{default_one, Predicate, TestedMultiplier};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Inclusive interval a fresh stock count is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRange {
    pub lower: u32,
    pub upper: u32,
}

impl StockRange {
    pub fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// A range that always yields `count`
    pub fn exactly(count: u32) -> Self {
        Self::new(count, count)
    }
}

/// A weighted modifier bundle applied to a row's price and purchased item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTier {
    pub name: String,

    /// Relative selection weight
    pub weight: f64,

    /// Price multiplier for rows rolled into this tier
    #[serde(default = "default_one")]
    pub static_multiplier: f64,

    /// State mutations applied to the purchased item
    #[serde(default)]
    pub state: Vec<ItemEffect>,
}

impl QualityTier {
    pub fn new(name: impl Into<String>, weight: f64, static_multiplier: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            static_multiplier,
            state: Vec::new(),
        }
    }

    /// Builder: add a state mutation
    pub fn with_state(mut self, effect: ItemEffect) -> Self {
        self.state.push(effect);
        self
    }
}

/// Restock cadence and sold-out presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPolicy {
    /// Length of a refresh window in seconds
    pub refresh_period_secs: u64,

    /// Drop sold-out rows instead of showing them disabled
    #[serde(default)]
    pub hide_if_sold_out: bool,

    /// Tooltip on sold-out rows when they are shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sold_out_tooltip: Option<String>,
}

impl StockPolicy {
    pub fn new(refresh_period_secs: u64) -> Self {
        Self {
            refresh_period_secs,
            hide_if_sold_out: false,
            sold_out_tooltip: None,
        }
    }

    /// Builder: hide sold-out rows
    pub fn hiding_sold_out(mut self) -> Self {
        self.hide_if_sold_out = true;
        self
    }

    /// Builder: set the sold-out tooltip
    pub fn with_sold_out_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.sold_out_tooltip = Some(tooltip.into());
        self
    }

    pub fn refresh_period(&self) -> Duration {
        let secs = i64::try_from(self.refresh_period_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Duration::seconds(secs)
    }
}

/// Transaction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PurchasePolicy {
    /// Fail every remaining unit after the first failure
    #[serde(default)]
    pub stop_on_first_failure: bool,
}

impl PurchasePolicy {
    pub fn stop_on_first_failure() -> Self {
        Self {
            stop_on_first_failure: true,
        }
    }
}

/// One configurable slot in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseItemDefinition {
    pub id: String,

    pub sources: Vec<ItemSource>,

    /// Fixed stock interval; `None` means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limited_stock: Option<StockRange>,

    /// Shared stock scope; definitions naming the same pool draw from the
    /// same counters. Defaults to the definition id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_pool: Option<String>,

    /// Probability each candidate appears on a refresh
    #[serde(default = "default_one")]
    pub chance: f64,

    /// Definition is skipped entirely when this fails
    #[serde(default)]
    pub visibility: Predicate,

    /// Rows are shown disabled when this fails
    #[serde(default)]
    pub enabled: Predicate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_tooltip: Option<String>,

    #[serde(default)]
    pub quality_tiers: Vec<QualityTier>,

    #[serde(default)]
    pub price_multiplier: TestedMultiplier,

    /// Value multiplier carried by purchased items
    #[serde(default = "default_one")]
    pub depreciation_multiplier: f64,

    /// Overrides the catalog delivery method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryMethod>,

    /// Effects applied to every purchased item
    #[serde(default)]
    pub on_creation: Vec<ItemEffect>,

    /// Draw fresh stock on every refresh even if the key is tracked
    #[serde(default)]
    pub always_restock: bool,
}

impl PurchaseItemDefinition {
    /// Create a definition with a single source and defaults elsewhere
    pub fn new(id: impl Into<String>, source: ItemSource) -> Self {
        Self {
            id: id.into(),
            sources: vec![source],
            limited_stock: None,
            stock_pool: None,
            chance: 1.0,
            visibility: Predicate::Always,
            enabled: Predicate::Always,
            disabled_tooltip: None,
            quality_tiers: Vec::new(),
            price_multiplier: TestedMultiplier::default(),
            depreciation_multiplier: 1.0,
            delivery: None,
            on_creation: Vec::new(),
            always_restock: false,
        }
    }

    /// Builder: add another source
    pub fn with_source(mut self, source: ItemSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Builder: limit stock
    pub fn with_stock(mut self, range: StockRange) -> Self {
        self.limited_stock = Some(range);
        self
    }

    /// Builder: set appearance chance
    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = chance;
        self
    }

    /// Builder: set visibility test
    pub fn with_visibility(mut self, test: Predicate) -> Self {
        self.visibility = test;
        self
    }

    /// Builder: set enable test and the tooltip shown when it fails
    pub fn with_enabled(mut self, test: Predicate, tooltip: impl Into<String>) -> Self {
        self.enabled = test;
        self.disabled_tooltip = Some(tooltip.into());
        self
    }

    /// Builder: add a quality tier
    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.quality_tiers.push(tier);
        self
    }

    /// Builder: set the per-item price multiplier
    pub fn with_price_multiplier(mut self, multiplier: TestedMultiplier) -> Self {
        self.price_multiplier = multiplier;
        self
    }

    /// Builder: set the depreciation multiplier
    pub fn with_depreciation(mut self, multiplier: f64) -> Self {
        self.depreciation_multiplier = multiplier;
        self
    }

    /// Builder: override delivery
    pub fn with_delivery(mut self, delivery: DeliveryMethod) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Builder: add an on-creation effect
    pub fn with_on_creation(mut self, effect: ItemEffect) -> Self {
        self.on_creation.push(effect);
        self
    }

    /// Builder: share stock counters with other definitions in the same pool
    pub fn with_stock_pool(mut self, pool: impl Into<String>) -> Self {
        self.stock_pool = Some(pool.into());
        self
    }

    /// Scope of this definition's stock keys
    pub fn stock_scope(&self) -> &str {
        self.stock_pool.as_deref().unwrap_or(&self.id)
    }

    /// Builder: always draw fresh stock
    pub fn always_restock(mut self) -> Self {
        self.always_restock = true;
        self
    }

    fn validate(&self) -> CatalogResult<()> {
        let fail = |msg: &str| Err(CatalogError::Configuration(format!("{}: {}", self.id, msg)));

        if self.id.is_empty() {
            return Err(CatalogError::Configuration(
                "definition id must not be empty".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return fail("at least one item source is required");
        }
        if self.stock_pool.as_deref() == Some("") {
            return fail("stock pool must not be empty");
        }
        if !(0.0..=1.0).contains(&self.chance) {
            return fail("chance must be within [0, 1]");
        }
        if let Some(range) = self.limited_stock {
            if range.lower > range.upper {
                return Err(CatalogError::InvalidStockRange {
                    definition_id: self.id.clone(),
                    lower: range.lower,
                    upper: range.upper,
                });
            }
        }
        if !self.price_multiplier.is_valid() {
            return fail("price multiplier must be finite and non-negative");
        }
        if !(self.depreciation_multiplier.is_finite() && self.depreciation_multiplier >= 0.0) {
            return fail("depreciation multiplier must be finite and non-negative");
        }
        for tier in &self.quality_tiers {
            if !(tier.weight.is_finite() && tier.weight >= 0.0) {
                return fail("quality tier weights must be finite and non-negative");
            }
            if !(tier.static_multiplier.is_finite() && tier.static_multiplier >= 0.0) {
                return fail("quality tier multipliers must be finite and non-negative");
            }
        }
        if !self.quality_tiers.is_empty() && self.quality_tiers.iter().all(|t| t.weight == 0.0) {
            return fail("at least one quality tier needs a positive weight");
        }
        Ok(())
    }
}

/// Static catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Stable catalog identifier (ledger registry key)
    pub id: String,

    #[serde(default)]
    pub definitions: Vec<PurchaseItemDefinition>,

    #[serde(default)]
    pub delivery: DeliveryMethod,

    #[serde(default)]
    pub payment_source: PaymentSource,

    #[serde(default)]
    pub payment_destination: PaymentDestination,

    #[serde(default)]
    pub global_multiplier: TestedMultiplier,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_policy: Option<StockPolicy>,

    #[serde(default)]
    pub purchase_policy: PurchasePolicy,

    /// Effects run once when at least one unit was purchased
    #[serde(default)]
    pub on_success: Vec<String>,

    /// Effects run once when at least one unit failed
    #[serde(default)]
    pub on_failure: Vec<String>,

    /// Fixed seed for deterministic rolls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl CatalogConfig {
    /// Start building a catalog
    pub fn builder(id: impl Into<String>) -> CatalogConfigBuilder {
        CatalogConfigBuilder::new(id)
    }

    /// Refresh window length; zero without a stock policy
    pub fn refresh_period(&self) -> Duration {
        self.stock_policy
            .as_ref()
            .map(StockPolicy::refresh_period)
            .unwrap_or_else(Duration::zero)
    }

    pub fn hide_if_sold_out(&self) -> bool {
        self.stock_policy
            .as_ref()
            .map(|p| p.hide_if_sold_out)
            .unwrap_or(false)
    }

    pub fn sold_out_tooltip(&self) -> Option<&str> {
        self.stock_policy
            .as_ref()
            .and_then(|p| p.sold_out_tooltip.as_deref())
    }

    /// Find a definition by id
    pub fn definition(&self, id: &str) -> Option<&PurchaseItemDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Check the whole configuration
    pub fn validate(&self) -> CatalogResult<()> {
        if self.id.is_empty() {
            return Err(CatalogError::Configuration(
                "catalog id must not be empty".to_string(),
            ));
        }
        if !self.global_multiplier.is_valid() {
            return Err(CatalogError::Configuration(format!(
                "{}: global multiplier must be finite and non-negative",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for definition in &self.definitions {
            if !seen.insert(definition.id.as_str()) {
                return Err(CatalogError::Configuration(format!(
                    "{}: duplicate definition id {}",
                    self.id, definition.id
                )));
            }
            definition.validate()?;
        }
        Ok(())
    }

    /// Load and validate a single catalog from TOML
    pub fn from_toml(toml_str: &str) -> CatalogResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

/// A file of catalogs (`[[catalogs]]` tables)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub catalogs: Vec<CatalogConfig>,
}

impl CatalogFile {
    /// Load and validate every catalog from TOML
    pub fn from_toml(toml_str: &str) -> CatalogResult<Self> {
        let file: Self = toml::from_str(toml_str)?;
        let mut seen = HashSet::new();
        for catalog in &file.catalogs {
            if !seen.insert(catalog.id.as_str()) {
                return Err(CatalogError::Configuration(format!(
                    "duplicate catalog id {}",
                    catalog.id
                )));
            }
            catalog.validate()?;
        }
        Ok(file)
    }
}

/// Builder for [`CatalogConfig`]
#[derive(Debug, Clone)]
pub struct CatalogConfigBuilder {
    config: CatalogConfig,
}

impl CatalogConfigBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            config: CatalogConfig {
                id: id.into(),
                definitions: Vec::new(),
                delivery: DeliveryMethod::default(),
                payment_source: PaymentSource::default(),
                payment_destination: PaymentDestination::default(),
                global_multiplier: TestedMultiplier::default(),
                stock_policy: None,
                purchase_policy: PurchasePolicy::default(),
                on_success: Vec::new(),
                on_failure: Vec::new(),
                rng_seed: None,
            },
        }
    }

    pub fn definition(mut self, definition: PurchaseItemDefinition) -> Self {
        self.config.definitions.push(definition);
        self
    }

    pub fn delivery(mut self, delivery: DeliveryMethod) -> Self {
        self.config.delivery = delivery;
        self
    }

    pub fn payment_source(mut self, source: PaymentSource) -> Self {
        self.config.payment_source = source;
        self
    }

    pub fn payment_destination(mut self, destination: PaymentDestination) -> Self {
        self.config.payment_destination = destination;
        self
    }

    pub fn global_multiplier(mut self, multiplier: TestedMultiplier) -> Self {
        self.config.global_multiplier = multiplier;
        self
    }

    pub fn stock_policy(mut self, policy: StockPolicy) -> Self {
        self.config.stock_policy = Some(policy);
        self
    }

    pub fn purchase_policy(mut self, policy: PurchasePolicy) -> Self {
        self.config.purchase_policy = policy;
        self
    }

    pub fn on_success(mut self, effect: impl Into<String>) -> Self {
        self.config.on_success.push(effect.into());
        self
    }

    pub fn on_failure(mut self, effect: impl Into<String>) -> Self {
        self.config.on_failure.push(effect.into());
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> CatalogResult<CatalogConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chairs() -> ItemSource {
        ItemSource::Explicit {
            items: vec!["chair".into()],
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = CatalogConfig::builder("general-store")
            .definition(PurchaseItemDefinition::new("chairs", chairs()))
            .build()
            .unwrap();

        assert_eq!(config.delivery, DeliveryMethod::Inventory);
        assert_eq!(config.payment_source, PaymentSource::Household);
        assert_eq!(config.payment_destination, PaymentDestination::Discard);
        assert_eq!(config.refresh_period(), Duration::zero());
        assert!(!config.hide_if_sold_out());
        assert!(config.definition("chairs").is_some());
    }

    #[test]
    fn test_invalid_stock_range_rejected() {
        let result = CatalogConfig::builder("store")
            .definition(PurchaseItemDefinition::new("chairs", chairs()).with_stock(StockRange::new(5, 2)))
            .build();

        assert_eq!(
            result.unwrap_err(),
            CatalogError::InvalidStockRange {
                definition_id: "chairs".into(),
                lower: 5,
                upper: 2
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_chance = CatalogConfig::builder("store")
            .definition(PurchaseItemDefinition::new("chairs", chairs()).with_chance(1.5))
            .build();
        assert!(matches!(bad_chance, Err(CatalogError::Configuration(_))));

        let zero_weights = CatalogConfig::builder("store")
            .definition(
                PurchaseItemDefinition::new("chairs", chairs())
                    .with_tier(QualityTier::new("poor", 0.0, 0.5)),
            )
            .build();
        assert!(zero_weights.is_err());

        let duplicate = CatalogConfig::builder("store")
            .definition(PurchaseItemDefinition::new("chairs", chairs()))
            .definition(PurchaseItemDefinition::new("chairs", chairs()))
            .build();
        assert!(duplicate.is_err());

        let empty_pool = CatalogConfig::builder("store")
            .definition(PurchaseItemDefinition::new("chairs", chairs()).with_stock_pool(""))
            .build();
        assert!(empty_pool.is_err());

        let negative_global = CatalogConfig::builder("store")
            .global_multiplier(TestedMultiplier::fixed(-2.0))
            .build();
        assert!(negative_global.is_err());
    }

    #[test]
    fn test_stock_policy_period() {
        let config = CatalogConfig::builder("store")
            .stock_policy(StockPolicy::new(3600).hiding_sold_out())
            .build()
            .unwrap();

        assert_eq!(config.refresh_period(), Duration::hours(1));
        assert!(config.hide_if_sold_out());
    }

    #[test]
    fn test_catalog_file_from_toml() {
        let file = CatalogFile::from_toml(
            r#"
            [[catalogs]]
            id = "bakery"
            global_multiplier = { base = 1.5 }
            purchase_policy = { stop_on_first_failure = true }
            delivery = { type = "mailbox" }
            payment_destination = { type = "account", account = "bakery-till" }

            [catalogs.stock_policy]
            refresh_period_secs = 86400
            sold_out_tooltip = "Come back tomorrow"

            [[catalogs.definitions]]
            id = "cakes"
            limited_stock = { lower = 2, upper = 4 }
            sources = [{ type = "recipe", recipes = ["bake-cake"] }]

            [[catalogs.definitions.quality_tiers]]
            name = "excellent"
            weight = 1.0
            static_multiplier = 2.0
            "#,
        )
        .unwrap();

        let bakery = &file.catalogs[0];
        assert_eq!(bakery.id, "bakery");
        assert_eq!(bakery.global_multiplier.base, 1.5);
        assert!(bakery.purchase_policy.stop_on_first_failure);
        assert_eq!(bakery.delivery, DeliveryMethod::Mailbox);
        assert_eq!(bakery.sold_out_tooltip(), Some("Come back tomorrow"));
        assert_eq!(
            bakery.definitions[0].limited_stock,
            Some(StockRange::new(2, 4))
        );
        assert_eq!(bakery.definitions[0].quality_tiers[0].static_multiplier, 2.0);
        assert_eq!(bakery.definitions[0].chance, 1.0);
        assert_eq!(bakery.definitions[0].stock_scope(), "cakes");
    }

    #[test]
    fn test_stock_pool_overrides_scope() {
        let definition = PurchaseItemDefinition::new("front", chairs()).with_stock_pool("chairs");
        assert_eq!(definition.stock_scope(), "chairs");

        let file = CatalogFile::from_toml(
            r#"
            [[catalogs]]
            id = "store"
            [[catalogs.definitions]]
            id = "back"
            stock_pool = "chairs"
            sources = [{ type = "explicit", items = ["chair"] }]
            "#,
        )
        .unwrap();
        assert_eq!(file.catalogs[0].definitions[0].stock_scope(), "chairs");
    }

    #[test]
    fn test_duplicate_catalog_ids_rejected() {
        let result = CatalogFile::from_toml(
            r#"
            [[catalogs]]
            id = "a"
            [[catalogs]]
            id = "a"
            "#,
        );
        assert!(result.is_err());
    }
}
