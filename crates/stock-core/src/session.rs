//! # Catalog Session
//!
//! One actor browsing one catalog: open it, look at the rows, then either
//! confirm a selection or walk away.
//!
//! ```text
//! CatalogSession::new ─▶ open() ─▶ rows() ─▶ confirm(response)
//!                          │                     │
//!                   generate / replay      execute + dispose previews
//! ```
//!
//! Previews created by `open` belong to the session's [`PreviewPool`] and
//! are disposed on every exit path: a confirmed purchase, a declined
//! presentation, an explicit `cancel` or `close`, or reopening. Disposal
//! needs the host, so a session dropped while still holding previews
//! cannot clean up after itself; that is logged as a warning.

use crate::config::CatalogConfig;
use crate::funds::Funds;
use crate::host::ItemHost;
use crate::item::ItemRegistry;
use crate::ledger::LedgerRegistry;
use crate::materialize::PreviewPool;
use crate::pipeline::{self, CachedRow, GenerationContext};
use crate::resolver::Resolver;
use crate::transaction::{self, PurchaseContext, SelectionEntry, TransactionResult};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What the presentation layer hands back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationResponse {
    pub accepted: bool,
    #[serde(default)]
    pub selection: Vec<SelectionEntry>,
}

impl PresentationResponse {
    pub fn accept(selection: Vec<SelectionEntry>) -> Self {
        Self {
            accepted: true,
            selection,
        }
    }

    pub fn decline() -> Self {
        Self::default()
    }
}

/// RNG for a catalog: seeded when the catalog pins a seed, otherwise from entropy
pub fn rng_for(config: &CatalogConfig) -> ChaCha8Rng {
    match config.rng_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// A single browse-and-buy interaction with a catalog
///
/// Every opened session must end in [`confirm`](Self::confirm),
/// [`cancel`](Self::cancel) or [`close`](Self::close).
#[derive(Debug)]
#[must_use = "an opened session holds previews until it is confirmed, cancelled or closed"]
pub struct CatalogSession {
    config: CatalogConfig,
    resolver: Resolver,
    previews: PreviewPool,
    rows: Vec<CachedRow>,
    rng: ChaCha8Rng,
}

impl CatalogSession {
    pub fn new(config: CatalogConfig, resolver: Resolver) -> Self {
        let rng = rng_for(&config);
        Self {
            config,
            resolver,
            previews: PreviewPool::new(),
            rows: Vec::new(),
            rng,
        }
    }

    /// Builder: use a caller-provided RNG
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Rows from the last `open`
    pub fn rows(&self) -> &[CachedRow] {
        &self.rows
    }

    pub fn preview_count(&self) -> usize {
        self.previews.len()
    }

    /// No previews outstanding
    pub fn is_settled(&self) -> bool {
        self.previews.is_empty()
    }

    /// Generate (or replay) the catalog's rows for this actor
    pub fn open(
        &mut self,
        registry: &ItemRegistry,
        ledgers: &mut LedgerRegistry,
        host: &mut dyn ItemHost,
        now: DateTime<Utc>,
    ) -> &[CachedRow] {
        if !self.previews.is_empty() {
            self.previews.dispose_all(&mut *host);
        }

        let ledger = ledgers.ledger_for(&self.config);
        let mut ctx = GenerationContext {
            registry,
            resolver: &self.resolver,
            now,
            host,
            previews: &mut self.previews,
            rng: &mut self.rng,
        };
        self.rows = pipeline::generate(&self.config, ledger, &mut ctx);

        info!(
            "Opened catalog {} for {}: {} rows, {} previews",
            self.config.id,
            self.resolver.actor,
            self.rows.len(),
            self.previews.len()
        );
        &self.rows
    }

    /// Act on the presentation response. Previews are disposed and the
    /// current rows dropped whatever the response was.
    pub fn confirm(
        &mut self,
        response: PresentationResponse,
        ledgers: &mut LedgerRegistry,
        host: &mut dyn ItemHost,
        funds: &mut dyn Funds,
    ) -> Option<TransactionResult> {
        if !response.accepted || response.selection.is_empty() {
            debug!("Catalog {} closed without a purchase", self.config.id);
            self.cancel(host);
            return None;
        }

        let rows = std::mem::take(&mut self.rows);
        let ledger = ledgers.ledger_for(&self.config);
        let mut ctx = PurchaseContext {
            resolver: &self.resolver,
            host,
            funds,
            previews: &mut self.previews,
        };
        let policy = self.config.purchase_policy;
        Some(transaction::execute(
            &response.selection,
            &rows,
            &self.config,
            ledger,
            &mut ctx,
            policy,
        ))
    }

    /// Close without buying; returns how many previews were disposed
    pub fn cancel(&mut self, host: &mut dyn ItemHost) -> usize {
        self.rows.clear();
        self.previews.dispose_all(host)
    }

    /// Cancel and consume the session
    pub fn close(mut self, host: &mut dyn ItemHost) -> usize {
        self.cancel(host)
    }
}

impl Drop for CatalogSession {
    fn drop(&mut self) {
        if !self.is_settled() {
            warn!(
                "Catalog session {} for {} dropped with {} live previews",
                self.config.id,
                self.resolver.actor,
                self.previews.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PurchaseItemDefinition, StockPolicy, StockRange};
    use crate::funds::InMemoryFunds;
    use crate::host::InMemoryHost;
    use crate::item::{ItemDefinition, ItemSource};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    fn registry() -> ItemRegistry {
        ItemRegistry::new()
            .with_item(ItemDefinition::new("chair", "Chair", 100))
            .with_item(ItemDefinition::new("lamp", "Lamp", 40))
    }

    fn catalog() -> CatalogConfig {
        CatalogConfig::builder("furniture")
            .definition(
                PurchaseItemDefinition::new(
                    "goods",
                    ItemSource::Explicit {
                        items: vec!["chair".into(), "lamp".into()],
                    },
                )
                .with_stock(StockRange::exactly(1)),
            )
            .stock_policy(StockPolicy::new(3600))
            .rng_seed(11)
            .build()
            .unwrap()
    }

    #[test]
    fn test_open_then_decline_disposes_previews() {
        let mut host = InMemoryHost::new();
        let mut funds = InMemoryFunds::new();
        let mut ledgers = LedgerRegistry::new();
        let mut session = CatalogSession::new(catalog(), Resolver::new("bella"));

        let rows = session.open(&registry(), &mut ledgers, &mut host, t0()).len();
        assert_eq!(rows, 2);
        assert_eq!(host.live_previews(), 2);

        let result = session.confirm(PresentationResponse::decline(), &mut ledgers, &mut host, &mut funds);
        assert!(result.is_none());
        assert_eq!(host.live_previews(), 0);
        assert!(session.rows().is_empty());
    }

    #[test]
    fn test_confirm_purchases_and_cleans_up() {
        let mut host = InMemoryHost::new();
        let mut funds = InMemoryFunds::new().with_account("bella", 500);
        let mut ledgers = LedgerRegistry::new();
        let mut session = CatalogSession::new(catalog(), Resolver::new("bella"));

        session.open(&registry(), &mut ledgers, &mut host, t0());
        let chair = session
            .rows()
            .iter()
            .find(|r| r.candidate.item_id == "chair")
            .map(|r| r.row_id)
            .unwrap();

        let result = session
            .confirm(
                PresentationResponse::accept(vec![SelectionEntry::new(chair, 2)]),
                &mut ledgers,
                &mut host,
                &mut funds,
            )
            .unwrap();

        assert_eq!(result.purchased_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(funds.balance("bella"), 400);
        assert_eq!(host.live_previews(), 0);
        assert_eq!(session.preview_count(), 0);
    }

    #[test]
    fn test_reopen_within_window_shows_depleted_stock() {
        let mut host = InMemoryHost::new();
        let mut funds = InMemoryFunds::new().with_account("bella", 500);
        let mut ledgers = LedgerRegistry::new();

        let mut first = CatalogSession::new(catalog(), Resolver::new("bella"));
        first.open(&registry(), &mut ledgers, &mut host, t0());
        let row_id = first.rows()[0].row_id;
        first.confirm(
            PresentationResponse::accept(vec![SelectionEntry::new(row_id, 1)]),
            &mut ledgers,
            &mut host,
            &mut funds,
        );

        let mut second = CatalogSession::new(catalog(), Resolver::new("bella"));
        let rows = second.open(&registry(), &mut ledgers, &mut host, t0() + Duration::minutes(5));
        assert!(rows[0].sold_out);
        assert!(!rows[0].is_purchasable());
        assert!(!rows[1].sold_out);
        second.cancel(&mut host);
        assert_eq!(host.live_previews(), 0);
    }

    #[test]
    fn test_reopening_same_session_does_not_leak_previews() {
        let mut host = InMemoryHost::new();
        let mut ledgers = LedgerRegistry::new();
        let mut session = CatalogSession::new(catalog(), Resolver::new("bella"));

        session.open(&registry(), &mut ledgers, &mut host, t0());
        session.open(&registry(), &mut ledgers, &mut host, t0() + Duration::minutes(1));

        assert_eq!(host.live_previews(), 2);
        assert_eq!(session.cancel(&mut host), 2);
        assert_eq!(host.double_disposals(), 0);
    }

    #[test]
    fn test_every_exit_path_settles_the_session() {
        let mut host = InMemoryHost::new();
        let mut funds = InMemoryFunds::new().with_account("bella", 500);
        let mut ledgers = LedgerRegistry::new();

        let mut declined = CatalogSession::new(catalog(), Resolver::new("bella"));
        declined.open(&registry(), &mut ledgers, &mut host, t0());
        assert!(!declined.is_settled());
        declined.confirm(PresentationResponse::decline(), &mut ledgers, &mut host, &mut funds);
        assert!(declined.is_settled());

        let mut bought = CatalogSession::new(catalog(), Resolver::new("bella"));
        bought.open(&registry(), &mut ledgers, &mut host, t0());
        let row_id = bought.rows()[1].row_id;
        bought.confirm(
            PresentationResponse::accept(vec![SelectionEntry::new(row_id, 1)]),
            &mut ledgers,
            &mut host,
            &mut funds,
        );
        assert!(bought.is_settled());

        let mut closed = CatalogSession::new(catalog(), Resolver::new("bella"));
        closed.open(&registry(), &mut ledgers, &mut host, t0());
        assert_eq!(closed.close(&mut host), 2);

        assert_eq!(host.live_previews(), 0);
        assert_eq!(host.double_disposals(), 0);
    }

    #[test]
    fn test_seeded_catalogs_are_reproducible() {
        let config = catalog();
        let mut a = rng_for(&config);
        let mut b = rng_for(&config);
        assert_eq!(rand::Rng::gen::<u64>(&mut a), rand::Rng::gen::<u64>(&mut b));
    }
}
