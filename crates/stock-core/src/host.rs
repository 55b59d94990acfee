//! # Item Host
//!
//! The seam between the engine and whatever world items live in.
//! The engine never constructs, places or destroys items itself; it asks
//! an [`ItemHost`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ItemHost (trait)                       │
//! │  ├── materialize()      preview or purchase instance        │
//! │  ├── destroy()          ends ownership of an instance       │
//! │  ├── deliver()          moves ownership to a destination    │
//! │  ├── run_effect()       named catalog-level effect          │
//! │  └── notify()           aggregate purchase notification     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┴─────────────────┐
//!  ┌───────┴───────┐                   ┌───────┴───────┐
//!  │ InMemoryHost  │                   │  game / shop  │
//!  │ (api, tests)  │                   │  integration  │
//!  └───────────────┘                   └───────────────┘
//! ```

use crate::item::Candidate;
use crate::materialize::{ItemInstanceId, MaterializedItem, Purpose};
use crate::resolver::Resolver;
use crate::transaction::TransactionResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Where a purchased item ends up
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// The actor's own inventory
    #[default]
    Inventory,
    /// The shared household inventory
    Household,
    /// The household mailbox
    Mailbox,
    /// Placed on the ground near the actor
    NearActor,
}

impl DeliveryMethod {
    /// Destination name for a resolver (e.g. `mailbox:goth`)
    pub fn destination(&self, resolver: &Resolver) -> String {
        match self {
            DeliveryMethod::Inventory => format!("inventory:{}", resolver.actor),
            DeliveryMethod::Household => format!("household:{}", resolver.household),
            DeliveryMethod::Mailbox => format!("mailbox:{}", resolver.household),
            DeliveryMethod::NearActor => format!("near:{}", resolver.actor),
        }
    }
}

/// Host collaborator for item lifecycle and side effects
pub trait ItemHost {
    /// Construct an instance of a candidate. `None` means creation failed.
    fn materialize(&mut self, candidate: &Candidate, purpose: Purpose) -> Option<MaterializedItem>;

    /// Destroy an instance, ending its ownership
    fn destroy(&mut self, item: MaterializedItem);

    /// Place an item at its destination. On refusal the item comes back
    /// to the caller, who must destroy it.
    fn deliver(
        &mut self,
        method: &DeliveryMethod,
        resolver: &Resolver,
        item: MaterializedItem,
    ) -> Result<(), MaterializedItem>;

    /// Run a named catalog-level effect
    fn run_effect(&mut self, _effect: &str, _resolver: &Resolver) {}

    /// Show the aggregate outcome of a transaction
    fn notify(&mut self, _resolver: &Resolver, _result: &TransactionResult) {}
}

/// In-memory host that records everything it is asked to do
#[derive(Debug, Default)]
pub struct InMemoryHost {
    next_id: u64,
    live: BTreeMap<ItemInstanceId, Purpose>,
    destinations: BTreeMap<String, Vec<MaterializedItem>>,
    refused_creation: HashSet<String>,
    refused_delivery: HashSet<String>,
    effects: Vec<(String, String)>,
    notifications: Vec<TransactionResult>,
    created: usize,
    destroyed: usize,
    double_disposals: usize,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: fail every purchase-time creation of this item
    pub fn refusing_creation_of(mut self, item_id: impl Into<String>) -> Self {
        self.refused_creation.insert(item_id.into());
        self
    }

    /// Builder: refuse delivery of this item
    pub fn refusing_delivery_of(mut self, item_id: impl Into<String>) -> Self {
        self.refused_delivery.insert(item_id.into());
        self
    }

    /// Items delivered to a destination
    pub fn delivered_to(&self, destination: &str) -> &[MaterializedItem] {
        self.destinations
            .get(destination)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total items delivered anywhere
    pub fn delivered_count(&self) -> usize {
        self.destinations.values().map(Vec::len).sum()
    }

    /// Instances created and neither destroyed nor delivered
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live preview instances
    pub fn live_previews(&self) -> usize {
        self.live.values().filter(|p| **p == Purpose::Preview).count()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed
    }

    /// Destroy calls for instances that were not live
    pub fn double_disposals(&self) -> usize {
        self.double_disposals
    }

    /// `(effect, actor)` pairs in run order
    pub fn effects(&self) -> &[(String, String)] {
        &self.effects
    }

    pub fn notifications(&self) -> &[TransactionResult] {
        &self.notifications
    }
}

impl ItemHost for InMemoryHost {
    fn materialize(&mut self, candidate: &Candidate, purpose: Purpose) -> Option<MaterializedItem> {
        if purpose == Purpose::Purchase && self.refused_creation.contains(&candidate.item_id) {
            return None;
        }

        self.next_id += 1;
        let id = ItemInstanceId(self.next_id);
        self.live.insert(id, purpose);
        self.created += 1;

        let mut item = MaterializedItem::new(id, candidate.item_id.clone(), purpose, candidate.base_cost);
        item.recipe_id = candidate.recipe_id.clone();
        Some(item)
    }

    fn destroy(&mut self, item: MaterializedItem) {
        if self.live.remove(&item.id).is_none() {
            warn!("Destroy requested for non-live item {}", item.id);
            self.double_disposals += 1;
            return;
        }
        self.destroyed += 1;
    }

    fn deliver(
        &mut self,
        method: &DeliveryMethod,
        resolver: &Resolver,
        item: MaterializedItem,
    ) -> Result<(), MaterializedItem> {
        if self.refused_delivery.contains(&item.item_id) {
            return Err(item);
        }
        self.live.remove(&item.id);
        self.destinations
            .entry(method.destination(resolver))
            .or_default()
            .push(item);
        Ok(())
    }

    fn run_effect(&mut self, effect: &str, resolver: &Resolver) {
        self.effects
            .push((effect.to_string(), resolver.actor.clone()));
    }

    fn notify(&mut self, _resolver: &Resolver, result: &TransactionResult) {
        self.notifications.push(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemDefinition;

    fn candidate(id: &str) -> Candidate {
        Candidate::from_definition(&ItemDefinition::new(id, id, 50))
    }

    #[test]
    fn test_destinations() {
        let resolver = Resolver::new("bella").with_household("goth");

        assert_eq!(DeliveryMethod::Inventory.destination(&resolver), "inventory:bella");
        assert_eq!(DeliveryMethod::Household.destination(&resolver), "household:goth");
        assert_eq!(DeliveryMethod::Mailbox.destination(&resolver), "mailbox:goth");
        assert_eq!(DeliveryMethod::NearActor.destination(&resolver), "near:bella");
    }

    #[test]
    fn test_delivery_transfers_ownership() {
        let mut host = InMemoryHost::new();
        let resolver = Resolver::new("bella");
        let item = host.materialize(&candidate("chair"), Purpose::Purchase).unwrap();

        assert!(host.deliver(&DeliveryMethod::Mailbox, &resolver, item).is_ok());
        assert_eq!(host.live_count(), 0);
        assert_eq!(host.delivered_to("mailbox:bella").len(), 1);
    }

    #[test]
    fn test_refused_delivery_returns_item() {
        let mut host = InMemoryHost::new().refusing_delivery_of("chair");
        let resolver = Resolver::new("bella");
        let item = host.materialize(&candidate("chair"), Purpose::Purchase).unwrap();

        let returned = host
            .deliver(&DeliveryMethod::Inventory, &resolver, item)
            .unwrap_err();
        assert_eq!(host.live_count(), 1);

        host.destroy(returned);
        assert_eq!(host.live_count(), 0);
        assert_eq!(host.delivered_count(), 0);
    }

    #[test]
    fn test_refused_creation_only_affects_purchases() {
        let mut host = InMemoryHost::new().refusing_creation_of("chair");

        assert!(host.materialize(&candidate("chair"), Purpose::Purchase).is_none());
        assert!(host.materialize(&candidate("chair"), Purpose::Preview).is_some());
        assert_eq!(host.live_previews(), 1);
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let mut host = InMemoryHost::new();
        let item = host.materialize(&candidate("lamp"), Purpose::Preview).unwrap();
        let ghost = MaterializedItem::new(item.id, "lamp", Purpose::Preview, 50);

        host.destroy(item);
        host.destroy(ghost);
        assert_eq!(host.destroyed_count(), 1);
        assert_eq!(host.double_disposals(), 1);
    }
}
