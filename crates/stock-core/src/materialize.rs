//! # Materialized Items
//!
//! Instances constructed by the host, either as previews for pricing and
//! presentation or as real purchases headed for delivery. A
//! [`MaterializedItem`] is deliberately not `Clone`: whoever holds it owns
//! it, and it leaves that ownership exactly once, by being delivered or by
//! being handed back to [`ItemHost::destroy`].

use crate::host::ItemHost;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Opaque identity of a materialized instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemInstanceId(pub u64);

impl std::fmt::Display for ItemInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why an instance was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Shown in the catalog, destroyed at session end
    Preview,
    /// Bought, handed to delivery
    Purchase,
}

/// A constructed instance
#[derive(Debug, PartialEq, Serialize)]
pub struct MaterializedItem {
    pub id: ItemInstanceId,

    /// Definition the instance was built from
    pub item_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,

    pub purpose: Purpose,

    /// Current value in whole currency units
    pub value: i64,

    /// Value multiplier applied once the item is placed
    pub depreciation: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    pub state: BTreeMap<String, String>,
}

impl MaterializedItem {
    pub fn new(id: ItemInstanceId, item_id: impl Into<String>, purpose: Purpose, value: i64) -> Self {
        Self {
            id,
            item_id: item_id.into(),
            recipe_id: None,
            purpose,
            value,
            depreciation: 1.0,
            quality: None,
            state: BTreeMap::new(),
        }
    }

    pub fn is_preview(&self) -> bool {
        self.purpose == Purpose::Preview
    }
}

/// A mutation applied to a purchased item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Set a state key
    SetState { key: String, value: String },
    /// Scale the item's value, rounding to whole units
    ScaleValue { multiplier: f64 },
}

impl ItemEffect {
    pub fn set_state(key: impl Into<String>, value: impl Into<String>) -> Self {
        ItemEffect::SetState {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn apply(&self, item: &mut MaterializedItem) {
        match self {
            ItemEffect::SetState { key, value } => {
                item.state.insert(key.clone(), value.clone());
            }
            ItemEffect::ScaleValue { multiplier } => {
                item.value = (item.value as f64 * multiplier).round() as i64;
            }
        }
    }
}

/// Owner of every preview instance created during a catalog session
#[derive(Debug, Default)]
pub struct PreviewPool {
    items: BTreeMap<ItemInstanceId, MaterializedItem>,
}

impl PreviewPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a preview
    pub fn track(&mut self, item: MaterializedItem) -> ItemInstanceId {
        let id = item.id;
        self.items.insert(id, item);
        id
    }

    pub fn contains(&self, id: ItemInstanceId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn get(&self, id: ItemInstanceId) -> Option<&MaterializedItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Destroy every tracked preview; returns how many were destroyed
    pub fn dispose_all(&mut self, host: &mut dyn ItemHost) -> usize {
        let items = std::mem::take(&mut self.items);
        let count = items.len();
        for (_, item) in items {
            host.destroy(item);
        }
        if count > 0 {
            debug!("Disposed {} preview items", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::item::{Candidate, ItemDefinition};

    #[test]
    fn test_effects() {
        let mut item = MaterializedItem::new(ItemInstanceId(1), "chair", Purpose::Purchase, 100);

        ItemEffect::set_state("condition", "pristine").apply(&mut item);
        ItemEffect::ScaleValue { multiplier: 1.25 }.apply(&mut item);

        assert_eq!(item.state.get("condition").map(String::as_str), Some("pristine"));
        assert_eq!(item.value, 125);
    }

    #[test]
    fn test_pool_disposes_each_item_once() {
        let mut host = InMemoryHost::new();
        let candidate = Candidate::from_definition(&ItemDefinition::new("chair", "Chair", 100));
        let mut pool = PreviewPool::new();

        for _ in 0..3 {
            let item = host.materialize(&candidate, Purpose::Preview).unwrap();
            pool.track(item);
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(host.live_count(), 3);

        assert_eq!(pool.dispose_all(&mut host), 3);
        assert_eq!(pool.dispose_all(&mut host), 0);
        assert!(pool.is_empty());
        assert_eq!(host.live_count(), 0);
        assert_eq!(host.double_disposals(), 0);
    }
}
