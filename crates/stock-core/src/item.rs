//! # Item Definitions and Sources
//!
//! The item registry (everything that can be materialized) and the
//! pluggable [`ItemSource`] resolvers that enumerate purchase candidates
//! from it. Items are loaded from `config/items.toml`.

use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A materializable item definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Unique item identifier (e.g., "chair-oak")
    pub id: String,

    /// Display name
    pub name: String,

    /// Base cost in whole currency units
    pub base_cost: i64,

    /// Category tags used by tag sources and for presentation
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemDefinition {
    /// Create a new item definition
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_cost: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_cost,
            tags: Vec::new(),
        }
    }

    /// Builder: add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A recipe producing an item, optionally with its own cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique recipe identifier
    pub id: String,

    /// Item id of the final product
    pub product: String,

    /// Cost override; defaults to the product's base cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<i64>,
}

/// Registry of item definitions, recipes and named inventories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemRegistry {
    #[serde(default)]
    pub items: Vec<ItemDefinition>,

    #[serde(default)]
    pub recipes: Vec<Recipe>,

    /// Named inventories and the item ids they hold
    #[serde(default)]
    pub inventories: HashMap<String, Vec<String>>,
}

impl ItemRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item definition
    pub fn add_item(&mut self, item: ItemDefinition) {
        self.items.push(item);
    }

    /// Builder: add an item definition
    pub fn with_item(mut self, item: ItemDefinition) -> Self {
        self.add_item(item);
        self
    }

    /// Builder: add a recipe
    pub fn with_recipe(mut self, recipe: Recipe) -> Self {
        self.recipes.push(recipe);
        self
    }

    /// Builder: add a named inventory
    pub fn with_inventory(mut self, name: impl Into<String>, items: Vec<String>) -> Self {
        self.inventories.insert(name.into(), items);
        self
    }

    /// Find an item definition by id
    pub fn get(&self, item_id: &str) -> Option<&ItemDefinition> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Find a recipe by id
    pub fn recipe(&self, recipe_id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id == recipe_id)
    }

    /// Contents of a named inventory
    pub fn inventory(&self, name: &str) -> Option<&[String]> {
        self.inventories.get(name).map(Vec::as_slice)
    }

    /// Load registry from TOML string
    pub fn from_toml(toml_str: &str) -> CatalogResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    fn candidate(&self, item_id: &str) -> CatalogResult<Candidate> {
        self.get(item_id)
            .map(Candidate::from_definition)
            .ok_or_else(|| CatalogError::DefinitionNotFound {
                item_id: item_id.to_string(),
            })
    }

    fn recipe_candidate(&self, recipe_id: &str) -> CatalogResult<Candidate> {
        let recipe = self
            .recipe(recipe_id)
            .ok_or_else(|| CatalogError::RecipeNotFound {
                recipe_id: recipe_id.to_string(),
            })?;
        let mut candidate = self.candidate(&recipe.product)?;
        if let Some(cost) = recipe.cost {
            candidate.base_cost = cost;
        }
        candidate.recipe_id = Some(recipe.id.clone());
        Ok(candidate)
    }
}

/// A resolved purchase candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Item id of what gets materialized
    pub item_id: String,

    /// Display name
    pub name: String,

    /// Base cost before any multiplier
    pub base_cost: i64,

    /// Category tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Recipe the item is produced through, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
}

impl Candidate {
    /// Build a plain (non-recipe) candidate from a definition
    pub fn from_definition(def: &ItemDefinition) -> Self {
        Self {
            item_id: def.id.clone(),
            name: def.name.clone(),
            base_cost: def.base_cost,
            tags: def.tags.clone(),
            recipe_id: None,
        }
    }

    /// Identity used for stock keys: the recipe id when produced through
    /// a recipe, otherwise the item id
    pub fn resolved_id(&self) -> &str {
        self.recipe_id.as_deref().unwrap_or(&self.item_id)
    }
}

/// Pluggable resolver enumerating candidates for one purchase definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemSource {
    /// Explicit list of item ids
    Explicit { items: Vec<String> },

    /// Every registered item carrying the given tags
    Tagged {
        tags: Vec<String>,
        /// Require every tag instead of any one of them
        #[serde(default)]
        match_all: bool,
    },

    /// Products of the given recipes
    Recipe { recipes: Vec<String> },

    /// Current contents of a named inventory
    Inventory { inventory: String },
}

impl ItemSource {
    /// Enumerate candidates against the registry.
    ///
    /// Stateless and restartable; re-invoked on every refresh. A missing
    /// definition surfaces as an `Err` entry so the caller can log and skip
    /// just that candidate.
    pub fn candidates<'a>(
        &'a self,
        registry: &'a ItemRegistry,
    ) -> Box<dyn Iterator<Item = CatalogResult<Candidate>> + 'a> {
        match self {
            ItemSource::Explicit { items } => {
                Box::new(items.iter().map(move |id| registry.candidate(id)))
            }
            ItemSource::Tagged { tags, match_all } => Box::new(
                registry
                    .items
                    .iter()
                    .filter(move |item| {
                        let has = |tag: &String| item.tags.contains(tag);
                        if *match_all {
                            tags.iter().all(has)
                        } else {
                            tags.iter().any(has)
                        }
                    })
                    .map(|item| Ok(Candidate::from_definition(item))),
            ),
            ItemSource::Recipe { recipes } => {
                Box::new(recipes.iter().map(move |id| registry.recipe_candidate(id)))
            }
            ItemSource::Inventory { inventory } => match registry.inventory(inventory) {
                Some(contents) => Box::new(contents.iter().map(move |id| registry.candidate(id))),
                None => Box::new(std::iter::once(Err(CatalogError::InventoryNotFound {
                    inventory: inventory.clone(),
                }))),
            },
        }
    }
}
