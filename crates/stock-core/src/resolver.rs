//! # Resolver, Predicates and Tested Multipliers
//!
//! The actor a catalog is opened for is opaque to the engine except for
//! its id, household account and a set of tags. Visibility/enable tests and
//! conditional price multipliers are evaluated against it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The actor a catalog is shown to and purchases are made for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolver {
    /// Actor identifier
    pub actor: String,

    /// Household funds account the actor pays from
    pub household: String,

    /// Free-form tags predicates test against (traits, memberships, ...)
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Resolver {
    /// Create a resolver whose household account is named after the actor
    pub fn new(actor: impl Into<String>) -> Self {
        let actor = actor.into();
        Self {
            household: actor.clone(),
            actor,
            tags: BTreeSet::new(),
        }
    }

    /// Builder: set the household account
    pub fn with_household(mut self, household: impl Into<String>) -> Self {
        self.household = household.into();
        self
    }

    /// Builder: add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A test evaluated against a resolver
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    Always,
    HasTag {
        tag: String,
    },
    LacksTag {
        tag: String,
    },
    All {
        tests: Vec<Predicate>,
    },
    Any {
        tests: Vec<Predicate>,
    },
    Not {
        test: Box<Predicate>,
    },
}

impl Predicate {
    pub fn has_tag(tag: impl Into<String>) -> Self {
        Predicate::HasTag { tag: tag.into() }
    }

    pub fn lacks_tag(tag: impl Into<String>) -> Self {
        Predicate::LacksTag { tag: tag.into() }
    }

    /// Evaluate the test
    pub fn evaluate(&self, resolver: &Resolver) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::HasTag { tag } => resolver.has_tag(tag),
            Predicate::LacksTag { tag } => !resolver.has_tag(tag),
            Predicate::All { tests } => tests.iter().all(|t| t.evaluate(resolver)),
            Predicate::Any { tests } => tests.iter().any(|t| t.evaluate(resolver)),
            Predicate::Not { test } => !test.evaluate(resolver),
        }
    }
}

/// One conditional factor of a [`TestedMultiplier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierModifier {
    #[serde(default)]
    pub test: Predicate,
    pub multiplier: f64,
}

/// A base multiplier scaled by every modifier whose test passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestedMultiplier {
    #[serde(default = "default_one")]
    pub base: f64,

    #[serde(default)]
    pub modifiers: Vec<MultiplierModifier>,
}

pub(crate) fn default_one() -> f64 {
    1.0
}

impl TestedMultiplier {
    /// A fixed multiplier without conditions
    pub fn fixed(base: f64) -> Self {
        Self {
            base,
            modifiers: Vec::new(),
        }
    }

    /// Builder: add a conditional factor
    pub fn with_modifier(mut self, test: Predicate, multiplier: f64) -> Self {
        self.modifiers.push(MultiplierModifier { test, multiplier });
        self
    }

    /// Evaluate the multiplier for a resolver
    pub fn evaluate(&self, resolver: &Resolver) -> f64 {
        self.modifiers
            .iter()
            .filter(|m| m.test.evaluate(resolver))
            .fold(self.base, |acc, m| acc * m.multiplier)
    }

    /// True if the base and every factor are finite and non-negative
    pub fn is_valid(&self) -> bool {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        ok(self.base) && self.modifiers.iter().all(|m| ok(m.multiplier))
    }
}

impl Default for TestedMultiplier {
    fn default() -> Self {
        Self::fixed(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let resolver = Resolver::new("bella").with_tag("frugal");

        assert!(Predicate::Always.evaluate(&resolver));
        assert!(Predicate::has_tag("frugal").evaluate(&resolver));
        assert!(Predicate::lacks_tag("rich").evaluate(&resolver));
        assert!(!Predicate::All {
            tests: vec![Predicate::has_tag("frugal"), Predicate::has_tag("rich")]
        }
        .evaluate(&resolver));
        assert!(Predicate::Any {
            tests: vec![Predicate::has_tag("frugal"), Predicate::has_tag("rich")]
        }
        .evaluate(&resolver));
        assert!(!Predicate::Not {
            test: Box::new(Predicate::Always)
        }
        .evaluate(&resolver));
    }

    #[test]
    fn test_multiplier_applies_matching_modifiers() {
        let multiplier = TestedMultiplier::fixed(1.5)
            .with_modifier(Predicate::has_tag("frugal"), 0.5)
            .with_modifier(Predicate::has_tag("rich"), 3.0);

        assert_eq!(multiplier.evaluate(&Resolver::new("a")), 1.5);
        assert_eq!(
            multiplier.evaluate(&Resolver::new("b").with_tag("frugal")),
            0.75
        );
        assert!(multiplier.is_valid());
        assert!(!TestedMultiplier::fixed(-1.0).is_valid());
        assert!(!TestedMultiplier::fixed(f64::NAN).is_valid());
    }

    #[test]
    fn test_household_defaults_to_actor() {
        let resolver = Resolver::new("bella");
        assert_eq!(resolver.household, "bella");
        assert_eq!(resolver.with_household("goth").household, "goth");
    }

    #[test]
    fn test_predicate_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            test: Predicate,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [test]
            type = "any"
            tests = [{ type = "has_tag", tag = "vip" }, { type = "always" }]
            "#,
        )
        .unwrap();
        assert!(parsed.test.evaluate(&Resolver::new("x")));
    }
}
