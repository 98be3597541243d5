//! Capability matching between an agent and a signifier.
//!
//! Ability types are compared in their compacted display form, so the
//! agent's capability set and a signifier's recommendations must be
//! compacted against the same registry.

use std::collections::BTreeSet;

use crate::namespace::NamespaceRegistry;
use crate::signifier::{Ability, Signifier};

/// Ability types an agent declares, compacted against a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentCapabilitySet {
    ability_types: BTreeSet<String>,
}

impl AgentCapabilitySet {
    /// Collects the types of every ability bundle, compacted.
    ///
    /// The generic `Ability` marker never appears: `Ability` strips it on
    /// construction.
    #[must_use]
    pub fn from_abilities(abilities: &[Ability], registry: &NamespaceRegistry) -> Self {
        let ability_types = abilities
            .iter()
            .flat_map(Ability::semantic_types)
            .map(|t| registry.compact(t))
            .collect();
        Self { ability_types }
    }

    /// Builds a set from already compacted or absolute type strings.
    #[must_use]
    pub fn from_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ability_types: types.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, ability_type: &str) -> bool {
        self.ability_types.contains(ability_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ability_types.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ability_types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ability_types.is_empty()
    }
}

/// Every recommended type must be held by the agent. An empty
/// recommendation list is trivially complementary.
#[must_use]
pub fn complementary_ability_types<'a, I>(caps: &AgentCapabilitySet, recommended: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    recommended.into_iter().all(|t| caps.contains(t))
}

/// Decides whether `signifier` is complementary to the agent's capabilities.
///
/// All ability bundles are flattened into one set of types before the check.
#[must_use]
pub fn is_complementary(caps: &AgentCapabilitySet, signifier: &Signifier, registry: &NamespaceRegistry) -> bool {
    let recommended: Vec<String> = signifier
        .recommended_ability_types()
        .map(|t| registry.compact(t))
        .collect();
    complementary_ability_types(caps, recommended.iter().map(String::as_str))
}
