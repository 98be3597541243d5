//! Observable-property events and the per-subscriber event filter.
//!
//! A resource exposes its signifiers as observable properties. Every change
//! to that set is published as one [`ObsEvent`] batch, and each subscriber
//! decides through its own filter whether to receive the batch.
//!
//! The decision looks at a single property only: the first one found in
//! `added`, then `changed`, then `removed`. The rest of the batch follows
//! that decision.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HyperError, HyperResult};
use crate::matcher::{complementary_ability_types, AgentCapabilitySet};
use crate::profile::ResourceDescription;
use crate::situation::SituationalContextValidator;
use crate::state::SharedState;
use crate::vocab;

/// Interaction guidance carried by an exposed signifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    /// Recommended ability types, compacted.
    pub recommended_abilities: Vec<String>,
    /// Belief contents the recommended contexts ask for.
    pub recommended_contexts: Vec<String>,
}

/// The `signifier` observable property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignifierProperty {
    pub iri: String,
    /// Required action types, compacted.
    pub action_types: Vec<String>,
    /// Present only when interaction guidance is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<Guidance>,
}

impl SignifierProperty {
    /// Recommended ability types; empty without guidance.
    pub fn recommended_abilities(&self) -> impl Iterator<Item = &str> {
        self.guidance
            .iter()
            .flat_map(|g| g.recommended_abilities.iter().map(String::as_str))
    }
}

/// An observable property of an exposed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObsProperty {
    Signifier(SignifierProperty),
    Plain {
        name: String,
        values: Vec<String>,
    },
}

impl ObsProperty {
    #[must_use]
    pub fn plain<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Plain {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Property name; `signifier` for signifier properties.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Signifier(_) => vocab::property::SIGNIFIER,
            Self::Plain { name, .. } => name,
        }
    }
}

/// One batch of property changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsEvent {
    #[serde(default)]
    pub added: Vec<ObsProperty>,
    /// New values of changed properties.
    #[serde(default)]
    pub changed: Vec<ObsProperty>,
    /// Last values of removed properties.
    #[serde(default)]
    pub removed: Vec<ObsProperty>,
}

impl ObsEvent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// The property a filter decides on.
    #[must_use]
    pub fn deciding_property(&self) -> Option<&ObsProperty> {
        self.added
            .first()
            .or_else(|| self.changed.first())
            .or_else(|| self.removed.first())
    }

    /// Splits the batch into one event per property, preserving the
    /// added/changed/removed order.
    #[must_use]
    pub fn split(self) -> Vec<Self> {
        let mut out = Vec::with_capacity(self.added.len() + self.changed.len() + self.removed.len());
        out.extend(self.added.into_iter().map(|p| Self {
            added: vec![p],
            ..Self::default()
        }));
        out.extend(self.changed.into_iter().map(|p| Self {
            changed: vec![p],
            ..Self::default()
        }));
        out.extend(self.removed.into_iter().map(|p| Self {
            removed: vec![p],
            ..Self::default()
        }));
        out
    }
}

/// Per-subscriber admission predicate.
pub trait ObsEventFilter: Send + Sync {
    fn select(&self, event: &ObsEvent) -> bool;
}

/// Admits every non-empty batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ObsEventFilter for AcceptAll {
    fn select(&self, event: &ObsEvent) -> bool {
        !event.is_empty()
    }
}

/// Filter bound to one agent's capabilities and the shared situation.
#[derive(Debug)]
pub struct EventFilter {
    caps: RwLock<AgentCapabilitySet>,
    state: SharedState,
    validator: SituationalContextValidator,
}

impl EventFilter {
    /// Builds a filter from the agent's description.
    pub fn new(
        agent: &ResourceDescription,
        state: SharedState,
        validator: SituationalContextValidator,
    ) -> HyperResult<Self> {
        let caps = capabilities_of(agent, &state)?;
        debug!(abilities = caps.len(), "event filter created");
        Ok(Self {
            caps: RwLock::new(caps),
            state,
            validator,
        })
    }

    /// Builds a filter over an explicit capability set.
    #[must_use]
    pub fn with_capabilities(
        caps: AgentCapabilitySet,
        state: SharedState,
        validator: SituationalContextValidator,
    ) -> Self {
        Self {
            caps: RwLock::new(caps),
            state,
            validator,
        }
    }

    /// Recomputes the capability set from a refreshed agent description.
    /// The previous set is replaced, not extended.
    pub fn refresh_agent_profile(&self, agent: &ResourceDescription) -> HyperResult<()> {
        let caps = capabilities_of(agent, &self.state)?;
        *self
            .caps
            .write()
            .map_err(|_| HyperError::poisoned("filter capabilities"))? = caps;
        Ok(())
    }

    /// Current capability set.
    pub fn capabilities(&self) -> HyperResult<AgentCapabilitySet> {
        Ok(self
            .caps
            .read()
            .map_err(|_| HyperError::poisoned("filter capabilities"))?
            .clone())
    }

    fn admits(&self, property: &SignifierProperty) -> HyperResult<bool> {
        let complementary = {
            let caps = self
                .caps
                .read()
                .map_err(|_| HyperError::poisoned("filter capabilities"))?;
            complementary_ability_types(&caps, property.recommended_abilities())
        };
        if !complementary {
            debug!(signifier = %property.iri, "signifier not complementary to agent abilities");
            return Ok(false);
        }

        let st = self.state.lock()?;
        Ok(self
            .validator
            .is_situationally_valid(&property.iri, &st.contexts, &st.situation))
    }
}

impl ObsEventFilter for EventFilter {
    fn select(&self, event: &ObsEvent) -> bool {
        match event.deciding_property() {
            None => false,
            Some(ObsProperty::Plain { .. }) => true,
            Some(ObsProperty::Signifier(p)) => self.admits(p).unwrap_or_else(|e| {
                warn!(signifier = %p.iri, error = %e, "filter state unavailable; dropping event");
                false
            }),
        }
    }
}

fn capabilities_of(agent: &ResourceDescription, state: &SharedState) -> HyperResult<AgentCapabilitySet> {
    let registry = state.namespaces()?;
    Ok(AgentCapabilitySet::from_abilities(agent.agent_abilities(), &registry))
}
