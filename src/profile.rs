//! Resource descriptions and the collaborator that supplies them.
//!
//! Two description kinds exist: hMAS resource profiles, which carry signifiers
//! directly, and WoT Thing Descriptions, whose action affordances are
//! projected to signifiers without recommendations. Both sit behind the same
//! read-only view.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, HyperError, HyperResult};
use crate::graph::Graph;
use crate::signifier::{Ability, ActionSpecification, Form, Signifier};

/// Which kind of description a resource was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    ResourceProfile,
    ThingDescription,
}

/// What the described resource is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Artifact,
    Agent,
}

/// hMAS resource profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_iri: Option<String>,
    #[serde(default)]
    pub resource_kind: ResourceKind,
    #[serde(default)]
    pub signifiers: Vec<Signifier>,
    /// Abilities declared by a capable agent; empty for artifacts.
    #[serde(default)]
    pub abilities: Vec<Ability>,
}

/// WoT action affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAffordance {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    #[serde(default)]
    pub semantic_types: BTreeSet<String>,
    #[serde(default)]
    pub forms: Vec<Form>,
}

/// WoT Thing Description, reduced to what signifier exposure needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingDescription {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iri: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionAffordance>,
}

impl ActionAffordance {
    fn to_signifier(&self) -> Signifier {
        Signifier {
            iri: self.iri.clone(),
            action: ActionSpecification {
                required_semantic_types: self.semantic_types.clone(),
                forms: self.forms.clone(),
            },
            recommended_abilities: Vec::new(),
            recommended_contexts: Vec::new(),
        }
    }
}

/// A parsed description of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDescription {
    ResourceProfile(ResourceProfile),
    ThingDescription(ThingDescription),
}

impl ResourceDescription {
    #[must_use]
    pub const fn kind(&self) -> ProfileKind {
        match self {
            Self::ResourceProfile(_) => ProfileKind::ResourceProfile,
            Self::ThingDescription(_) => ProfileKind::ThingDescription,
        }
    }

    /// Signifiers that carry an IRI. Others are skipped without error.
    #[must_use]
    pub fn exposed_signifiers(&self) -> Vec<Signifier> {
        match self {
            Self::ResourceProfile(p) => p
                .signifiers
                .iter()
                .filter(|s| s.iri.is_some())
                .cloned()
                .collect(),
            Self::ThingDescription(td) => td
                .actions
                .iter()
                .filter(|a| a.iri.is_some())
                .map(ActionAffordance::to_signifier)
                .collect(),
        }
    }

    /// First exposed signifier whose required action types contain
    /// `action_type` exactly. No subtype inference.
    #[must_use]
    pub fn first_signifier_for_action_type(&self, action_type: &str) -> Option<Signifier> {
        self.exposed_signifiers()
            .into_iter()
            .find(|s| s.has_action_type(action_type))
    }

    /// Abilities declared by the described agent.
    #[must_use]
    pub fn agent_abilities(&self) -> &[Ability] {
        match self {
            Self::ResourceProfile(p) => &p.abilities,
            Self::ThingDescription(_) => &[],
        }
    }

    #[must_use]
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::ResourceProfile(p) if p.resource_kind == ResourceKind::Agent)
    }
}

/// Collaborator that fetches and parses descriptions.
///
/// The core never parses raw RDF itself; implementations wrap whatever
/// reader the deployment uses.
pub trait ProfileSource: Send + Sync {
    /// Dereferences `url` into a description.
    fn fetch(&self, url: &str) -> HyperResult<ResourceDescription>;

    /// Parses a pushed payload as a description.
    fn parse_description(&self, payload: &str, content_type: &str) -> HyperResult<ResourceDescription>;

    /// Parses a pushed payload as a plain graph.
    fn parse_graph(&self, payload: &str, content_type: &str) -> HyperResult<Graph>;
}

/// Profile source backed by the serde JSON form of descriptions.
///
/// Documents served by `fetch` are preloaded by URL.
#[derive(Debug, Default)]
pub struct JsonProfileSource {
    documents: RwLock<HashMap<String, ResourceDescription>>,
}

impl JsonProfileSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `description` available under `url`, replacing any previous one.
    pub fn insert(&self, url: impl Into<String>, description: ResourceDescription) -> HyperResult<()> {
        self.documents
            .write()
            .map_err(|_| HyperError::poisoned("profile documents"))?
            .insert(url.into(), description);
        Ok(())
    }
}

impl ProfileSource for JsonProfileSource {
    fn fetch(&self, url: &str) -> HyperResult<ResourceDescription> {
        let docs = self
            .documents
            .read()
            .map_err(|_| HyperError::poisoned("profile documents"))?;
        docs.get(url).cloned().ok_or_else(|| {
            HyperError::Execution(ExecutionError::ProfileUnavailable {
                url: url.to_string(),
                reason: "no document registered".to_string(),
            })
        })
    }

    fn parse_description(&self, payload: &str, _content_type: &str) -> HyperResult<ResourceDescription> {
        serde_json::from_str(payload).map_err(|e| {
            HyperError::Execution(ExecutionError::ProfileUnavailable {
                url: "<payload>".to_string(),
                reason: e.to_string(),
            })
        })
    }

    fn parse_graph(&self, payload: &str, _content_type: &str) -> HyperResult<Graph> {
        serde_json::from_str(payload).map_err(|e| HyperError::internal(format!("invalid graph payload: {e}")))
    }
}
