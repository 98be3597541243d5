//! Signifier value objects.
//!
//! A signifier describes one interaction a resource offers: the action it
//! stands for, the abilities an actor is recommended to have, and the
//! situations in which invoking it makes sense. Signifiers are immutable
//! once read from a description and are replaced wholesale on refresh.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, Term};
use crate::vocab;

/// A hypermedia control attached to an action specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Target IRI of the request.
    pub target: String,
    /// Protocol method, e.g. `POST`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Content type of the request payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl Form {
    #[must_use]
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            content_type: None,
        }
    }
}

/// What has to be done to perform the signified action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpecification {
    /// Semantic types the action is required to carry.
    #[serde(default)]
    pub required_semantic_types: BTreeSet<String>,
    /// Forms, in document order.
    #[serde(default)]
    pub forms: Vec<Form>,
}

impl ActionSpecification {
    #[must_use]
    pub fn first_form(&self) -> Option<&Form> {
        self.forms.first()
    }
}

/// A capability an actor is recommended to possess.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "AbilityRepr", into = "AbilityRepr")]
pub struct Ability {
    semantic_types: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
struct AbilityRepr {
    semantic_types: BTreeSet<String>,
}

impl From<AbilityRepr> for Ability {
    fn from(repr: AbilityRepr) -> Self {
        Self::new(repr.semantic_types)
    }
}

impl From<Ability> for AbilityRepr {
    fn from(ability: Ability) -> Self {
        Self {
            semantic_types: ability.semantic_types,
        }
    }
}

impl Ability {
    /// Creates an ability; the generic `Ability` marker type is dropped.
    #[must_use]
    pub fn new<I, S>(semantic_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let semantic_types = semantic_types
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| t != vocab::interaction::ABILITY)
            .collect();
        Self { semantic_types }
    }

    /// Semantic types, never including the `Ability` marker.
    #[must_use]
    pub const fn semantic_types(&self) -> &BTreeSet<String> {
        &self.semantic_types
    }
}

/// One constraint extracted from a context shape graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// The shape node.
    pub node: Term,
    /// `sh:path`.
    pub target_path: String,
    /// `sh:hasValue`; `None` marks a malformed shape.
    pub required_value: Option<Term>,
    /// `sh:targetNode`.
    pub target_resource: Option<Term>,
}

/// Extracts one shape per `sh:path` statement of `graph`.
#[must_use]
pub fn shapes_in(graph: &Graph) -> Vec<Shape> {
    graph
        .filter(None, Some(vocab::shacl::PATH), None)
        .filter_map(|t| {
            let Term::Iri { value: path } = &t.object else {
                return None;
            };
            Some(Shape {
                node: t.subject.clone(),
                target_path: path.clone(),
                required_value: graph.objects(&t.subject, vocab::shacl::HAS_VALUE).next().cloned(),
                target_resource: graph.objects(&t.subject, vocab::shacl::TARGET_NODE).next().cloned(),
            })
        })
        .collect()
}

/// A situational precondition expressed as a shape graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Shape graph handed to the constraint engine.
    pub shape_graph: Graph,
}

impl Context {
    #[must_use]
    pub fn new(shape_graph: Graph) -> Self {
        Self { shape_graph }
    }

    /// Extracts one shape per `sh:path` statement.
    #[must_use]
    pub fn shapes(&self) -> Vec<Shape> {
        shapes_in(&self.shape_graph)
    }

    /// `sh:hasValue` contents of shapes constraining the belief path.
    #[must_use]
    pub fn belief_contents(&self) -> Vec<String> {
        let belief = Term::iri(vocab::HAS_BELIEF);
        self.shape_graph
            .subjects(vocab::shacl::PATH, Some(&belief))
            .flat_map(|node| self.shape_graph.objects(node, vocab::shacl::HAS_VALUE))
            .map(|v| v.as_str().to_string())
            .collect()
    }
}

/// An exposed interaction possibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signifier {
    /// Identity of the signifier; signifiers without one are never exposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    /// The signified action.
    #[serde(default)]
    pub action: ActionSpecification,
    #[serde(default)]
    pub recommended_abilities: Vec<Ability>,
    #[serde(default)]
    pub recommended_contexts: Vec<Context>,
}

impl Signifier {
    /// Starts a signifier for the given IRI and action types.
    #[must_use]
    pub fn new<I, S>(iri: impl Into<String>, action_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            iri: Some(iri.into()),
            action: ActionSpecification {
                required_semantic_types: action_types.into_iter().map(Into::into).collect(),
                forms: Vec::new(),
            },
            recommended_abilities: Vec::new(),
            recommended_contexts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_form(mut self, form: Form) -> Self {
        self.action.forms.push(form);
        self
    }

    #[must_use]
    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.recommended_abilities.push(ability);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.recommended_contexts.push(context);
        self
    }

    /// Required action types.
    #[must_use]
    pub const fn action_types(&self) -> &BTreeSet<String> {
        &self.action.required_semantic_types
    }

    /// Exact-match check on the required action types.
    #[must_use]
    pub fn has_action_type(&self, action_type: &str) -> bool {
        self.action.required_semantic_types.contains(action_type)
    }

    /// All recommended ability types, flattened across bundles.
    pub fn recommended_ability_types(&self) -> impl Iterator<Item = &str> {
        self.recommended_abilities
            .iter()
            .flat_map(|a| a.semantic_types().iter().map(String::as_str))
    }
}
