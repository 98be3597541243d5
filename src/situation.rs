//! Situation graph and situational context validation.
//!
//! The situation is the accumulated belief graph pushed by notification
//! topics. Each topic contributes one graph; the last contribution per topic
//! wins and the merged graph is rebuilt on every update.
//!
//! Recommended contexts are checked by handing the merged situation and the
//! context shape graphs to a constraint engine. The check fails closed: an
//! engine error filters the signifier out instead of reaching the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::graph::{Graph, Term, Triple};
use crate::signifier::{shapes_in, Context, Signifier};

/// Accumulated situation, keyed by originating topic.
#[derive(Debug, Clone, Default)]
pub struct Situation {
    contributions: BTreeMap<String, Graph>,
    merged: Graph,
}

impl Situation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contribution of `topic` and rebuilds the merged graph.
    pub fn replace(&mut self, topic: impl Into<String>, graph: Graph) {
        self.contributions.insert(topic.into(), graph);
        self.rebuild();
    }

    /// Drops the contribution of `topic`, if any.
    pub fn remove(&mut self, topic: &str) {
        if self.contributions.remove(topic).is_some() {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.merged.clear();
        for g in self.contributions.values() {
            self.merged.extend(g);
        }
    }

    /// The merged working graph.
    #[must_use]
    pub const fn merged(&self) -> &Graph {
        &self.merged
    }

    #[must_use]
    pub fn contribution(&self, topic: &str) -> Option<&Graph> {
        self.contributions.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.contributions.keys().map(String::as_str)
    }
}

/// Recommended contexts recorded per signifier IRI.
#[derive(Debug, Clone, Default)]
pub struct RecommendedContexts {
    by_signifier: HashMap<String, Vec<Context>>,
}

impl RecommendedContexts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the contexts of every signifier that has an IRI,
    /// replacing earlier records for the same IRI.
    pub fn record<'a, I>(&mut self, signifiers: I)
    where
        I: IntoIterator<Item = &'a Signifier>,
    {
        for s in signifiers {
            if let Some(iri) = &s.iri {
                self.by_signifier.insert(iri.clone(), s.recommended_contexts.clone());
            }
        }
    }

    /// Contexts for `signifier_iri`; empty when nothing is recorded.
    #[must_use]
    pub fn get(&self, signifier_iri: &str) -> &[Context] {
        self.by_signifier.get(signifier_iri).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_signifier.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_signifier.is_empty()
    }
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub conforms: bool,
    /// Human-readable violation descriptions.
    pub violations: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub const fn conforming() -> Self {
        Self {
            conforms: true,
            violations: Vec::new(),
        }
    }
}

/// External constraint validation engine.
pub trait ShapeValidator: Send + Sync {
    /// Validates `data` against every shape graph.
    ///
    /// # Errors
    /// `ValidationFailure` when a shape graph cannot be interpreted.
    fn validate(&self, data: &Graph, shapes: &[&Graph]) -> Result<ValidationReport, ExecutionError>;
}

/// Bundled engine covering `sh:path` + `sh:hasValue` (+ `sh:targetNode`) shapes.
///
/// A shape conforms when the data graph holds a statement with the shape's
/// path and required value, on the target node when one is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct HasValueValidator;

impl ShapeValidator for HasValueValidator {
    fn validate(&self, data: &Graph, shapes: &[&Graph]) -> Result<ValidationReport, ExecutionError> {
        let mut report = ValidationReport::conforming();
        for graph in shapes {
            for shape in shapes_in(graph) {
                let Some(value) = &shape.required_value else {
                    return Err(ExecutionError::ValidationFailure {
                        reason: format!("shape {} has sh:path but no sh:hasValue", shape.node),
                    });
                };
                let holds = match &shape.target_resource {
                    Some(target) => data.contains(&Triple::new(target.clone(), shape.target_path.clone(), value.clone())),
                    None => data
                        .filter(None, Some(shape.target_path.as_str()), Some(value))
                        .next()
                        .is_some(),
                };
                if !holds {
                    report.conforms = false;
                    report.violations.push(format!(
                        "{}: no value {} on path <{}>",
                        shape.node,
                        value,
                        shape.target_path
                    ));
                }
            }
        }
        Ok(report)
    }
}

/// Checks recommended contexts of signifiers against the situation.
#[derive(Clone)]
pub struct SituationalContextValidator {
    engine: Arc<dyn ShapeValidator>,
}

impl std::fmt::Debug for SituationalContextValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SituationalContextValidator").finish_non_exhaustive()
    }
}

impl Default for SituationalContextValidator {
    fn default() -> Self {
        Self::new(Arc::new(HasValueValidator))
    }
}

impl SituationalContextValidator {
    #[must_use]
    pub fn new(engine: Arc<dyn ShapeValidator>) -> Self {
        Self { engine }
    }

    /// True when the signifier has no recorded contexts, or when the merged
    /// situation conforms to all of them. Engine errors count as
    /// non-conformant.
    ///
    /// Callers must hold the state lock for the whole call so the situation
    /// cannot change mid-validation.
    #[must_use]
    pub fn is_situationally_valid(
        &self,
        signifier_iri: &str,
        contexts: &RecommendedContexts,
        situation: &Situation,
    ) -> bool {
        let recorded = contexts.get(signifier_iri);
        if recorded.is_empty() {
            return true;
        }

        let shapes: Vec<&Graph> = recorded.iter().map(|c| &c.shape_graph).collect();
        match self.engine.validate(situation.merged(), &shapes) {
            Ok(report) if report.conforms => true,
            Ok(report) => {
                debug!(
                    signifier = %signifier_iri,
                    violations = ?report.violations,
                    "situation does not conform to recommended context"
                );
                false
            }
            Err(e) => {
                warn!(signifier = %signifier_iri, error = %e, "context validation failed; filtering signifier out");
                false
            }
        }
    }
}

/// Convenience for building a belief statement `(subject, hasBelief, literal)`.
#[must_use]
pub fn belief(subject: Term, content: impl Into<String>) -> Triple {
    Triple::new(subject, crate::vocab::HAS_BELIEF, Term::literal(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab;

    fn context(value: &str) -> Context {
        Context::new(
            vec![
                Triple::new(Term::blank("shape"), vocab::rdf::TYPE, Term::iri(vocab::shacl::NODE_SHAPE)),
                Triple::new(Term::blank("shape"), vocab::shacl::PATH, Term::iri(vocab::HAS_BELIEF)),
                Triple::new(Term::blank("shape"), vocab::shacl::HAS_VALUE, Term::literal(value)),
            ]
            .into(),
        )
    }

    fn contexts_for(iri: &str, ctx: Vec<Context>) -> RecommendedContexts {
        let mut sig = Signifier::new(iri, ["https://example.org/Act"]);
        sig.recommended_contexts = ctx;
        let mut rc = RecommendedContexts::new();
        rc.record([&sig]);
        rc
    }

    fn situation_with(value: &str) -> Situation {
        let mut s = Situation::new();
        s.replace("https://example.org/topic", vec![belief(Term::iri("https://example.org/agent"), value)].into());
        s
    }

    #[test]
    fn last_write_wins_per_topic() {
        let mut s = Situation::new();
        let subj = Term::iri("https://example.org/agent");
        s.replace("t1", vec![belief(subj.clone(), "a")].into());
        s.replace("t2", vec![belief(subj.clone(), "b")].into());
        assert_eq!(s.merged().len(), 2);

        s.replace("t1", vec![belief(subj.clone(), "c")].into());
        assert_eq!(s.merged().len(), 2);
        assert!(!s.merged().contains(&belief(subj.clone(), "a")));
        assert!(s.merged().contains(&belief(subj.clone(), "c")));

        s.remove("t2");
        assert_eq!(s.merged().len(), 1);
        assert_eq!(s.topics().collect::<Vec<_>>(), vec!["t1"]);
    }

    #[test]
    fn no_contexts_is_always_valid() {
        let v = SituationalContextValidator::default();
        let rc = contexts_for("https://example.org/sig", Vec::new());
        assert!(v.is_situationally_valid("https://example.org/sig", &rc, &Situation::new()));
        assert!(v.is_situationally_valid("https://example.org/unknown", &rc, &situation_with("x")));
    }

    #[test]
    fn conforming_situation_is_valid() {
        let v = SituationalContextValidator::default();
        let rc = contexts_for("https://example.org/sig", vec![context("lampOn")]);
        assert!(v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOn")));
        assert!(!v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOff")));
    }

    #[test]
    fn all_contexts_must_conform() {
        let v = SituationalContextValidator::default();
        let rc = contexts_for("https://example.org/sig", vec![context("lampOn"), context("roomDark")]);
        assert!(!v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOn")));

        let mut s = situation_with("lampOn");
        s.replace("other", vec![belief(Term::iri("https://example.org/agent"), "roomDark")].into());
        assert!(v.is_situationally_valid("https://example.org/sig", &rc, &s));
    }

    #[test]
    fn target_node_restricts_subject() {
        let mut ctx = context("lampOn");
        ctx.shape_graph.insert(Triple::new(
            Term::blank("shape"),
            vocab::shacl::TARGET_NODE,
            Term::iri("https://example.org/other-agent"),
        ));
        let v = SituationalContextValidator::default();
        let rc = contexts_for("https://example.org/sig", vec![ctx]);
        assert!(!v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOn")));
    }

    #[test]
    fn malformed_shape_fails_closed() {
        let malformed = Context::new(
            vec![Triple::new(Term::blank("shape"), vocab::shacl::PATH, Term::iri(vocab::HAS_BELIEF))].into(),
        );
        let v = SituationalContextValidator::default();
        let rc = contexts_for("https://example.org/sig", vec![malformed]);
        assert!(!v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOn")));
    }

    struct Exploding;

    impl ShapeValidator for Exploding {
        fn validate(&self, _data: &Graph, _shapes: &[&Graph]) -> Result<ValidationReport, ExecutionError> {
            Err(ExecutionError::ValidationFailure {
                reason: "engine crashed".to_string(),
            })
        }
    }

    #[test]
    fn engine_error_is_non_conformant() {
        let v = SituationalContextValidator::new(Arc::new(Exploding));
        let rc = contexts_for("https://example.org/sig", vec![context("lampOn")]);
        assert!(!v.is_situationally_valid("https://example.org/sig", &rc, &situation_with("lampOn")));
    }
}
