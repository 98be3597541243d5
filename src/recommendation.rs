//! Recommendation contexts per agent.
//!
//! An agent subscribing to a resource names the resource profile it wants
//! recommendations for and its own profile. The registry records the pair,
//! loads the recommended contexts of the resource's signifiers and hands
//! back an [`EventFilter`] bound to the agent's abilities.
//!
//! The registry is also a notification consumer: pushed descriptions update
//! the recorded contexts, and any other pushed graph becomes that topic's
//! contribution to the situation.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExecutionError, HyperError, HyperResult};
use crate::filter::EventFilter;
use crate::profile::{ProfileSource, ResourceDescription};
use crate::router::{Notification, NotificationConsumer};
use crate::situation::SituationalContextValidator;
use crate::state::SharedState;
use crate::vocab;

/// One `(resource profile, agent profile)` subscription of an agent.
///
/// Two contexts are equal when they target the same resource profile.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub resource_profile_url: String,
    pub agent_profile_url: String,
}

impl PartialEq for RecommendationContext {
    fn eq(&self, other: &Self) -> bool {
        self.resource_profile_url == other.resource_profile_url
    }
}

impl Hash for RecommendationContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_profile_url.hash(state);
    }
}

/// Records recommendation contexts and builds agent filters.
pub struct RecommendationRegistry {
    state: SharedState,
    source: Arc<dyn ProfileSource>,
    validator: SituationalContextValidator,
}

impl std::fmt::Debug for RecommendationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationRegistry")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RecommendationRegistry {
    #[must_use]
    pub fn new(state: SharedState, source: Arc<dyn ProfileSource>, validator: SituationalContextValidator) -> Self {
        Self {
            state,
            source,
            validator,
        }
    }

    /// Records that `agent` wants recommendations for `resource_profile_url`
    /// and returns its filter.
    ///
    /// A previous context of the same agent for the same resource is
    /// replaced.
    ///
    /// # Errors
    /// `ProfileUnavailable` when either profile cannot be fetched. Nothing
    /// is recorded in that case.
    pub fn add_recommendation_context(
        &self,
        agent: &str,
        resource_profile_url: &str,
        agent_profile_url: &str,
    ) -> HyperResult<EventFilter> {
        let resource = fetch(self.source.as_ref(), resource_profile_url, "resource")?;
        let agent_profile = fetch(self.source.as_ref(), agent_profile_url, "agent")?;
        let filter = EventFilter::new(&agent_profile, self.state.clone(), self.validator.clone())?;

        let context = RecommendationContext {
            resource_profile_url: resource_profile_url.to_string(),
            agent_profile_url: agent_profile_url.to_string(),
        };
        {
            let mut st = self.state.lock()?;
            st.contexts.record(&resource.exposed_signifiers());
            let contexts = st.recommendations.entry(agent.to_string()).or_default();
            contexts.retain(|c| c != &context);
            contexts.push(context);
        }
        info!(agent, resource = resource_profile_url, "recommendation context added");
        Ok(filter)
    }

    /// Recommendation contexts recorded for `agent`.
    pub fn contexts_for(&self, agent: &str) -> HyperResult<Vec<RecommendationContext>> {
        Ok(self
            .state
            .lock()?
            .recommendations
            .get(agent)
            .cloned()
            .unwrap_or_default())
    }
}

impl NotificationConsumer for RecommendationRegistry {
    fn on_notification(&self, n: &Notification) -> HyperResult<()> {
        if media_type(&n.content_type) != vocab::content_type::TURTLE {
            return Ok(());
        }
        absorb_document(&self.state, self.source.as_ref(), n)?;
        Ok(())
    }
}

/// Media type without parameters.
pub(crate) fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// Records the recommended contexts of every exposed signifier.
pub(crate) fn record_contexts(state: &SharedState, description: &ResourceDescription) -> HyperResult<()> {
    let signifiers = description.exposed_signifiers();
    state.lock()?.contexts.record(&signifiers);
    Ok(())
}

/// Takes in a pushed document.
///
/// A description has its recommended contexts recorded and is returned.
/// Anything else is parsed as a graph and replaces the topic's situation
/// contribution.
pub(crate) fn absorb_document(
    state: &SharedState,
    source: &dyn ProfileSource,
    n: &Notification,
) -> HyperResult<Option<ResourceDescription>> {
    match source.parse_description(&n.payload, &n.content_type) {
        Ok(description) => {
            record_contexts(state, &description)?;
            Ok(Some(description))
        }
        Err(e) => {
            debug!(topic = %n.topic, error = %e, "payload is not a description; treating it as situation");
            let graph = source.parse_graph(&n.payload, &n.content_type)?;
            state.lock()?.situation.replace(n.topic.clone(), graph);
            Ok(None)
        }
    }
}

fn fetch(source: &dyn ProfileSource, url: &str, what: &str) -> HyperResult<ResourceDescription> {
    source.fetch(url).map_err(|e| match e {
        HyperError::Execution(ExecutionError::ProfileUnavailable { .. }) => e,
        other => HyperError::Execution(ExecutionError::ProfileUnavailable {
            url: url.to_string(),
            reason: format!("unable to retrieve {what} profile: {other}"),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Guidance, ObsEvent, ObsEventFilter, ObsProperty, SignifierProperty};
    use crate::graph::{Graph, Term, Triple};
    use crate::profile::{JsonProfileSource, ResourceKind, ResourceProfile};
    use crate::signifier::{Ability, Context, Signifier};
    use crate::situation::belief;

    const LAMP: &str = "https://example.org/lamp";
    const ALICE: &str = "https://example.org/agents/alice";
    const SIG: &str = "https://example.org/sig/toggle";

    fn lamp_on() -> Context {
        Context::new(
            vec![
                Triple::new(Term::blank("s"), vocab::shacl::PATH, Term::iri(vocab::HAS_BELIEF)),
                Triple::new(Term::blank("s"), vocab::shacl::HAS_VALUE, Term::literal("lampOn")),
            ]
            .into(),
        )
    }

    fn lamp_profile() -> ResourceDescription {
        ResourceDescription::ResourceProfile(ResourceProfile {
            resource_iri: Some(LAMP.to_string()),
            resource_kind: ResourceKind::Artifact,
            signifiers: vec![Signifier::new(SIG, ["https://example.org/ToggleCommand"]).with_context(lamp_on())],
            abilities: Vec::new(),
        })
    }

    fn alice() -> ResourceDescription {
        ResourceDescription::ResourceProfile(ResourceProfile {
            resource_iri: Some(ALICE.to_string()),
            resource_kind: ResourceKind::Agent,
            signifiers: Vec::new(),
            abilities: vec![Ability::new(["https://example.org/Pyromancy"])],
        })
    }

    fn registry() -> (RecommendationRegistry, SharedState) {
        let source = JsonProfileSource::new();
        source.insert(LAMP, lamp_profile()).unwrap();
        source.insert(ALICE, alice()).unwrap();
        let state = SharedState::new();
        state.register_namespace("ex", "https://example.org/").unwrap();
        (
            RecommendationRegistry::new(state.clone(), Arc::new(source), SituationalContextValidator::default()),
            state,
        )
    }

    fn toggle_event() -> ObsEvent {
        ObsEvent {
            added: vec![ObsProperty::Signifier(SignifierProperty {
                iri: SIG.to_string(),
                action_types: vec!["ex:ToggleCommand".to_string()],
                guidance: Some(Guidance::default()),
            })],
            ..ObsEvent::default()
        }
    }

    #[test]
    fn equality_is_by_resource_url() {
        let a = RecommendationContext {
            resource_profile_url: LAMP.to_string(),
            agent_profile_url: "a".to_string(),
        };
        let b = RecommendationContext {
            resource_profile_url: LAMP.to_string(),
            agent_profile_url: "b".to_string(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn add_records_contexts_and_returns_filter() {
        let (reg, state) = registry();
        let filter = reg.add_recommendation_context("alice", LAMP, ALICE).unwrap();
        assert!(filter.capabilities().unwrap().contains("ex:Pyromancy"));
        assert_eq!(state.lock().unwrap().contexts.get(SIG).len(), 1);

        // The lamp is off in the (empty) situation.
        assert!(!filter.select(&toggle_event()));
        state
            .lock()
            .unwrap()
            .situation
            .replace("room", vec![belief(Term::iri(ALICE), "lampOn")].into());
        assert!(filter.select(&toggle_event()));
    }

    #[test]
    fn resubscribing_replaces_the_context() {
        let (reg, _state) = registry();
        reg.add_recommendation_context("alice", LAMP, ALICE).unwrap();
        reg.add_recommendation_context("alice", LAMP, ALICE).unwrap();
        assert_eq!(reg.contexts_for("alice").unwrap().len(), 1);
        assert!(reg.contexts_for("bob").unwrap().is_empty());
    }

    #[test]
    fn missing_profile_is_unavailable() {
        let (reg, _state) = registry();
        let err = reg
            .add_recommendation_context("alice", "https://example.org/missing", ALICE)
            .unwrap_err();
        assert!(matches!(
            err,
            HyperError::Execution(ExecutionError::ProfileUnavailable { .. })
        ));
        assert!(err.is_retryable());
        assert!(reg.contexts_for("alice").unwrap().is_empty());
    }

    #[test]
    fn missing_agent_profile_records_nothing() {
        let (reg, state) = registry();
        let err = reg
            .add_recommendation_context("alice", LAMP, "https://example.org/agents/nobody")
            .unwrap_err();
        assert!(matches!(
            err,
            HyperError::Execution(ExecutionError::ProfileUnavailable { .. })
        ));
        assert!(reg.contexts_for("alice").unwrap().is_empty());
        assert!(state.lock().unwrap().contexts.is_empty());
    }

    #[test]
    fn pushed_graph_becomes_situation() {
        let (reg, state) = registry();
        let graph: Graph = vec![belief(Term::iri(ALICE), "lampOn")].into();
        let n = Notification::new("room", serde_json::to_string(&graph).unwrap(), "text/turtle");
        reg.on_notification(&n).unwrap();
        assert_eq!(state.lock().unwrap().situation.merged().len(), 1);
    }

    #[test]
    fn pushed_profile_records_contexts() {
        let (reg, state) = registry();
        let n = Notification::new(LAMP, serde_json::to_string(&lamp_profile()).unwrap(), "text/turtle; charset=utf-8");
        reg.on_notification(&n).unwrap();
        assert_eq!(state.lock().unwrap().contexts.get(SIG).len(), 1);
        assert!(state.lock().unwrap().situation.merged().is_empty());
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("text/turtle; charset=utf-8"), "text/turtle");
        assert_eq!(media_type("application/json"), "application/json");
    }
}
