//! Signifier exposure for one resource.
//!
//! [`SignifierExposure`] holds the current description of a resource and the
//! observable properties derived from it: one `signifier` property per
//! exposed signifier plus plain properties such as `exposureState` or
//! `websub`. Changes are published to subscribers one property at a time,
//! each through that subscriber's own filter.
//!
//! Lock order: the exposure lock is always taken before the state lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, HyperError, HyperResult, ValidationError};
use crate::filter::{Guidance, ObsEvent, ObsEventFilter, ObsProperty, SignifierProperty};
use crate::namespace::NamespaceRegistry;
use crate::profile::{ProfileSource, ResourceDescription};
use crate::recommendation::{absorb_document, media_type};
use crate::router::{Notification, NotificationConsumer};
use crate::signifier::{Context, Signifier};
use crate::state::SharedState;
use crate::vocab;
use crate::websub::WebSubLinks;

/// Header carrying the invoking agent's local name.
pub const AGENT_LOCAL_NAME_HEADER: &str = "X-Agent-LocalName";

/// Exposure settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureOptions {
    /// Carry recommended abilities and contexts on signifier properties.
    pub interaction_guidance: bool,
    /// Log invoked actions instead of executing them.
    pub dry_run: bool,
    /// Per-subscriber stream capacity.
    pub stream_capacity: usize,
}

impl Default for ExposureOptions {
    fn default() -> Self {
        Self {
            interaction_guidance: false,
            dry_run: false,
            stream_capacity: 256,
        }
    }
}

/// A bound action ready to be issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub signifier_iri: String,
    pub target: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// WebID of the operating agent, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Collaborator that issues bound actions.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, request: &ActionRequest) -> HyperResult<()>;
}

/// Receiving end of a subscription to an exposure.
#[derive(Debug)]
pub struct ExposureStream {
    rx: Receiver<ObsEvent>,
    dropped: Arc<AtomicU64>,
}

impl ExposureStream {
    pub fn recv_timeout(&self, timeout: Duration) -> HyperResult<ObsEvent> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => HyperError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => HyperError::Execution(ExecutionError::Disconnected {
                path: "exposure_stream".to_string(),
            }),
        })
    }

    #[must_use]
    pub fn try_recv(&self) -> Option<ObsEvent> {
        self.rx.try_recv().ok()
    }

    /// Events dropped because the stream was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Subscriber {
    filter: Arc<dyn ObsEventFilter>,
    tx: Sender<ObsEvent>,
    dropped: Arc<AtomicU64>,
}

struct ExposureInner {
    description: ResourceDescription,
    signifiers: Vec<SignifierProperty>,
    plain: Vec<(String, Vec<String>)>,
    subscribers: Vec<Subscriber>,
    operator_web_id: Option<String>,
}

impl ExposureInner {
    fn set_plain(&mut self, name: &str, values: Vec<String>) -> ObsEvent {
        let property = ObsProperty::plain(name, values.clone());
        if let Some(slot) = self.plain.iter_mut().find(|(n, _)| n == name) {
            if slot.1 == values {
                return ObsEvent::default();
            }
            slot.1 = values;
            return ObsEvent {
                changed: vec![property],
                ..ObsEvent::default()
            };
        }
        self.plain.push((name.to_string(), values));
        ObsEvent {
            added: vec![property],
            ..ObsEvent::default()
        }
    }

    fn publish(&mut self, event: ObsEvent) {
        if event.is_empty() {
            return;
        }
        for single in event.split() {
            self.subscribers.retain(|s| {
                if !s.filter.select(&single) {
                    return true;
                }
                match s.tx.try_send(single.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        s.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("exposure stream full; dropping event");
                        true
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                }
            });
        }
    }
}

/// Observable signifier state of one resource.
pub struct SignifierExposure {
    resource_url: String,
    state: SharedState,
    source: Arc<dyn ProfileSource>,
    options: ExposureOptions,
    inner: Mutex<ExposureInner>,
}

impl std::fmt::Debug for SignifierExposure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignifierExposure")
            .field("resource_url", &self.resource_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SignifierExposure {
    /// Fetches the description at `resource_url` and exposes its signifiers.
    ///
    /// # Errors
    /// `ProfileUnavailable` when the description cannot be fetched.
    pub fn open(
        resource_url: &str,
        state: SharedState,
        source: Arc<dyn ProfileSource>,
        options: ExposureOptions,
    ) -> HyperResult<Self> {
        let description = source.fetch(resource_url)?;
        let exposure = Self::from_description(resource_url, description, state, source, options);
        exposure.expose()?;
        Ok(exposure)
    }

    /// Wraps an already loaded description. Nothing is exposed until
    /// [`expose`](Self::expose) runs.
    #[must_use]
    pub fn from_description(
        resource_url: &str,
        description: ResourceDescription,
        state: SharedState,
        source: Arc<dyn ProfileSource>,
        options: ExposureOptions,
    ) -> Self {
        Self {
            resource_url: resource_url.to_string(),
            state,
            source,
            options,
            inner: Mutex::new(ExposureInner {
                description,
                signifiers: Vec::new(),
                plain: Vec::new(),
                subscribers: Vec::new(),
                operator_web_id: None,
            }),
        }
    }

    fn lock(&self) -> HyperResult<MutexGuard<'_, ExposureInner>> {
        self.inner.lock().map_err(|_| HyperError::poisoned("signifier exposure"))
    }

    #[must_use]
    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    /// Recomputes the signifier properties and publishes the difference.
    ///
    /// Returns the signifier changes against the previous exposure.
    pub fn expose(&self) -> HyperResult<ObsEvent> {
        let mut inner = self.lock()?;
        self.expose_locked(&mut inner)
    }

    fn expose_locked(&self, inner: &mut ExposureInner) -> HyperResult<ObsEvent> {
        let registry = self.state.namespaces()?;

        let started = inner.set_plain(vocab::property::EXPOSURE_STATE, vec!["inProgress".to_string()]);
        inner.publish(started);

        let next: Vec<SignifierProperty> = inner
            .description
            .exposed_signifiers()
            .iter()
            .filter_map(|s| signifier_property(s, &registry, self.options.interaction_guidance))
            .collect();
        let diff = diff_signifiers(&inner.signifiers, &next);
        inner.signifiers = next;
        inner.publish(diff.clone());

        let done = inner.set_plain(vocab::property::EXPOSURE_STATE, vec!["done".to_string()]);
        inner.publish(done);

        debug!(
            resource = %self.resource_url,
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "signifiers exposed"
        );
        Ok(diff)
    }

    /// Replaces the description wholesale and re-exposes.
    pub fn refresh(&self, description: ResourceDescription) -> HyperResult<ObsEvent> {
        let mut inner = self.lock()?;
        inner.description = description;
        self.expose_locked(&mut inner)
    }

    /// Registers a namespace and re-exposes under the new compact forms.
    ///
    /// # Errors
    /// `InvalidIdentifier` when `identifier` is not absolute.
    pub fn set_namespace(&self, prefix: &str, identifier: &str) -> HyperResult<ObsEvent> {
        self.state.register_namespace(prefix, identifier)?;
        self.expose()
    }

    /// Sets the WebID stamped on invoked actions.
    pub fn set_operator_web_id(&self, web_id: impl Into<String>) -> HyperResult<()> {
        self.lock()?.operator_web_id = Some(web_id.into());
        Ok(())
    }

    /// Defines or updates a plain observable property.
    pub fn set_property<I, S>(&self, name: &str, values: I) -> HyperResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.lock()?;
        let event = inner.set_plain(name, values.into_iter().map(Into::into).collect());
        inner.publish(event);
        Ok(())
    }

    /// Exposes the resource's WebSub hub and topic as the `websub` property.
    pub fn expose_websub_links(&self, links: &WebSubLinks) -> HyperResult<()> {
        info!(resource = %self.resource_url, hub = %links.hub, topic = %links.topic, "websub links found");
        self.set_property(vocab::property::WEBSUB, [links.hub.as_str(), links.topic.as_str()])
    }

    /// Snapshot of every observable property, signifiers first.
    pub fn properties(&self) -> HyperResult<Vec<ObsProperty>> {
        let inner = self.lock()?;
        Ok(inner
            .signifiers
            .iter()
            .cloned()
            .map(ObsProperty::Signifier)
            .chain(inner.plain.iter().map(|(n, v)| ObsProperty::plain(n.clone(), v.clone())))
            .collect())
    }

    /// Current description.
    pub fn description(&self) -> HyperResult<ResourceDescription> {
        Ok(self.lock()?.description.clone())
    }

    /// Subscribes through `filter`. Only later changes are delivered.
    pub fn subscribe(&self, filter: Arc<dyn ObsEventFilter>) -> HyperResult<ExposureStream> {
        let (tx, rx) = bounded(self.options.stream_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        self.lock()?.subscribers.push(Subscriber {
            filter,
            tx,
            dropped: Arc::clone(&dropped),
        });
        Ok(ExposureStream { rx, dropped })
    }

    /// Resolves `action_tag`, binds the first form of the first matching
    /// signifier and hands the request to `executor`.
    ///
    /// In dry-run mode the request is logged and not executed.
    ///
    /// # Errors
    /// `UnknownSignifier` when no exposed signifier has the action type.
    pub fn invoke_action(
        &self,
        action_tag: &str,
        agent_name: &str,
        executor: &dyn ActionExecutor,
    ) -> HyperResult<ActionRequest> {
        let action_type = self.state.resolve(action_tag)?;
        let (signifier, actor_id) = {
            let inner = self.lock()?;
            (
                inner.description.first_signifier_for_action_type(&action_type),
                inner.operator_web_id.clone(),
            )
        };
        let unknown = || HyperError::Execution(ExecutionError::UnknownSignifier {
            action: action_type.clone(),
        });
        let signifier = signifier.ok_or_else(unknown)?;
        let form = signifier.action.first_form().ok_or_else(|| {
            HyperError::Validation(ValidationError::MissingField {
                field: "form".to_string(),
            })
        })?;

        let mut headers = BTreeMap::new();
        headers.insert(AGENT_LOCAL_NAME_HEADER.to_string(), agent_name.to_string());
        let request = ActionRequest {
            signifier_iri: signifier.iri.clone().unwrap_or_default(),
            target: form.target.clone(),
            method: form.method.clone(),
            content_type: form.content_type.clone(),
            actor_id,
            headers,
        };

        if self.options.dry_run {
            info!(
                action = %action_type,
                method = %request.method,
                target = %request.target,
                actor = ?request.actor_id,
                "dry run; action not executed"
            );
        } else {
            executor.execute(&request)?;
        }
        Ok(request)
    }
}

impl NotificationConsumer for SignifierExposure {
    fn on_notification(&self, n: &Notification) -> HyperResult<()> {
        match media_type(&n.content_type) {
            vocab::content_type::TURTLE => {
                if let Some(description) = absorb_document(&self.state, self.source.as_ref(), n)? {
                    self.refresh(description)?;
                }
                Ok(())
            }
            vocab::content_type::JSON => {
                info!(resource = %self.resource_url, update = %n.payload, "resource state changed");
                let (functor, values) = parse_property_literal(&n.payload)?;
                self.set_property(&functor, values)
            }
            other => {
                debug!(topic = %n.topic, content_type = other, "ignoring notification");
                Ok(())
            }
        }
    }
}

/// Parses a `functor(a,b,...)` property literal.
///
/// # Errors
/// `InvalidPropertyUpdate` when the literal has no parenthesised argument list.
pub fn parse_property_literal(literal: &str) -> HyperResult<(String, Vec<String>)> {
    let invalid = || {
        HyperError::Validation(ValidationError::InvalidPropertyUpdate {
            literal: literal.to_string(),
        })
    };
    let trimmed = literal.trim();
    let (functor, rest) = trimmed.split_once('(').ok_or_else(invalid)?;
    let args = rest.strip_suffix(')').ok_or_else(invalid)?;
    let functor = functor.trim();
    if functor.is_empty() {
        return Err(invalid());
    }
    let values = if args.trim().is_empty() {
        Vec::new()
    } else {
        args.split(',').map(|a| a.trim().to_string()).collect()
    };
    Ok((functor.to_string(), values))
}

fn signifier_property(
    signifier: &Signifier,
    registry: &NamespaceRegistry,
    interaction_guidance: bool,
) -> Option<SignifierProperty> {
    let iri = signifier.iri.clone()?;
    let action_types = signifier.action_types().iter().map(|t| registry.compact(t)).collect();
    let guidance = interaction_guidance.then(|| Guidance {
        recommended_abilities: signifier
            .recommended_ability_types()
            .map(|t| registry.compact(t))
            .collect(),
        recommended_contexts: signifier
            .recommended_contexts
            .iter()
            .flat_map(Context::belief_contents)
            .collect(),
    });
    Some(SignifierProperty {
        iri,
        action_types,
        guidance,
    })
}

fn diff_signifiers(previous: &[SignifierProperty], next: &[SignifierProperty]) -> ObsEvent {
    let mut event = ObsEvent::default();
    for p in next {
        match previous.iter().find(|old| old.iri == p.iri) {
            None => event.added.push(ObsProperty::Signifier(p.clone())),
            Some(old) if old != p => event.changed.push(ObsProperty::Signifier(p.clone())),
            Some(_) => {}
        }
    }
    for old in previous {
        if !next.iter().any(|p| p.iri == old.iri) {
            event.removed.push(ObsProperty::Signifier(old.clone()));
        }
    }
    event
}
