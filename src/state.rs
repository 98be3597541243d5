//! Shared registry and situation state.
//!
//! Namespaces, the situation graph, recorded recommended contexts, agent
//! recommendation contexts and the router's subscription table all live in
//! one `HyperState` behind one mutex. Validation reads hold the same lock
//! as mutations. Network calls never happen while it is held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{HyperError, HyperResult};
use crate::namespace::NamespaceRegistry;
use crate::recommendation::RecommendationContext;
use crate::router::SubscriptionTable;
use crate::situation::{RecommendedContexts, Situation};

/// Everything guarded by the state lock.
#[derive(Default)]
pub struct HyperState {
    pub namespaces: NamespaceRegistry,
    pub situation: Situation,
    pub contexts: RecommendedContexts,
    /// Recommendation contexts per agent name.
    pub recommendations: HashMap<String, Vec<RecommendationContext>>,
    pub(crate) subscriptions: SubscriptionTable,
}

impl std::fmt::Debug for HyperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperState")
            .field("namespaces", &self.namespaces)
            .field("situation_topics", &self.situation.topics().count())
            .field("recorded_contexts", &self.contexts.len())
            .field("agents", &self.recommendations.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<HyperState>>,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing namespace registry.
    #[must_use]
    pub fn with_namespaces(namespaces: NamespaceRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HyperState {
                namespaces,
                ..HyperState::default()
            })),
        }
    }

    /// Acquires the state lock.
    pub fn lock(&self) -> HyperResult<MutexGuard<'_, HyperState>> {
        self.inner.lock().map_err(|_| HyperError::poisoned("hyper state"))
    }

    /// Snapshot of the namespace registry.
    pub fn namespaces(&self) -> HyperResult<NamespaceRegistry> {
        Ok(self.lock()?.namespaces.clone())
    }

    /// Registers a namespace under the state lock.
    pub fn register_namespace(&self, prefix: &str, identifier: &str) -> HyperResult<()> {
        self.lock()?.namespaces.register(prefix, identifier)?;
        Ok(())
    }

    /// Compacts `identifier` against the current registry.
    pub fn compact(&self, identifier: &str) -> HyperResult<String> {
        Ok(self.lock()?.namespaces.compact(identifier))
    }

    /// Resolves `identifier` against the current registry.
    pub fn resolve(&self, identifier: &str) -> HyperResult<String> {
        Ok(self.lock()?.namespaces.resolve(identifier))
    }
}
