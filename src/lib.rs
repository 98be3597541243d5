//! # hypersig - Signifier resolution for hypermedia agents
//!
//! hypersig lets autonomous agents discover, filter and invoke the
//! interaction possibilities ("signifiers") that hypermedia resources offer,
//! and keeps that state synchronized through pushed notifications.
//!
//! ## Core Concepts
//!
//! - **Namespace registry**: maps compact `prefix:local` forms to absolute IRIs
//! - **Signifier**: an offered interaction with its action type, recommended
//!   abilities and recommended situational contexts
//! - **Event filter**: per-agent predicate deciding which signifier changes
//!   the agent sees, based on its abilities and the current situation
//! - **Notification router**: topic-keyed delivery of pushed state changes
//!   to local consumers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hypersig::{HandshakeMode, NoopSubscribeSender, NotificationRouter, RouterConfig, SharedState};
//!
//! let state = SharedState::new();
//! state.register_namespace("ex", "https://example.org/")?;
//!
//! let router = NotificationRouter::start(RouterConfig::default(), state.clone(), Arc::new(NoopSubscribeSender))?;
//! router.register_for_topic("https://example.org/lamp", "https://hub.example.org/", HandshakeMode::WebSub, exposure)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values
pub mod error;
pub mod graph;
pub mod namespace;
pub mod profile;
pub mod signifier;
pub mod vocab;

// Matching and filtering
pub mod filter;
pub mod matcher;
pub mod situation;

// Shared state, routing and exposure
pub mod config;
pub mod exposure;
pub mod recommendation;
pub mod router;
pub mod state;
pub mod websub;

#[cfg(feature = "transport-http")]
pub mod transport;

pub use error::{ExecutionError, HyperError, HyperResult, TransportError, ValidationError};
pub use exposure::{ActionExecutor, ActionRequest, ExposureOptions, ExposureStream, SignifierExposure};
pub use filter::{AcceptAll, EventFilter, ObsEvent, ObsEventFilter, ObsProperty, SignifierProperty};
pub use graph::{Graph, Term, Triple};
pub use matcher::{is_complementary, AgentCapabilitySet};
pub use namespace::{NamespaceBinding, NamespaceRegistry};
pub use profile::{JsonProfileSource, ProfileKind, ProfileSource, ResourceDescription};
pub use recommendation::{RecommendationContext, RecommendationRegistry};
pub use router::{
    DeliveryOutcome, HandshakeMode, NoopSubscribeSender, Notification, NotificationConsumer, NotificationRouter,
    RouterConfig, SubscribeSender, SubscriptionState,
};
pub use signifier::{Ability, ActionSpecification, Context, Form, Signifier};
pub use situation::{HasValueValidator, ShapeValidator, Situation, SituationalContextValidator};
pub use state::SharedState;
