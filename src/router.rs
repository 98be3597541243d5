//! Topic-keyed notification router.
//!
//! Pushed notifications are enqueued by the receiver and dispatched by one
//! dedicated worker thread. The worker drains the queue in arrival order
//! and sleeps for a fixed interval when it is empty, so stopping only has to
//! flip a flag. Each notification is handed to its consumers one at a time
//! before the next one is dequeued.
//!
//! Subscriptions are keyed by `(topic, source)`. The external subscribe
//! handshake is sent once per key; later registrations for the same key only
//! add consumers. Delivery fans out across sources: every consumer of any
//! subscription on the notification's topic receives it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ExecutionError, HyperError, HyperResult};
use crate::state::SharedState;

/// Default delay between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A pushed state-change message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Identifier of the observed resource.
    pub topic: String,
    /// Raw payload; interpreted by consumers, never by the router.
    pub payload: String,
    pub content_type: String,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: payload.into(),
            content_type: content_type.into(),
            received_at: Utc::now(),
        }
    }
}

/// Handle identifying one consumer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local receiver of routed notifications.
pub trait NotificationConsumer: Send + Sync {
    /// Handles one notification. Errors are logged by the router and never
    /// stop delivery to other consumers.
    fn on_notification(&self, notification: &Notification) -> HyperResult<()>;
}

/// How the external subscription is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HandshakeMode {
    /// W3C WebSub subscribe request to a hub.
    WebSub,
    /// Workspace focus request for a named artifact.
    Focus {
        artifact_name: String,
    },
}

/// An external subscribe handshake to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic: String,
    /// Hub or workspace IRI.
    pub source: String,
    pub mode: HandshakeMode,
}

/// Collaborator that performs subscribe handshakes.
pub trait SubscribeSender: Send + Sync {
    fn subscribe(&self, request: &SubscribeRequest) -> HyperResult<()>;
}

/// Sender for in-process deployments where no handshake is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscribeSender;

impl SubscribeSender for NoopSubscribeSender {
    fn subscribe(&self, request: &SubscribeRequest) -> HyperResult<()> {
        debug!(topic = %request.topic, source = %request.source, "skipping subscribe handshake");
        Ok(())
    }
}

/// Lifecycle of a `(topic, source)` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Unregistered,
    Subscribing,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubscriptionKey {
    topic: String,
    source: String,
}

struct ConsumerEntry {
    id: ConsumerId,
    consumer: Arc<dyn NotificationConsumer>,
}

struct SubscriptionEntry {
    key: SubscriptionKey,
    state: SubscriptionState,
    handshake_failed: bool,
    consumers: Vec<ConsumerEntry>,
}

/// Subscription table, kept in registration order.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: Vec<SubscriptionEntry>,
}

impl SubscriptionTable {
    fn find_mut(&mut self, key: &SubscriptionKey) -> Option<&mut SubscriptionEntry> {
        self.entries.iter_mut().find(|e| &e.key == key)
    }

    fn find(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    fn consumers_for_topic(&self, topic: &str) -> Vec<(ConsumerId, Arc<dyn NotificationConsumer>)> {
        let mut out: Vec<(ConsumerId, Arc<dyn NotificationConsumer>)> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.key.topic == topic) {
            for c in &entry.consumers {
                if !out.iter().any(|(id, _)| *id == c.id) {
                    out.push((c.id, Arc::clone(&c.consumer)));
                }
            }
        }
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Snapshot of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub topic: String,
    pub source: String,
    pub state: SubscriptionState,
    pub consumers: usize,
    /// The handshake failed; the subscription stays active regardless.
    pub handshake_failed: bool,
}

/// What happened to a notification handed to [`NotificationRouter::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued for the worker.
    Queued,
    /// The queue was full; the notification was dropped and counted.
    Dropped,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Delay between polls of an empty queue.
    pub poll_interval: Duration,
    /// Max queued notifications before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: 4096,
        }
    }
}

#[derive(Debug, Default)]
struct RouterStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Counters reported by the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    /// Successful consumer dispatches.
    pub delivered: u64,
    /// Consumer dispatches that returned an error or panicked.
    pub failed: u64,
    /// Notifications dropped on a full queue or at shutdown.
    pub dropped: u64,
}

/// Notification router with its delivery worker.
pub struct NotificationRouter {
    state: SharedState,
    sender: Arc<dyn SubscribeSender>,
    queue_tx: Sender<Notification>,
    running: Arc<AtomicBool>,
    // Held while enqueueing and while clearing `running`, so nothing is
    // enqueued after the worker's final drain.
    gate: Mutex<()>,
    stats: Arc<RouterStats>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("running", &self.is_running())
            .field("stats", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl NotificationRouter {
    /// Creates the router and starts its delivery worker.
    pub fn start(cfg: RouterConfig, state: SharedState, sender: Arc<dyn SubscribeSender>) -> HyperResult<Self> {
        let (queue_tx, queue_rx) = bounded::<Notification>(cfg.queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RouterStats::default());

        let worker = Worker {
            state: state.clone(),
            queue_rx,
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
            poll_interval: cfg.poll_interval,
        };
        let join = thread::Builder::new()
            .name("hypersig-router".to_string())
            .spawn(move || worker.run())
            .map_err(|e| HyperError::internal(format!("failed to spawn router worker: {e}")))?;

        Ok(Self {
            state,
            sender,
            queue_tx,
            running,
            gate: Mutex::new(()),
            stats,
            join: Mutex::new(Some(join)),
        })
    }

    /// Registers `consumer` for `topic` as published through `source`.
    ///
    /// The first registration for a `(topic, source)` pair issues the
    /// handshake; the subscription is marked active whatever its outcome.
    pub fn register_for_topic(
        &self,
        topic: &str,
        source: &str,
        mode: HandshakeMode,
        consumer: Arc<dyn NotificationConsumer>,
    ) -> HyperResult<ConsumerId> {
        let key = SubscriptionKey {
            topic: topic.to_string(),
            source: source.to_string(),
        };
        let id = ConsumerId::new();

        {
            let mut st = self.state.lock()?;
            if let Some(entry) = st.subscriptions.find_mut(&key) {
                entry.consumers.push(ConsumerEntry { id, consumer });
                debug!(topic, source, consumer = %id, "added consumer to existing subscription");
                return Ok(id);
            }
            st.subscriptions.entries.push(SubscriptionEntry {
                key: key.clone(),
                state: SubscriptionState::Subscribing,
                handshake_failed: false,
                consumers: vec![ConsumerEntry { id, consumer }],
            });
        }

        let request = SubscribeRequest {
            topic: key.topic.clone(),
            source: key.source.clone(),
            mode,
        };
        let handshake_failed = match self.sender.subscribe(&request) {
            Ok(()) => {
                info!(topic, source, "subscribed");
                false
            }
            Err(e) => {
                let failure = ExecutionError::SubscribeHandshakeFailure {
                    topic: topic.to_string(),
                    source_iri: source.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %failure, "subscription recorded as active without a confirmed handshake");
                true
            }
        };

        let mut st = self.state.lock()?;
        if let Some(entry) = st.subscriptions.find_mut(&key) {
            entry.state = SubscriptionState::Active;
            entry.handshake_failed = handshake_failed;
        }
        Ok(id)
    }

    /// Enqueues a notification without blocking.
    ///
    /// A full queue drops the notification, bumps the drop counter and
    /// reports [`DeliveryOutcome::Dropped`].
    ///
    /// # Errors
    /// `Disconnected` once the router has been stopped.
    pub fn deliver(&self, notification: Notification) -> HyperResult<DeliveryOutcome> {
        let _gate = self.gate.lock().map_err(|_| HyperError::poisoned("router gate"))?;
        if !self.is_running() {
            return Err(disconnected());
        }
        match self.queue_tx.try_send(notification) {
            Ok(()) => Ok(DeliveryOutcome::Queued),
            Err(TrySendError::Full(n)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %n.topic, "notification queue full; dropping notification");
                Ok(DeliveryOutcome::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => Err(disconnected()),
        }
    }

    /// True if any subscription exists for `topic`.
    pub fn is_registered(&self, topic: &str) -> HyperResult<bool> {
        Ok(self
            .state
            .lock()?
            .subscriptions
            .entries
            .iter()
            .any(|e| e.key.topic == topic))
    }

    /// State of the `(topic, source)` subscription.
    pub fn subscription_state(&self, topic: &str, source: &str) -> HyperResult<SubscriptionState> {
        let key = SubscriptionKey {
            topic: topic.to_string(),
            source: source.to_string(),
        };
        Ok(self
            .state
            .lock()?
            .subscriptions
            .find(&key)
            .map_or(SubscriptionState::Unregistered, |e| e.state))
    }

    /// Number of distinct consumers a notification on `topic` reaches.
    pub fn consumer_count(&self, topic: &str) -> HyperResult<usize> {
        Ok(self.state.lock()?.subscriptions.consumers_for_topic(topic).len())
    }

    /// Snapshot of every subscription, in registration order.
    pub fn subscriptions(&self) -> HyperResult<Vec<SubscriptionInfo>> {
        Ok(self
            .state
            .lock()?
            .subscriptions
            .entries
            .iter()
            .map(|e| SubscriptionInfo {
                topic: e.key.topic.clone(),
                source: e.key.source.clone(),
                state: e.state,
                consumers: e.consumers.len(),
                handshake_failed: e.handshake_failed,
            })
            .collect())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A notification being dispatched is delivered to all its consumers;
    /// anything still queued is dropped and logged.
    pub fn stop(&self) -> HyperResult<RouterSnapshot> {
        {
            let _gate = self.gate.lock().map_err(|_| HyperError::poisoned("router gate"))?;
            self.running.store(false, Ordering::Release);
        }
        let handle = self
            .join
            .lock()
            .map_err(|_| HyperError::poisoned("router join handle"))?
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| HyperError::internal("router worker panicked"))?;
        }
        Ok(self.snapshot())
    }
}

impl Drop for NotificationRouter {
    fn drop(&mut self) {
        // Do not join: a hung consumer would hang the caller. The worker exits
        // on its next poll.
        let _gate = self.gate.lock();
        self.running.store(false, Ordering::Release);
    }
}

fn disconnected() -> HyperError {
    HyperError::Execution(ExecutionError::Disconnected {
        path: "router_queue".to_string(),
    })
}

struct Worker {
    state: SharedState,
    queue_rx: Receiver<Notification>,
    running: Arc<AtomicBool>,
    stats: Arc<RouterStats>,
    poll_interval: Duration,
}

impl Worker {
    fn run(self) {
        loop {
            if !self.running.load(Ordering::Acquire) {
                self.drain_on_shutdown();
                break;
            }
            match self.queue_rx.try_recv() {
                Ok(n) => self.dispatch(&n),
                Err(TryRecvError::Empty) => thread::sleep(self.poll_interval),
                Err(TryRecvError::Disconnected) => break,
            }
        }
        debug!("router worker stopped");
    }

    fn drain_on_shutdown(&self) {
        while let Ok(n) = self.queue_rx.try_recv() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(topic = %n.topic, notification = %n.id, "router stopped; dropping undelivered notification");
        }
    }

    fn dispatch(&self, n: &Notification) {
        // The consumer list is copied out so consumers can take the state lock.
        let consumers = match self.state.lock() {
            Ok(st) => st.subscriptions.consumers_for_topic(&n.topic),
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %n.topic, error = %e, "cannot read subscriptions; dropping notification");
                return;
            }
        };

        if consumers.is_empty() {
            debug!(topic = %n.topic, "no consumers for topic");
            return;
        }

        for (id, consumer) in consumers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| consumer.on_notification(n)));
            let reason = match outcome {
                Ok(Ok(())) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "consumer panicked".to_string(),
            };
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            let failure = ExecutionError::DeliveryFailure {
                consumer: id.to_string(),
                reason,
            };
            warn!(topic = %n.topic, error = %failure, "notification delivery failed");
        }
    }
}
