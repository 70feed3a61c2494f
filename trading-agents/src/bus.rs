//! Priority message bus
//!
//! The bus owns the agent registry, the per-type subscriber lists and a
//! single priority queue. Producers enqueue without blocking; one dispatch
//! loop dequeues in (priority, enqueue order) and delivers each message
//! before pulling the next one.
//!
//! Delivery is synchronous in the default mode: a slow `receive_message`
//! stalls every message behind it, and a handler that never returns stalls
//! the bus for good. There is no per-message timeout or retry.
//! `DispatchMode::WorkerPool` trades the global total order for throughput:
//! each message is routed in its own task, so messages may finish out of
//! order across recipients (a single broadcast still walks its subscribers
//! in order).

use crate::agent::Agent;
use crate::error::BusError;
use common::{Message, MessagePriority, MessageType};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// How dequeued messages are handed to recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// One message at a time, in queue order
    Sequential,
    /// Up to `max_in_flight` messages routed concurrently
    WorkerPool { max_in_flight: usize },
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Sequential
    }
}

/// Configuration for the message bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageBusConfig {
    /// Name recorded on the bus tracing span
    pub name: String,
    /// How long the dispatch loop waits on an empty queue before re-checking
    /// the stop flag
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub dispatch: DispatchMode,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            name: "message-bus".to_string(),
            poll_interval_ms: 1000,
            dispatch: DispatchMode::Sequential,
        }
    }
}

impl MessageBusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Snapshot of the bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

struct QueuedMessage {
    priority: MessagePriority,
    sequence: u64,
    message: Message,
}

// BinaryHeap is a max-heap: the "greatest" entry is the lowest priority
// value, then the earliest sequence number.
impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedMessage {}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedMessage>,
    next_sequence: u64,
}

#[derive(Default)]
struct DispatchQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl DispatchQueue {
    fn push(&self, message: Message) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Sequence is taken under the lock so FIFO order matches heap order
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(QueuedMessage {
            priority: message.priority(),
            sequence,
            message,
        });
        drop(state);
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .heap
            .pop()
            .map(|queued| queued.message)
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .heap
            .len()
    }
}

/// Send-only handle to a bus, held by connected agents
///
/// Holds the queue but not the registry, so agents never keep the bus
/// (and through it, each other) alive.
#[derive(Clone)]
pub struct BusHandle {
    queue: Arc<DispatchQueue>,
    counters: Arc<Counters>,
}

impl BusHandle {
    /// Enqueue a message. Never blocks on delivery.
    pub fn send(&self, message: Message) {
        debug!(
            id = %message.id(),
            msg_type = %message.msg_type(),
            priority = message.priority().value(),
            "Queued message"
        );
        self.queue.push(message);
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
    }
}

struct BusInner {
    config: MessageBusConfig,
    agents: DashMap<String, Arc<dyn Agent>>,
    subscribers: DashMap<MessageType, Vec<String>>,
    handle: BusHandle,
    /// Stop request flag, observed between deliveries
    running: AtomicBool,
    /// Held by whichever path is consuming the queue
    consuming: AtomicBool,
    span: Span,
}

/// Exclusive right to pop from the queue. Released on drop, so a
/// cancelled or panicking consumer does not wedge the bus.
struct ConsumerGuard<'a>(&'a AtomicBool);

impl<'a> ConsumerGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ConsumerGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Central message coordination system
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a bus. Its tracing span is created here and wraps all of its
    /// dispatch work.
    pub fn new(config: MessageBusConfig) -> Self {
        let span = info_span!("message_bus", name = %config.name);
        Self {
            inner: Arc::new(BusInner {
                config,
                agents: DashMap::new(),
                subscribers: DashMap::new(),
                handle: BusHandle {
                    queue: Arc::new(DispatchQueue::default()),
                    counters: Arc::new(Counters::default()),
                },
                running: AtomicBool::new(false),
                consuming: AtomicBool::new(false),
                span,
            }),
        }
    }

    pub fn config(&self) -> &MessageBusConfig {
        &self.inner.config
    }

    /// A send-only handle onto this bus's queue
    pub fn handle(&self) -> BusHandle {
        self.inner.handle.clone()
    }

    /// Add an agent to the registry. Re-using an id replaces the earlier
    /// agent; existing subscriptions then route to the new one.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        let agent_id = agent.id().to_string();
        let role = agent.role();
        if self.inner.agents.insert(agent_id.clone(), agent).is_some() {
            warn!(parent: &self.inner.span, agent_id = %agent_id, "Agent id registered twice, last registration wins");
        }
        info!(parent: &self.inner.span, agent_id = %agent_id, role = %role, "Registered agent");
    }

    /// Subscribe a registered agent to broadcasts of `msg_type`.
    ///
    /// Returns false (and changes nothing) when the agent is unknown.
    /// Subscribing twice is harmless.
    pub fn subscribe(&self, agent_id: &str, msg_type: MessageType) -> bool {
        if !self.inner.agents.contains_key(agent_id) {
            debug!(parent: &self.inner.span, agent_id = %agent_id, msg_type = %msg_type, "Ignoring subscription for unregistered agent");
            return false;
        }
        let mut list = self.inner.subscribers.entry(msg_type).or_default();
        if !list.iter().any(|id| id == agent_id) {
            list.push(agent_id.to_string());
        }
        true
    }

    /// Queue a message for delivery
    pub fn send(&self, message: Message) {
        let _entered = self.inner.span.enter();
        self.inner.handle.send(message);
    }

    /// Run the dispatch loop until `stop` is called.
    ///
    /// Only one consumer may pop the queue at a time. While a loop is
    /// still finishing a delivery after `stop`, or `dispatch_pending` is
    /// draining, a new call is refused. Messages still queued when the
    /// loop exits stay queued.
    pub async fn run(&self) -> Result<(), BusError> {
        let Some(_consumer) = ConsumerGuard::acquire(&self.inner.consuming) else {
            return Err(BusError::AlreadyRunning);
        };
        self.inner.running.store(true, Ordering::Release);
        let span = self.inner.span.clone();
        self.dispatch_loop().instrument(span).await;
        self.inner.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Ask the dispatch loop to exit after its in-flight delivery
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.handle.queue.ready.notify_one();
        info!(parent: &self.inner.span, "Message bus stop requested");
    }

    /// True while a dispatch loop is active and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire) && self.inner.consuming.load(Ordering::Acquire)
    }

    /// Route every queued message, including ones enqueued by handlers
    /// along the way, on the caller's task. Returns how many were routed.
    ///
    /// Routes nothing and returns 0 while another consumer (a `run` loop
    /// or another drain) owns the queue.
    pub async fn dispatch_pending(&self) -> usize {
        let Some(_consumer) = ConsumerGuard::acquire(&self.inner.consuming) else {
            debug!(parent: &self.inner.span, "Queue already has a consumer, skipping drain");
            return 0;
        };
        let span = self.inner.span.clone();
        async {
            let mut routed = 0;
            while let Some(message) = self.inner.handle.queue.pop() {
                self.route(message).await;
                routed += 1;
            }
            routed
        }
        .instrument(span)
        .await
    }

    /// Number of messages waiting in the queue
    pub fn pending(&self) -> usize {
        self.inner.handle.queue.len()
    }

    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.handle.counters;
        BusStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.inner
            .agents
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.agents.contains_key(agent_id)
    }

    /// Subscribers of `msg_type`, in subscription order
    pub fn subscribers(&self, msg_type: MessageType) -> Vec<String> {
        self.inner
            .subscribers
            .get(&msg_type)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    async fn dispatch_loop(&self) {
        let poll_interval = self.inner.config.poll_interval();
        let permits = match self.inner.config.dispatch {
            DispatchMode::Sequential => None,
            DispatchMode::WorkerPool { max_in_flight } => {
                Some(Arc::new(Semaphore::new(max_in_flight.max(1))))
            }
        };
        let mut in_flight = JoinSet::new();

        info!(mode = ?self.inner.config.dispatch, "Message bus started");

        while self.inner.running.load(Ordering::Acquire) {
            while in_flight.try_join_next().is_some() {}

            let Some(message) = self.inner.handle.queue.pop() else {
                // An elapsed wait is the normal idle outcome
                let _ = tokio::time::timeout(poll_interval, self.inner.handle.queue.ready.notified()).await;
                continue;
            };

            match &permits {
                None => self.route(message).await,
                Some(permits) => {
                    let Ok(permit) = Arc::clone(permits).acquire_owned().await else {
                        break;
                    };
                    let bus = self.clone();
                    in_flight.spawn(
                        async move {
                            bus.route(message).await;
                            drop(permit);
                        }
                        .instrument(Span::current()),
                    );
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        info!("Message bus stopped");
    }

    async fn route(&self, message: Message) {
        debug!(
            id = %message.id(),
            sender = %message.sender(),
            recipient = %message.recipient(),
            msg_type = %message.msg_type(),
            priority = message.priority().value(),
            "Routing message"
        );

        if message.is_broadcast() {
            let subscribers = self.subscribers(message.msg_type());
            for agent_id in subscribers.iter().filter(|id| id.as_str() != message.sender()) {
                if let Some(agent) = self.agent(agent_id) {
                    self.deliver(agent, &message).await;
                }
            }
        } else {
            match self.agent(message.recipient()) {
                Some(agent) => self.deliver(agent, &message).await,
                None => {
                    self.inner.handle.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        id = %message.id(),
                        sender = %message.sender(),
                        recipient = %message.recipient(),
                        msg_type = %message.msg_type(),
                        "Dropping message for unregistered recipient"
                    );
                }
            }
        }
    }

    fn agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.inner
            .agents
            .get(agent_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn deliver(&self, agent: Arc<dyn Agent>, message: &Message) {
        let counters = &self.inner.handle.counters;
        let outcome = AssertUnwindSafe(agent.receive_message(message.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    id = %message.id(),
                    sender = %message.sender(),
                    recipient = %agent.id(),
                    msg_type = %message.msg_type(),
                    error = %format!("{e:#}"),
                    "Message handler failed"
                );
            }
            Err(panic) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    id = %message.id(),
                    sender = %message.sender(),
                    recipient = %agent.id(),
                    msg_type = %message.msg_type(),
                    panic = %panic_message(panic.as_ref()),
                    "Message handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
