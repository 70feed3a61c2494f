//! Base Agent trait and shared agent state
//!
//! Every participant on the bus implements the `Agent` trait. The trait
//! carries the ReAct loop (`think` then `act`) as provided methods and
//! leaves two hooks, `reason` and `decide_action`, to the concrete role.
//! The bus only ever sees `Arc<dyn Agent>`.

use crate::bus::{BusHandle, MessageBus};
use crate::error::AgentError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AgentRole, Message, MessagePriority, MessageType, Payload, BROADCAST};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, Span};

/// One entry of an agent's audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ReasoningStep {
    Observation(String),
    Reasoning(String),
    Action(String),
}

impl fmt::Display for ReasoningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningStep::Observation(text) => write!(f, "Observation: {}", text),
            ReasoningStep::Reasoning(text) => write!(f, "Reasoning: {}", text),
            ReasoningStep::Action(text) => write!(f, "Action: {}", text),
        }
    }
}

/// State every agent owns: identity, memory, reasoning chain and its
/// connection to a bus
///
/// Memory and the reasoning chain are append-only. Only the owning agent
/// writes to them.
pub struct AgentCore {
    id: String,
    role: AgentRole,
    memory: RwLock<Vec<Message>>,
    reasoning_chain: RwLock<Vec<ReasoningStep>>,
    bus: OnceLock<BusHandle>,
    last_stamp_micros: AtomicI64,
    span: Span,
}

impl AgentCore {
    pub fn new(id: impl Into<String>, role: AgentRole) -> Self {
        let id = id.into();
        let span = info_span!("agent", id = %id, role = %role);
        Self {
            id,
            role,
            memory: RwLock::new(Vec::new()),
            reasoning_chain: RwLock::new(Vec::new()),
            bus: OnceLock::new(),
            last_stamp_micros: AtomicI64::new(i64::MIN),
            span,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Tracing span carrying this agent's id and role
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Bind this agent to a bus queue. Single use.
    pub fn attach(&self, handle: BusHandle) -> Result<(), AgentError> {
        self.bus.set(handle).map_err(|_| AgentError::AlreadyConnected {
            agent_id: self.id.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.bus.get().is_some()
    }

    pub async fn remember(&self, message: Message) {
        self.memory.write().await.push(message);
    }

    /// Snapshot of everything received so far, oldest first
    pub async fn memory(&self) -> Vec<Message> {
        self.memory.read().await.clone()
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }

    /// Received messages of one type, oldest first
    pub async fn messages_of(&self, msg_type: MessageType) -> Vec<Message> {
        self.memory
            .read()
            .await
            .iter()
            .filter(|m| m.msg_type() == msg_type)
            .cloned()
            .collect()
    }

    pub async fn record(&self, step: ReasoningStep) {
        debug!(parent: &self.span, step = %step, "Reasoning step");
        self.reasoning_chain.write().await.push(step);
    }

    pub async fn reasoning_chain(&self) -> Vec<ReasoningStep> {
        self.reasoning_chain.read().await.clone()
    }

    /// Build a message from this agent without sending it
    pub fn compose(
        &self,
        recipient: impl Into<String>,
        msg_type: MessageType,
        payload: Payload,
        priority: MessagePriority,
    ) -> Message {
        Message::new(self.id.clone(), recipient, msg_type, payload, priority)
            .with_timestamp(self.next_timestamp())
    }

    /// Hand an already-built message to the bus. Returns its id.
    pub fn dispatch(&self, message: Message) -> Result<String, AgentError> {
        let bus = self.bus.get().ok_or_else(|| AgentError::NotConnected {
            agent_id: self.id.clone(),
        })?;
        let id = message.id().to_string();
        let _entered = self.span.enter();
        bus.send(message);
        Ok(id)
    }

    pub fn send_message(
        &self,
        recipient: impl Into<String>,
        msg_type: MessageType,
        payload: Payload,
        priority: MessagePriority,
    ) -> Result<String, AgentError> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected {
                agent_id: self.id.clone(),
            });
        }
        self.dispatch(self.compose(recipient, msg_type, payload, priority))
    }

    /// Publish an analysis to every ANALYSIS subscriber
    pub fn broadcast(
        &self,
        analysis_type: &str,
        data: serde_json::Value,
        confidence: f64,
    ) -> Result<String, AgentError> {
        let mut payload = Payload::new();
        payload.insert("analysis_type".to_string(), json!(analysis_type));
        payload.insert("data".to_string(), data);
        payload.insert("confidence".to_string(), json!(confidence));
        payload.insert("agent_role".to_string(), json!(self.role.as_str()));
        self.send_message(BROADCAST, MessageType::Analysis, payload, MessagePriority::NORMAL)
    }

    /// Reply to a command with `{ack: <command id>}` plus `detail`
    pub fn acknowledge(&self, command: &Message, mut detail: Payload) -> Result<String, AgentError> {
        detail.insert("ack".to_string(), json!(command.id()));
        if let Some(name) = command.payload_str("command") {
            detail.insert("command".to_string(), json!(name));
        }
        self.send_message(command.sender(), MessageType::Response, detail, MessagePriority::NORMAL)
    }

    // Creation times never go backwards for one sender, even if the wall
    // clock does.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let micros = now.timestamp_micros();
        let previous = self.last_stamp_micros.fetch_max(micros, Ordering::AcqRel);
        DateTime::from_timestamp_micros(previous.max(micros)).unwrap_or(now)
    }
}

/// Base trait that all agents implement
///
/// Concrete roles supply `core` and override `reason` and `decide_action`.
/// The defaults for those two hooks fail with
/// `AgentError::HookNotImplemented`: an agent wired into a ReAct loop it
/// cannot run is a programming error and is reported on first use.
#[async_trait]
pub trait Agent: Send + Sync {
    fn core(&self) -> &AgentCore;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn role(&self) -> AgentRole {
        self.core().role()
    }

    /// Role-specific reasoning over an observation
    async fn reason(&self, _observation: &str) -> Result<String> {
        Err(AgentError::HookNotImplemented {
            agent_id: self.id().to_string(),
            hook: "reason",
        }
        .into())
    }

    /// Role-specific choice of what (if anything) to send
    async fn decide_action(&self, _reasoning: &str) -> Result<Option<Message>> {
        Err(AgentError::HookNotImplemented {
            agent_id: self.id().to_string(),
            hook: "decide_action",
        }
        .into())
    }

    /// ReAct reasoning step. Records the observation and the reasoning;
    /// never touches the bus.
    async fn think(&self, observation: &str) -> Result<String> {
        let core = self.core();
        core.record(ReasoningStep::Observation(observation.to_string())).await;
        let reasoning = self.reason(observation).await?;
        core.record(ReasoningStep::Reasoning(reasoning.clone())).await;
        Ok(reasoning)
    }

    /// ReAct action step. Returns the message to send, if any.
    async fn act(&self, reasoning: &str) -> Result<Option<Message>> {
        let action = self.decide_action(reasoning).await?;
        let summary = match &action {
            Some(message) => format!(
                "send {} to {} (priority {})",
                message.msg_type(),
                message.recipient(),
                message.priority().value()
            ),
            None => "no action".to_string(),
        };
        self.core().record(ReasoningStep::Action(summary)).await;
        Ok(action)
    }

    /// Called by the bus for every delivery
    async fn receive_message(&self, message: Message) -> Result<()> {
        debug!(
            parent: self.core().span(),
            sender = %message.sender(),
            msg_type = %message.msg_type(),
            "Received message"
        );
        self.core().remember(message).await;
        Ok(())
    }

    /// One full ReAct pass: think, act, and send whatever `act` produced.
    /// Returns the id of the sent message.
    async fn step(&self, observation: &str) -> Result<Option<String>> {
        let reasoning = self.think(observation).await?;
        match self.act(&reasoning).await? {
            Some(message) => Ok(Some(self.core().dispatch(message)?)),
            None => Ok(None),
        }
    }

    fn send_message(
        &self,
        recipient: &str,
        msg_type: MessageType,
        payload: Payload,
        priority: MessagePriority,
    ) -> Result<String, AgentError> {
        self.core().send_message(recipient, msg_type, payload, priority)
    }

    fn broadcast(
        &self,
        analysis_type: &str,
        data: serde_json::Value,
        confidence: f64,
    ) -> Result<String, AgentError> {
        self.core().broadcast(analysis_type, data, confidence)
    }

    /// Register with `bus` and keep a handle for sending. An agent joins
    /// exactly one bus for its lifetime.
    fn connect_bus(self: Arc<Self>, bus: &MessageBus) -> Result<(), AgentError>
    where
        Self: Sized + 'static,
    {
        self.core().attach(bus.handle())?;
        info!(parent: self.core().span(), "Connecting to message bus");
        bus.register_agent(self);
        Ok(())
    }
}
