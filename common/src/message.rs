//! Message envelope and the enums that classify it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved recipient address meaning "every subscriber of this message type"
pub const BROADCAST: &str = "all";

/// Free-form structured payload. The schema depends on the message type.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Closed set of message kinds routed by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Analysis,
    ResearchReport,
    TradeSignal,
    RiskAlert,
    MarketData,
    Command,
    Response,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Analysis,
        MessageType::ResearchReport,
        MessageType::TradeSignal,
        MessageType::RiskAlert,
        MessageType::MarketData,
        MessageType::Command,
        MessageType::Response,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Analysis => "analysis",
            MessageType::ResearchReport => "research_report",
            MessageType::TradeSignal => "trade_signal",
            MessageType::RiskAlert => "risk_alert",
            MessageType::MarketData => "market_data",
            MessageType::Command => "command",
            MessageType::Response => "response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role an agent plays in the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Analyst,
    Research,
    Trader,
    Risk,
    Orchestrator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Analyst => "analyst",
            AgentRole::Research => "research",
            AgentRole::Trader => "trader",
            AgentRole::Risk => "risk",
            AgentRole::Orchestrator => "orchestrator",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority, 1 (most urgent) to 10 (least urgent)
///
/// Values outside the scale are clamped rather than rejected so that
/// building a message can never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct MessagePriority(u8);

impl MessagePriority {
    pub const HIGHEST: MessagePriority = MessagePriority(1);
    pub const NORMAL: MessagePriority = MessagePriority(5);
    pub const LOWEST: MessagePriority = MessagePriority(10);

    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::HIGHEST.0, Self::LOWEST.0))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u8> for MessagePriority {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<MessagePriority> for u8 {
    fn from(priority: MessagePriority) -> Self {
        priority.0
    }
}

/// Immutable routed message
///
/// Fields are private; a message is built once and then only read or
/// cloned into each recipient's memory. The serialized form is the audit
/// wire shape `{ id, sender, recipient, type, payload, timestamp, priority }`
/// with an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    sender: String,
    recipient: String,
    #[serde(rename = "type")]
    msg_type: MessageType,
    payload: Payload,
    timestamp: DateTime<Utc>,
    priority: MessagePriority,
}

impl Message {
    /// Build a message stamped with a fresh id and the current time
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        msg_type: MessageType,
        payload: Payload,
        priority: MessagePriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            msg_type,
            payload,
            timestamp: Utc::now(),
            priority,
        }
    }

    /// Same message content stamped with an explicit creation time
    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, ..self }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn priority(&self) -> MessagePriority {
        self.priority
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }

    /// Numeric payload field, if present and numeric
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(|v| v.as_f64())
    }

    /// String payload field, if present and a string
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// JSON rendering of the wire shape, for audit logs
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
