//! Shared types for the trading agent system
//!
//! Every crate in the workspace speaks in terms of these value types:
//! the immutable `Message` envelope, the closed set of message kinds and
//! agent roles, and the dispatch priority scale.

pub mod message;

pub use message::{
    AgentRole, Message, MessagePriority, MessageType, Payload, BROADCAST,
};

// Re-exported so downstream crates stamp ids and times with the same versions
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
