//! Typed error conditions
//!
//! Handlers return `anyhow::Result`; these enums are the conditions callers
//! may want to match on after a `downcast_ref`.

use thiserror::Error;

/// Wiring and contract errors raised by agents
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    /// A concrete agent was asked to run a ReAct hook it never overrode
    #[error("agent '{agent_id}' does not implement the '{hook}' hook")]
    HookNotImplemented { agent_id: String, hook: &'static str },

    #[error("agent '{agent_id}' is not connected to a message bus")]
    NotConnected { agent_id: String },

    #[error("agent '{agent_id}' is already connected to a message bus")]
    AlreadyConnected { agent_id: String },
}

/// Errors raised by the message bus itself
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("message bus dispatch loop is already running")]
    AlreadyRunning,
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
