//! Agents used only by unit tests

use crate::agent::{Agent, AgentCore};
use async_trait::async_trait;
use common::AgentRole;

/// Keeps whatever it is sent and never reasons
pub struct Inbox {
    core: AgentCore,
}

impl Inbox {
    pub fn new(id: &str) -> Self {
        Self { core: AgentCore::new(id, AgentRole::Trader) }
    }
}

#[async_trait]
impl Agent for Inbox {
    fn core(&self) -> &AgentCore {
        &self.core
    }
}
