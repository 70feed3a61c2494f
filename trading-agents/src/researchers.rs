//! Bull and bear researchers
//!
//! Each one argues a single side of the debate and reports back to the
//! research lead with a RESPONSE.

use crate::agent::{Agent, AgentCore};
use anyhow::Result;
use async_trait::async_trait;
use common::{AgentRole, Message, MessagePriority, MessageType, Payload};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Bullish,
    Bearish,
}

impl Stance {
    fn default_id(&self) -> &'static str {
        match self {
            Stance::Bullish => "research_bull",
            Stance::Bearish => "research_bear",
        }
    }

    fn thesis(&self) -> &'static str {
        match self {
            Stance::Bullish => {
                "Building bullish thesis with catalyst identification and price target derivation"
            }
            Stance::Bearish => {
                "Building bearish thesis with risk identification and downside scenarios"
            }
        }
    }

    fn side(&self) -> &'static str {
        match self {
            Stance::Bullish => "bullish",
            Stance::Bearish => "bearish",
        }
    }
}

/// One-sided researcher reporting to the research lead
pub struct DebateResearcher {
    core: AgentCore,
    stance: Stance,
    lead_id: String,
}

impl DebateResearcher {
    pub fn new(stance: Stance) -> Self {
        Self::with_ids(stance, stance.default_id(), "research_lead")
    }

    pub fn with_ids(stance: Stance, id: &str, lead_id: &str) -> Self {
        Self {
            core: AgentCore::new(id, AgentRole::Research),
            stance,
            lead_id: lead_id.to_string(),
        }
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }
}

#[async_trait]
impl Agent for DebateResearcher {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn reason(&self, _observation: &str) -> Result<String> {
        Ok(self.stance.thesis().to_string())
    }

    async fn decide_action(&self, reasoning: &str) -> Result<Option<Message>> {
        let mut payload = Payload::new();
        payload.insert("side".to_string(), json!(self.stance.side()));
        payload.insert("analysis".to_string(), json!(reasoning));
        Ok(Some(self.core.compose(
            self.lead_id.clone(),
            MessageType::Response,
            payload,
            MessagePriority::NORMAL,
        )))
    }

    async fn receive_message(&self, message: Message) -> Result<()> {
        let is_command = message.msg_type() == MessageType::Command;
        self.core.remember(message.clone()).await;

        if is_command {
            let observation = message
                .payload_str("command")
                .unwrap_or("unspecified command")
                .to_string();
            self.step(&observation).await?;
            self.core.acknowledge(&message, Payload::new())?;
        }
        Ok(())
    }
}
