//! Orchestrator - Coordinates the analyst, research and risk teams
//!
//! The Orchestrator:
//! - Synthesizes recent ANALYSIS traffic into a reasoning summary
//! - Commands the trader lead once average analyst confidence is high enough
//! - Drives a staged coordination cycle, waiting on acknowledgements
//!   between stages instead of sleeping
//! - Tracks trading state fed by TRADE_SIGNAL and RISK_ALERT traffic

use crate::agent::{Agent, AgentCore};
use crate::coordination::CompletionTracker;
use anyhow::Result;
use async_trait::async_trait;
use common::{AgentRole, Message, MessagePriority, MessageType, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Command sent to the trader lead when confidence is high
pub const EVALUATE_COMMAND: &str = "EVALUATE_SIGNALS";

/// One command issued during a coordination stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCommand {
    pub recipient: String,
    pub command: String,
    /// Extra payload fields sent alongside `command`
    #[serde(default)]
    pub params: Payload,
    #[serde(default = "default_stage_priority")]
    pub priority: u8,
}

fn default_stage_priority() -> u8 {
    MessagePriority::NORMAL.value()
}

impl StageCommand {
    pub fn new(recipient: &str, command: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            command: command.to_string(),
            params: Payload::new(),
            priority: default_stage_priority(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// A batch of commands that must all complete before the next batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStage {
    pub name: String,
    pub commands: Vec<StageCommand>,
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub agent_id: String,
    /// How many recent analyses the reasoning summary counts
    pub analysis_window: usize,
    /// Mean confidence must be strictly above this to command the trader
    pub confidence_threshold: f64,
    pub command_recipient: String,
    pub command_priority: u8,
    /// Upper bound on waiting for one stage's acknowledgements
    pub stage_timeout_ms: u64,
    pub stages: Vec<CycleStage>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_id: "orchestrator".to_string(),
            analysis_window: 10,
            confidence_threshold: 0.7,
            command_recipient: "trader_lead".to_string(),
            command_priority: 2,
            stage_timeout_ms: 2000,
            stages: vec![
                CycleStage {
                    name: "analysis".to_string(),
                    commands: vec![
                        StageCommand::new("analyst_fundamental", "ANALYZE_UNIVERSE")
                            .with_param("focus", json!("under_50")),
                        StageCommand::new("analyst_technical", "GENERATE_SIGNALS"),
                    ],
                },
                CycleStage {
                    name: "research".to_string(),
                    commands: vec![StageCommand::new("research_lead", "DEBATE_CANDIDATES")],
                },
                CycleStage {
                    name: "risk".to_string(),
                    commands: vec![StageCommand::new("risk_manager", "VALIDATE_PORTFOLIO")],
                },
            ],
        }
    }
}

impl OrchestratorConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

/// State the orchestrator accumulates between cycles
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradingState {
    pub positions: HashMap<String, Value>,
    pub pending_signals: Vec<Payload>,
    pub risk_alerts: usize,
    pub market_regime: Option<String>,
}

/// How one stage of a cycle went
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub name: String,
    /// Ids of the commands sent in this stage
    pub commands: Vec<String>,
    pub acknowledged: usize,
    pub timed_out: bool,
}

/// Result of `coordinate_cycle`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub stages: Vec<StageOutcome>,
}

impl CycleReport {
    pub fn completed(&self) -> bool {
        self.stages.iter().all(|s| !s.timed_out)
    }
}

/// Executive agent coordinating the specialist teams
pub struct Orchestrator {
    core: AgentCore,
    config: OrchestratorConfig,
    state: RwLock<TradingState>,
    completions: CompletionTracker,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            core: AgentCore::new(config.agent_id.clone(), AgentRole::Orchestrator),
            config,
            state: RwLock::new(TradingState::default()),
            completions: CompletionTracker::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn state(&self) -> TradingState {
        self.state.read().await.clone()
    }

    pub async fn set_market_regime(&self, regime: impl Into<String>) {
        self.state.write().await.market_regime = Some(regime.into());
    }

    pub async fn record_position(&self, symbol: impl Into<String>, position: Value) {
        self.state.write().await.positions.insert(symbol.into(), position);
    }

    /// Mean `confidence` over every ANALYSIS ever received. A missing or
    /// non-numeric confidence counts as zero; no analyses gives zero.
    pub async fn average_confidence(&self) -> f64 {
        let analyses = self.core.messages_of(MessageType::Analysis).await;
        let total: f64 = analyses
            .iter()
            .map(|m| m.payload_f64("confidence").unwrap_or(0.0))
            .sum();
        total / analyses.len().max(1) as f64
    }

    /// Run every configured stage in order. Each stage's commands are sent
    /// together, then the stage waits until all of them are acknowledged
    /// or the stage timeout passes.
    ///
    /// Acknowledgements arrive through the bus, so this must not be awaited
    /// from inside a delivery on the same bus.
    pub async fn coordinate_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let timeout = self.config.stage_timeout();
        let mut stages = Vec::with_capacity(self.config.stages.len());

        info!(parent: self.core.span(), %cycle_id, "Starting coordination cycle");

        for stage in &self.config.stages {
            let mut commands = Vec::with_capacity(stage.commands.len());
            for command in &stage.commands {
                let mut payload = command.params.clone();
                payload.insert("command".to_string(), json!(command.command));
                payload.insert("cycle_id".to_string(), json!(cycle_id));
                let message = self.core.compose(
                    command.recipient.as_str(),
                    MessageType::Command,
                    payload,
                    MessagePriority::new(command.priority),
                );

                // Tracked before sending so a fast ack is never missed
                self.completions.expect(message.id());
                commands.push(message.id().to_string());
                if let Err(e) = self.core.dispatch(message) {
                    self.completions.forget(&commands);
                    return Err(e.into());
                }
            }

            let completion = self.completions.wait_for(&commands, timeout).await;
            if completion.timed_out {
                warn!(
                    parent: self.core.span(),
                    %cycle_id,
                    stage = %stage.name,
                    missing = ?completion.missing,
                    "Stage timed out waiting for acknowledgements"
                );
            } else {
                debug!(parent: self.core.span(), %cycle_id, stage = %stage.name, "Stage complete");
            }

            stages.push(StageOutcome {
                name: stage.name.clone(),
                commands,
                acknowledged: completion.acknowledged,
                timed_out: completion.timed_out,
            });
        }

        let report = CycleReport { cycle_id, stages };
        info!(
            parent: self.core.span(),
            %cycle_id,
            completed = report.completed(),
            "Coordination cycle finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn reason(&self, observation: &str) -> Result<String> {
        let analyses = self.core.messages_of(MessageType::Analysis).await;
        let recent = analyses.len().min(self.config.analysis_window);
        let state = self.state.read().await;
        let regime = state.market_regime.as_deref().unwrap_or("unknown");

        Ok(format!(
            "Based on {} recent analyses:\n\
             - Market regime: {}\n\
             - Open positions: {}\n\
             - Pending signals: {}\n\
             Observation: {}\n\
             Must coordinate: analyst valuations -> research debate -> trader execution with risk oversight",
            recent,
            regime,
            state.positions.len(),
            state.pending_signals.len(),
            observation
        ))
    }

    async fn decide_action(&self, reasoning: &str) -> Result<Option<Message>> {
        let confidence = self.average_confidence().await;
        if confidence <= self.config.confidence_threshold {
            debug!(parent: self.core.span(), confidence, "Confidence below threshold, holding");
            return Ok(None);
        }

        let mut payload = Payload::new();
        payload.insert("command".to_string(), json!(EVALUATE_COMMAND));
        payload.insert("confidence".to_string(), json!(confidence));
        payload.insert("context".to_string(), json!(reasoning));

        Ok(Some(self.core.compose(
            self.config.command_recipient.clone(),
            MessageType::Command,
            payload,
            MessagePriority::new(self.config.command_priority),
        )))
    }

    async fn receive_message(&self, message: Message) -> Result<()> {
        self.core.remember(message.clone()).await;

        match message.msg_type() {
            MessageType::Response => {
                if let Some(command_id) = message.payload_str("ack") {
                    if self.completions.acknowledge(command_id) {
                        debug!(parent: self.core.span(), command_id, from = %message.sender(), "Command acknowledged");
                    } else {
                        debug!(parent: self.core.span(), command_id, from = %message.sender(), "Ignoring acknowledgement nobody is waiting on");
                    }
                }
            }
            MessageType::TradeSignal => {
                self.state.write().await.pending_signals.push(message.payload().clone());
            }
            MessageType::RiskAlert => {
                let mut state = self.state.write().await;
                state.risk_alerts += 1;
                warn!(parent: self.core.span(), from = %message.sender(), total = state.risk_alerts, "Risk alert received");
            }
            _ => {}
        }
        Ok(())
    }
}
