//! Example usage of the trading agents
//!
//! This example demonstrates:
//! 1. Building the bus and registering the full agent roster
//! 2. Running one staged coordination cycle
//! 3. Letting the orchestrator decide whether to command the trader
//!
//! Pass a TOML config path as the first argument to override defaults.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use trading_agents::{
    load_config, telemetry, Agent, AgentCore, AgentRole, DebateResearcher, Message, MessageBus,
    MessageType, Orchestrator, Payload, ResearchDebateCoordinator, Stance, SystemConfig,
};

/// Answers its command with a canned analysis broadcast
struct ScriptedAnalyst {
    core: AgentCore,
    analysis_type: &'static str,
    symbols: &'static [&'static str],
    confidence: f64,
}

#[async_trait]
impl Agent for ScriptedAnalyst {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn receive_message(&self, message: Message) -> Result<()> {
        self.core.remember(message.clone()).await;
        if message.msg_type() == MessageType::Command {
            let analyses: Vec<_> = self.symbols.iter().map(|s| json!({"symbol": s})).collect();
            self.core.broadcast(
                self.analysis_type,
                json!({"analyses": analyses}),
                self.confidence,
            )?;
            self.core.acknowledge(&message, Payload::new())?;
        }
        Ok(())
    }
}

/// Stands in for the trader and risk desks: logs and acknowledges
struct Desk {
    core: AgentCore,
}

#[async_trait]
impl Agent for Desk {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn receive_message(&self, message: Message) -> Result<()> {
        info!(
            desk = %self.core.id(),
            msg_type = %message.msg_type(),
            from = %message.sender(),
            "📥 Desk received message"
        );
        self.core.remember(message.clone()).await;
        if message.msg_type() == MessageType::Command {
            let mut detail = Payload::new();
            detail.insert("status".to_string(), json!("approved"));
            self.core.acknowledge(&message, detail)?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("info")?;

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => SystemConfig::default(),
    };

    info!("🤖 Trading Agents - Debate Cycle Example");

    // Step 1: Bus and roster
    let bus = MessageBus::new(config.bus.clone());
    let orchestrator = Arc::new(Orchestrator::new(config.orchestrator.clone()));
    let research_lead = Arc::new(ResearchDebateCoordinator::new(config.research.clone()));
    let fundamental = Arc::new(ScriptedAnalyst {
        core: AgentCore::new("analyst_fundamental", AgentRole::Analyst),
        analysis_type: "valuation",
        symbols: &["SOFI", "F", "AMD"],
        confidence: 0.82,
    });
    let technical = Arc::new(ScriptedAnalyst {
        core: AgentCore::new("analyst_technical", AgentRole::Analyst),
        analysis_type: "technical_signals",
        symbols: &["AMD", "PLTR", "NIO", "RIVN"],
        confidence: 0.76,
    });
    let trader = Arc::new(Desk { core: AgentCore::new("trader_lead", AgentRole::Trader) });
    let risk = Arc::new(Desk { core: AgentCore::new("risk_manager", AgentRole::Risk) });

    orchestrator.clone().connect_bus(&bus)?;
    research_lead.clone().connect_bus(&bus)?;
    Arc::new(DebateResearcher::new(Stance::Bullish)).connect_bus(&bus)?;
    Arc::new(DebateResearcher::new(Stance::Bearish)).connect_bus(&bus)?;
    fundamental.connect_bus(&bus)?;
    technical.connect_bus(&bus)?;
    trader.clone().connect_bus(&bus)?;
    risk.connect_bus(&bus)?;

    let orchestrator_id = orchestrator.id().to_string();
    let lead_id = research_lead.id().to_string();
    bus.subscribe(&lead_id, MessageType::Analysis);
    for msg_type in [
        MessageType::Analysis,
        MessageType::ResearchReport,
        MessageType::TradeSignal,
        MessageType::RiskAlert,
    ] {
        bus.subscribe(&orchestrator_id, msg_type);
    }
    bus.subscribe("trader_lead", MessageType::ResearchReport);
    info!(agents = ?bus.agent_ids(), "✅ Roster registered");

    // Step 2: Dispatch loop
    let runner = tokio::spawn({
        let bus = bus.clone();
        async move { bus.run().await }
    });

    // Step 3: One coordination cycle
    let report = orchestrator.coordinate_cycle().await?;
    for stage in &report.stages {
        info!(
            stage = %stage.name,
            acknowledged = stage.acknowledged,
            timed_out = stage.timed_out,
            "📊 Stage finished"
        );
    }

    let published = orchestrator.core().messages_of(MessageType::ResearchReport).await;
    let top_pick = published.last().and_then(|m| m.payload_str("top_pick"));
    if let Some(top) = top_pick {
        if let Some(report) = research_lead.latest_report(top).await {
            info!(
                symbol = %report.symbol,
                recommendation = ?report.recommendation,
                conviction = report.conviction_score,
                confidence = report.confidence,
                "🔬 Top research pick"
            );
        }
    }

    // Step 4: Orchestrator decision
    let sent = orchestrator.step("coordination cycle complete").await?;
    info!(
        average_confidence = orchestrator.average_confidence().await,
        command_sent = sent.is_some(),
        "🎯 Orchestrator decision"
    );

    bus.stop();
    runner.await??;
    // Deliver whatever the loop left queued, including the decision
    bus.dispatch_pending().await;

    let stats = bus.stats();
    info!(
        enqueued = stats.enqueued,
        delivered = stats.delivered,
        dropped = stats.dropped,
        failed = stats.failed,
        trader_inbox = trader.core().memory_len().await,
        "👋 Shutting down"
    );
    Ok(())
}
