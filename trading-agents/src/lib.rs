//! Trading Agents - multi-agent coordination substrate
//!
//! This crate wires a team of trading agents together over an in-process
//! message bus. It includes:
//! - A priority message bus with direct and broadcast routing
//! - The base Agent trait implementing the ReAct think/act loop
//! - An Orchestrator that gates trader commands on analyst confidence and
//!   drives staged coordination cycles
//! - A research team lead that debates candidates and scores conviction
//! - Bull and bear researchers

pub mod agent;
pub mod bus;
pub mod config;
pub mod coordination;
pub mod debate;
pub mod error;
pub mod orchestrator;
pub mod research;
pub mod researchers;
pub mod telemetry;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use agent::{Agent, AgentCore, ReasoningStep};
pub use bus::{BusHandle, BusStats, DispatchMode, MessageBus, MessageBusConfig};
pub use config::{load_config, save_config, SystemConfig};
pub use coordination::{Completion, CompletionTracker};
pub use debate::{
    classify, confidence, conviction_score, rank_reports, CaseGenerator, DebateCases,
    RandomCaseGenerator, Recommendation, ResearchReport,
};
pub use error::{AgentError, BusError, ConfigError};
pub use orchestrator::{CycleReport, CycleStage, Orchestrator, OrchestratorConfig, StageCommand, StageOutcome, TradingState};
pub use research::{ResearchConfig, ResearchDebateCoordinator};
pub use researchers::{DebateResearcher, Stance};

// Re-export common types for convenience
pub use common::{AgentRole, Message, MessagePriority, MessageType, Payload, BROADCAST};
