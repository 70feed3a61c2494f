//! Research team lead - runs the structured debate over analyst candidates
//!
//! Reasoning picks candidate symbols out of the ANALYSIS messages seen so
//! far. Acting debates each candidate, ranks the reports by conviction and
//! publishes a single RESEARCH_REPORT broadcast.

use crate::agent::{Agent, AgentCore};
use crate::debate::{build_report, rank_reports, CaseGenerator, RandomCaseGenerator, ResearchReport};
use anyhow::Result;
use async_trait::async_trait;
use common::{AgentRole, Message, MessagePriority, MessageType, Payload, BROADCAST};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Command that triggers a debate pass
pub const DEBATE_COMMAND: &str = "DEBATE_CANDIDATES";

/// Research lead configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub agent_id: String,
    /// How many distinct symbols to debate per pass
    pub max_candidates: usize,
    /// |conviction| above this is a directional call
    pub conviction_threshold: f64,
    pub report_priority: u8,
    /// Fixed seed for case generation, for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            agent_id: "research_lead".to_string(),
            max_candidates: 5,
            conviction_threshold: 0.3,
            report_priority: 3,
            seed: None,
        }
    }
}

/// Distinct symbols referenced by ANALYSIS messages, in discovery order,
/// at most `limit` of them.
///
/// A payload names symbols through `symbol`, `data.symbol`,
/// `analyses[*].symbol` or `data.analyses[*].symbol`.
pub fn extract_candidates(memory: &[Message], limit: usize) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for message in memory.iter().filter(|m| m.msg_type() == MessageType::Analysis) {
        for symbol in payload_symbols(message.payload()) {
            if candidates.len() >= limit {
                return candidates;
            }
            if !candidates.iter().any(|c| c == symbol) {
                candidates.push(symbol.to_string());
            }
        }
    }

    candidates
}

fn payload_symbols(payload: &Payload) -> Vec<&str> {
    let mut symbols = Vec::new();
    collect_symbols(payload, &mut symbols);
    if let Some(Value::Object(data)) = payload.get("data") {
        collect_symbols(data, &mut symbols);
    }
    symbols
}

fn collect_symbols<'a>(object: &'a Payload, out: &mut Vec<&'a str>) {
    if let Some(symbol) = object.get("symbol").and_then(Value::as_str) {
        out.push(symbol);
    }
    if let Some(Value::Array(analyses)) = object.get("analyses") {
        out.extend(
            analyses
                .iter()
                .filter_map(|a| a.get("symbol").and_then(Value::as_str)),
        );
    }
}

/// Coordinates the bull/bear/neutral debate for candidate symbols
pub struct ResearchDebateCoordinator {
    core: AgentCore,
    config: ResearchConfig,
    generator: Box<dyn CaseGenerator>,
    candidates: RwLock<Vec<String>>,
    reports: RwLock<HashMap<String, ResearchReport>>,
}

impl ResearchDebateCoordinator {
    pub fn new(config: ResearchConfig) -> Self {
        let generator: Box<dyn CaseGenerator> = match config.seed {
            Some(seed) => Box::new(RandomCaseGenerator::with_seed(seed)),
            None => Box::new(RandomCaseGenerator::new()),
        };
        Self::with_generator(config, generator)
    }

    pub fn with_generator(config: ResearchConfig, generator: Box<dyn CaseGenerator>) -> Self {
        Self {
            core: AgentCore::new(config.agent_id.clone(), AgentRole::Research),
            config,
            generator,
            candidates: RwLock::new(Vec::new()),
            reports: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Candidates chosen by the last reasoning pass
    pub async fn candidates(&self) -> Vec<String> {
        self.candidates.read().await.clone()
    }

    /// Most recent report produced for `symbol`
    pub async fn latest_report(&self, symbol: &str) -> Option<ResearchReport> {
        self.reports.read().await.get(symbol).cloned()
    }

    /// Debate one symbol
    pub fn conduct_debate(&self, symbol: &str) -> ResearchReport {
        let cases = self.generator.generate(symbol);
        build_report(symbol, cases, self.config.conviction_threshold)
    }
}

#[async_trait]
impl Agent for ResearchDebateCoordinator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn reason(&self, observation: &str) -> Result<String> {
        let memory = self.core.memory().await;
        let candidates = extract_candidates(&memory, self.config.max_candidates);
        debug!(parent: self.core.span(), candidates = ?candidates, "Selected debate candidates");

        let reasoning = format!(
            "Research team reasoning:\n\
             - {} candidates identified from analyst reports\n\
             - Initiating structured debate: bullish vs bearish cases\n\
             - Will develop confidence-weighted recommendations\n\
             - Candidates: {:?}\n\
             - Trigger: {}",
            candidates.len(),
            candidates,
            observation
        );

        *self.candidates.write().await = candidates;
        Ok(reasoning)
    }

    async fn decide_action(&self, _reasoning: &str) -> Result<Option<Message>> {
        let candidates = self.candidates.read().await.clone();
        let mut reports: Vec<ResearchReport> = candidates
            .iter()
            .map(|symbol| self.conduct_debate(symbol))
            .collect();

        {
            let mut latest = self.reports.write().await;
            for report in &reports {
                latest.insert(report.symbol.clone(), report.clone());
            }
        }

        rank_reports(&mut reports);
        let top_pick = reports.first().map(|r| r.symbol.clone());

        info!(
            parent: self.core.span(),
            candidates = reports.len(),
            top_pick = ?top_pick,
            "Research debate complete"
        );

        let mut payload = Payload::new();
        payload.insert("reports".to_string(), serde_json::to_value(&reports)?);
        payload.insert("top_pick".to_string(), json!(top_pick));
        payload.insert("total_candidates".to_string(), json!(reports.len()));

        Ok(Some(self.core.compose(
            BROADCAST,
            MessageType::ResearchReport,
            payload,
            MessagePriority::new(self.config.report_priority),
        )))
    }

    async fn receive_message(&self, message: Message) -> Result<()> {
        let is_debate_command = message.msg_type() == MessageType::Command
            && message.payload_str("command") == Some(DEBATE_COMMAND);
        self.core.remember(message.clone()).await;

        if is_debate_command {
            let observation = format!("{} requested by {}", DEBATE_COMMAND, message.sender());
            let report_id = self.step(&observation).await?;

            let mut detail = Payload::new();
            detail.insert("status".to_string(), json!("completed"));
            detail.insert("report_id".to_string(), json!(report_id));
            self.core.acknowledge(&message, detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MessageBus, MessageBusConfig};
    use crate::debate::fixtures::cases;
    use crate::debate::{DebateCases, Recommendation};
    use std::sync::Arc;

    /// Fixed probabilities per symbol
    struct ScriptedCases(HashMap<&'static str, (f64, f64, usize, usize)>);

    impl CaseGenerator for ScriptedCases {
        fn generate(&self, symbol: &str) -> DebateCases {
            let (bull, bear, catalysts, risks) = self.0.get(symbol).copied().unwrap_or((0.5, 0.5, 2, 2));
            cases(bull, bear, catalysts, risks)
        }
    }

    fn analysis(sender: &str, payload: Value) -> Message {
        Message::new(
            sender,
            BROADCAST,
            MessageType::Analysis,
            payload.as_object().cloned().unwrap_or_default(),
            MessagePriority::NORMAL,
        )
    }

    fn lead(script: &[(&'static str, (f64, f64, usize, usize))]) -> Arc<ResearchDebateCoordinator> {
        Arc::new(ResearchDebateCoordinator::with_generator(
            ResearchConfig::default(),
            Box::new(ScriptedCases(script.iter().copied().collect())),
        ))
    }

    #[test]
    fn test_extract_candidates_dedupes_and_limits() {
        let memory = vec![
            analysis("a", json!({"data": {"analyses": [{"symbol": "AMD"}, {"symbol": "SOFI"}]}})),
            analysis("b", json!({"symbol": "AMD"})),
            analysis("c", json!({"analyses": [{"symbol": "PLTR"}, {"symbol": "F"}, {"symbol": "NIO"}, {"symbol": "RIVN"}]})),
            Message::new("d", "x", MessageType::Command, Payload::new(), MessagePriority::NORMAL),
        ];

        assert_eq!(
            extract_candidates(&memory, 5),
            vec!["AMD", "SOFI", "PLTR", "F", "NIO"]
        );
        assert_eq!(extract_candidates(&memory, 2), vec!["AMD", "SOFI"]);
        assert!(extract_candidates(&[], 5).is_empty());
    }

    #[tokio::test]
    async fn test_report_is_ranked_by_conviction() {
        let lead = lead(&[
            ("LOW", (0.5, 0.45, 2, 2)),
            ("HIGH", (0.6, 0.2, 3, 3)),
            ("BEAR", (0.5, 0.66, 2, 3)),
        ]);
        for symbol in ["LOW", "HIGH", "BEAR"] {
            lead.core.remember(analysis("analyst", json!({"data": {"symbol": symbol}}))).await;
        }

        let reasoning = lead.think("cycle").await.unwrap();
        assert!(reasoning.contains("3 candidates"));
        let message = lead.act(&reasoning).await.unwrap().unwrap();

        assert_eq!(message.msg_type(), MessageType::ResearchReport);
        assert!(message.is_broadcast());
        assert_eq!(message.priority().value(), 3);
        assert_eq!(message.payload_str("top_pick"), Some("HIGH"));
        assert_eq!(message.payload()["total_candidates"], 3);

        let reports: Vec<ResearchReport> =
            serde_json::from_value(message.payload()["reports"].clone()).unwrap();
        let order: Vec<&str> = reports.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["HIGH", "BEAR", "LOW"]);
        assert_eq!(reports[0].recommendation, Recommendation::Bullish);
        assert_eq!(reports[1].recommendation, Recommendation::Bearish);
        assert_eq!(reports[2].recommendation, Recommendation::Neutral);
        assert!((reports[0].confidence - 0.9).abs() < 1e-12);

        let stored = lead.latest_report("BEAR").await.unwrap();
        assert_eq!(stored.recommendation, Recommendation::Bearish);
    }

    #[tokio::test]
    async fn test_no_candidates_emits_empty_report() {
        let lead = lead(&[]);
        let reasoning = lead.think("nothing yet").await.unwrap();
        let message = lead.act(&reasoning).await.unwrap().unwrap();

        assert_eq!(message.payload()["reports"], json!([]));
        assert_eq!(message.payload()["top_pick"], Value::Null);
        assert_eq!(message.payload()["total_candidates"], 0);
    }

    #[tokio::test]
    async fn test_debate_command_publishes_and_acknowledges() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let lead = lead(&[("AMD", (0.6, 0.3, 2, 2))]);
        lead.clone().connect_bus(&bus).unwrap();
        bus.subscribe("research_lead", MessageType::Analysis);

        let boss = Arc::new(crate::testing::Inbox::new("orchestrator"));
        boss.clone().connect_bus(&bus).unwrap();
        bus.subscribe("orchestrator", MessageType::ResearchReport);

        bus.send(analysis("analyst_technical", json!({"symbol": "AMD"})));
        let mut payload = Payload::new();
        payload.insert("command".to_string(), json!(DEBATE_COMMAND));
        let command = Message::new("orchestrator", "research_lead", MessageType::Command, payload, MessagePriority::NORMAL);
        let command_id = command.id().to_string();
        bus.send(command);
        bus.dispatch_pending().await;

        let memory = boss.core().memory().await;
        let report = memory
            .iter()
            .find(|m| m.msg_type() == MessageType::ResearchReport)
            .unwrap();
        assert_eq!(report.payload_str("top_pick"), Some("AMD"));

        let ack = memory
            .iter()
            .find(|m| m.msg_type() == MessageType::Response)
            .unwrap();
        assert_eq!(ack.payload_str("ack"), Some(command_id.as_str()));
        assert_eq!(ack.payload_str("report_id"), Some(report.id()));
    }
}
