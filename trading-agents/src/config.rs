//! System configuration

use crate::bus::MessageBusConfig;
use crate::error::ConfigError;
use crate::orchestrator::OrchestratorConfig;
use crate::research::ResearchConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one bus and its coordinating agents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub bus: MessageBusConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub research: ResearchConfig,
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<SystemConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Save configuration to TOML file
pub fn save_config(config: &SystemConfig, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DispatchMode;

    #[test]
    fn test_default_config() {
        let config = SystemConfig::default();
        assert_eq!(config.bus.poll_interval_ms, 1000);
        assert_eq!(config.orchestrator.confidence_threshold, 0.7);
        assert_eq!(config.orchestrator.stages.len(), 3);
        assert_eq!(config.research.max_candidates, 5);
    }

    #[test]
    fn test_config_serialization() {
        let config = SystemConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: SystemConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.orchestrator.stages, deserialized.orchestrator.stages);
        assert_eq!(config.bus.dispatch, deserialized.bus.dispatch);
        assert_eq!(config.research.conviction_threshold, deserialized.research.conviction_threshold);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: SystemConfig = toml::from_str(
            r#"
            [bus]
            name = "desk"
            poll_interval_ms = 250
            dispatch = { mode = "worker_pool", max_in_flight = 4 }
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.dispatch, DispatchMode::WorkerPool { max_in_flight: 4 });
        assert_eq!(config.orchestrator.command_recipient, "trader_lead");
        assert_eq!(config.research.seed, None);
    }

    #[test]
    fn test_partial_tables_keep_remaining_defaults() {
        let config: SystemConfig = toml::from_str(
            r#"
            [bus]
            poll_interval_ms = 250

            [orchestrator]
            stage_timeout_ms = 500

            [research]
            max_candidates = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.name, "message-bus");
        assert_eq!(config.bus.poll_interval_ms, 250);
        assert_eq!(config.orchestrator.stage_timeout_ms, 500);
        assert_eq!(config.orchestrator.confidence_threshold, 0.7);
        assert_eq!(config.orchestrator.stages.len(), 3);
        assert_eq!(config.research.max_candidates, 3);
        assert_eq!(config.research.agent_id, "research_lead");
        assert_eq!(config.research.conviction_threshold, 0.3);
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("system-config-{}.toml", uuid::Uuid::new_v4()));
        let mut config = SystemConfig::default();
        config.research.seed = Some(7);

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.research.seed, Some(7));
        assert_eq!(loaded.orchestrator.agent_id, "orchestrator");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_config("/nonexistent/agents.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == "/nonexistent/agents.toml"));
    }
}
