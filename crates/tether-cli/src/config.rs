//! CLI configuration file: the engine table plus demo knobs.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tether_core::{EngineConfig, Strategy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub server: ServerSettings,

    /// `engine.strategy`, only when the file actually sets it.
    #[serde(skip)]
    pub strategy: Option<Strategy>,
}

/// Knobs for the `server` demo's listen loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub max_iterations: u32,
    pub poll_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            poll_interval_ms: 500,
        }
    }
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        let table: toml::Table = text.parse()?;
        let explicit = table
            .get("engine")
            .and_then(|engine| engine.get("strategy"))
            .is_some();

        let mut config: CliConfig = toml::Value::Table(table).try_into()?;
        config.engine.validate()?;
        config.strategy = explicit.then_some(config.engine.strategy);
        Ok(config)
    }

    /// `--strategy` beats the config file, which beats the command default.
    pub fn resolve_strategy(&self, flag: Option<Strategy>, command_default: Strategy) -> Strategy {
        flag.or(self.strategy).unwrap_or(command_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_means_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.server.max_iterations, 10);
    }

    #[test]
    fn reads_engine_and_server_tables() {
        let config = CliConfig::parse(
            r#"
            [engine]
            strategy = "race"
            deadline_ms = 2000

            [server]
            max_iterations = 3
            poll_interval_ms = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.strategy, Strategy::Race);
        assert_eq!(config.engine.deadline_ms, Some(2000));
        assert_eq!(config.server.max_iterations, 3);
        assert_eq!(config.server.poll_interval_ms, 20);
    }

    #[test]
    fn explicit_default_strategy_overrides_the_command_default() {
        let config = CliConfig::parse("[engine]\nstrategy = \"sequential\"\n").unwrap();

        assert_eq!(config.strategy, Some(Strategy::Sequential));
        assert_eq!(
            config.resolve_strategy(None, Strategy::Parallel),
            Strategy::Sequential
        );
        assert_eq!(
            config.resolve_strategy(Some(Strategy::Race), Strategy::Parallel),
            Strategy::Race
        );
    }

    #[test]
    fn unset_strategy_falls_back_to_the_command_default() {
        let config = CliConfig::parse("[engine]\ndeadline_ms = 500\n").unwrap();

        assert_eq!(config.strategy, None);
        assert_eq!(
            config.resolve_strategy(None, Strategy::Parallel),
            Strategy::Parallel
        );
        assert_eq!(
            CliConfig::default().resolve_strategy(None, Strategy::Sequential),
            Strategy::Sequential
        );
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        assert!(CliConfig::parse("[engine]\ndeadline_ms = 0\n").is_err());
        assert!(CliConfig::parse("[engine]\nstrategy = \"roundrobin\"\n").is_err());
    }
}
