//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Strategy;
use crate::error::TetherError;

const MIN_WORKER_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Strategy for contexts built from this config.
    pub strategy: Strategy,

    /// Optional deadline for one execution, in milliseconds.
    pub deadline_ms: Option<u64>,

    /// Worker threads are named `{prefix}-{index}`.
    pub worker_name_prefix: String,

    /// Stack size for worker threads (platform default when unset).
    pub worker_stack_size: Option<usize>,

    /// Whether the process entry point should install the signal bridge.
    pub install_signal_bridge: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sequential,
            deadline_ms: None,
            worker_name_prefix: "tether-worker".to_string(),
            worker_stack_size: None,
            install_signal_bridge: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TetherError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TetherError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, TetherError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| TetherError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TetherError> {
        if self.worker_name_prefix.trim().is_empty() {
            return Err(TetherError::Config(
                "worker_name_prefix must not be empty".to_string(),
            ));
        }
        if self.deadline_ms == Some(0) {
            return Err(TetherError::Config(
                "deadline_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(size) = self.worker_stack_size
            && size < MIN_WORKER_STACK_SIZE
        {
            return Err(TetherError::Config(format!(
                "worker_stack_size must be at least {MIN_WORKER_STACK_SIZE} bytes (got {size})"
            )));
        }
        Ok(())
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            deadline: self.deadline_ms.map(Duration::from_millis),
            worker_name_prefix: self.worker_name_prefix.clone(),
            worker_stack_size: self.worker_stack_size,
        }
    }
}

/// Per-context knobs the executor reads while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub deadline: Option<Duration>,
    pub worker_name_prefix: String,
    pub worker_stack_size: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        EngineConfig::default().execution_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.execution_options().deadline, None);
    }

    #[test]
    fn parses_every_field() {
        let config = EngineConfig::from_toml_str(
            r#"
            strategy = "race"
            deadline_ms = 1500
            worker_name_prefix = "srv"
            worker_stack_size = 65536
            install_signal_bridge = false
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, Strategy::Race);
        assert!(!config.install_signal_bridge);
        let options = config.execution_options();
        assert_eq!(options.deadline, Some(Duration::from_millis(1500)));
        assert_eq!(options.worker_name_prefix, "srv");
        assert_eq!(options.worker_stack_size, Some(65536));
    }

    #[test]
    fn unknown_strategy_is_a_config_error() {
        let err = EngineConfig::from_toml_str(r#"strategy = "fastest""#).unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("threads = 4").unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[test]
    fn validation_rejects_nonsense() {
        for text in [
            "deadline_ms = 0",
            r#"worker_name_prefix = "  ""#,
            "worker_stack_size = 1024",
        ] {
            assert!(EngineConfig::from_toml_str(text).is_err(), "{text}");
        }
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
