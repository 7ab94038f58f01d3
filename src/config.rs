//! YAML configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MAX_FEEDBACK_LOOPS: u32 = 3;
pub const MAX_FEEDBACK_LOOPS_LIMIT: u32 = 10;
pub const DEFAULT_APPROVAL_MARKER: &str = "approved response accepted";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config validation failed: {0}")]
    Invalid(String),
}

/// What the runner does when a requirement fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the document at the first failure
    #[default]
    Stop,
    /// Skip the failing unit and continue with later units
    SkipUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Translate/review rounds before the fluency pass is forced (1..=10)
    pub max_feedback_loops: u32,
    /// Review text containing this marker approves the translation
    pub approval_marker: String,
    pub target_language: String,
    pub on_error: ErrorPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_feedback_loops: DEFAULT_MAX_FEEDBACK_LOOPS,
            approval_marker: DEFAULT_APPROVAL_MARKER.to_string(),
            target_language: "English".to_string(),
            on_error: ErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Command that reads a prompt on stdin and writes the reply to stdout
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path; the platform data directory when unset
    pub database: Option<PathBuf>,
    pub log_level: String,
    pub workflow: WorkflowConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            log_level: "info".to_string(),
            workflow: WorkflowConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw, &path.display().to_string())
    }

    /// Parse and validate YAML; `origin` names the source in errors.
    pub fn from_yaml_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Config = if raw.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: origin.to_string(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let loops = self.workflow.max_feedback_loops;
        if !(1..=MAX_FEEDBACK_LOOPS_LIMIT).contains(&loops) {
            return Err(ConfigError::Invalid(format!(
                "workflow.max_feedback_loops must be between 1 and {}, got {}",
                MAX_FEEDBACK_LOOPS_LIMIT, loops
            )));
        }
        if self.workflow.approval_marker.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.approval_marker must not be empty".to_string()));
        }
        if self.workflow.target_language.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.target_language must not be empty".to_string()));
        }
        if tracing::Level::from_str(&self.log_level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "log_level `{}` is not one of trace, debug, info, warn, error",
                self.log_level
            )));
        }
        if let Some(command) = &self.llm.command {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("llm.command must not be empty when set".to_string()));
            }
        }
        Ok(())
    }

    pub fn tracing_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = Config::from_yaml_str("", "inline").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.workflow.max_feedback_loops, 3);
        assert_eq!(config.workflow.approval_marker, DEFAULT_APPROVAL_MARKER);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml_str(
            "workflow:\n  max_feedback_loops: 5\n  on_error: skip_unit\nllm:\n  command: ollama\n  args: [run, qwen]\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.workflow.max_feedback_loops, 5);
        assert_eq!(config.workflow.on_error, ErrorPolicy::SkipUnit);
        assert_eq!(config.workflow.target_language, "English");
        assert_eq!(config.llm.args, vec!["run", "qwen"]);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn feedback_loop_bound_is_validated() {
        for bad in ["0", "11"] {
            let raw = format!("workflow:\n  max_feedback_loops: {}\n", bad);
            let err = Config::from_yaml_str(&raw, "inline").unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{} should be rejected", bad);
        }
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = Config::from_yaml_str("log_level: loud\n", "inline").unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn invalid_yaml_names_its_origin() {
        let err = Config::from_yaml_str("workflow: [", "lorekeep.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "lorekeep.yaml"));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lorekeep.yaml");
        std::fs::write(&path, "log_level: debug\n").unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);

        let missing = Config::from_path(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
