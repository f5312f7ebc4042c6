//! Configuration management for Council
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (COUNCIL_*)
//! 3. Config file (~/.config/council/config.toml)
//! 4. Default values

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Agent-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Path to the claude executable
    pub claude_path: String,

    /// Model to use for Claude
    pub model: Option<String>,

    /// Timeout for a single agent invocation
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Pass --dangerously-skip-permissions to the agent
    pub skip_permissions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None, // Let claude use its default
            timeout: Some(Duration::from_secs(600)),
            skip_permissions: true,
        }
    }
}

/// Per-collaborator settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub enabled: bool,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Review dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Dispatch reviewers concurrently
    pub parallel: bool,

    /// Iteration cap for the review-only convergence loop
    pub max_iterations: u32,

    /// Timeout for a single reviewer
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Per-collaborator overrides, keyed by collaborator name
    pub collaborators: HashMap<String, CollaboratorConfig>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_iterations: 3,
            timeout: None,
            collaborators: HashMap::new(),
        }
    }
}

impl ReviewConfig {
    /// Whether the named collaborator is enabled (unlisted names are enabled)
    pub fn is_enabled(&self, name: &str) -> bool {
        self.collaborators
            .get(name)
            .map(|c| c.enabled)
            .unwrap_or(true)
    }
}

/// Fix loop and fix pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FixConfig {
    /// Iteration cap for the fix-verify loop
    pub max_iterations: u32,

    /// Skip invoking the fixing collaborator
    pub dry_run: bool,

    /// Root of the persisted correction queue (relative to the workdir)
    pub queue_dir: PathBuf,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            dry_run: false,
            queue_dir: PathBuf::from(".council/fixes"),
        }
    }
}

/// Settings for one validation stage
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StageSetting {
    pub enabled: bool,

    /// Explicit command; detected from the project when absent
    pub command: Option<Vec<String>>,
}

impl Default for StageSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }
}

/// Validation gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub lint: StageSetting,
    pub build: StageSetting,
    pub test: StageSetting,

    /// Timeout for each stage command
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            lint: StageSetting::default(),
            build: StageSetting::default(),
            test: StageSetting::default(),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Budget ledger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Cap on consumed units (tokens) for one run
    pub cap_units: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cap_units: 2_000_000,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub review: ReviewConfig,
    pub fix: FixConfig,
    pub validation: ValidationConfig,
    pub budget: BudgetConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/council/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("council").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - COUNCIL_CLAUDE_PATH: Path to claude executable
    /// - COUNCIL_MODEL: Model to use
    /// - COUNCIL_MAX_ITERATIONS: Iteration cap for both loops
    /// - COUNCIL_BUDGET: Budget cap in units
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(claude_path) = std::env::var("COUNCIL_CLAUDE_PATH") {
            self.agent.claude_path = claude_path;
        }

        if let Ok(model) = std::env::var("COUNCIL_MODEL") {
            self.agent.model = Some(model);
        }

        if let Ok(raw) = std::env::var("COUNCIL_MAX_ITERATIONS") {
            let max: u32 = raw.parse().map_err(|_| {
                Error::Config(format!("COUNCIL_MAX_ITERATIONS is not a number: {}", raw))
            })?;
            self.review.max_iterations = max;
            self.fix.max_iterations = max;
        }

        if let Ok(raw) = std::env::var("COUNCIL_BUDGET") {
            self.budget.cap_units = raw
                .parse()
                .map_err(|_| Error::Config(format!("COUNCIL_BUDGET is not a number: {}", raw)))?;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(path) = overrides.claude_path {
            self.agent.claude_path = path;
        }

        if let Some(m) = overrides.model {
            self.agent.model = Some(m);
        }

        if let Some(cap) = overrides.budget {
            self.budget.cap_units = cap;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(config_path: Option<&Path>, overrides: CliOverrides) -> Result<Self> {
        let base = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };
        Ok(base.with_env_overrides()?.with_cli_overrides(overrides))
    }
}

/// Values passed on the command line that override the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub claude_path: Option<String>,
    pub model: Option<String>,
    pub budget: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.claude_path, "claude");
        assert!(config.agent.model.is_none());
        assert!(config.review.parallel);
        assert_eq!(config.review.max_iterations, 3);
        assert_eq!(config.fix.max_iterations, 5);
        assert_eq!(config.fix.queue_dir, PathBuf::from(".council/fixes"));
        assert!(config.validation.lint.enabled);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(CliOverrides {
            claude_path: Some("/custom/claude".to_string()),
            model: Some("opus".to_string()),
            budget: Some(500),
        });

        assert_eq!(config.agent.claude_path, "/custom/claude");
        assert_eq!(config.agent.model, Some("opus".to_string()));
        assert_eq!(config.budget.cap_units, 500);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[agent]
claude_path = "/usr/local/bin/claude"
timeout = "2m"

[review]
parallel = false
max_iterations = 4

[review.collaborators.librarian]
enabled = false

[validation.test]
command = ["npm", "test"]

[validation.lint]
enabled = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.claude_path, "/usr/local/bin/claude");
        assert_eq!(config.agent.timeout, Some(Duration::from_secs(120)));
        assert!(!config.review.parallel);
        assert_eq!(config.review.max_iterations, 4);
        assert!(!config.review.is_enabled("librarian"));
        assert!(config.review.is_enabled("qa"));
        assert_eq!(
            config.validation.test.command,
            Some(vec!["npm".to_string(), "test".to_string()])
        );
        assert!(!config.validation.lint.enabled);
        assert!(config.validation.build.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[budget]
cap_units = 1000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        // everything else should use defaults
        assert_eq!(config.agent.claude_path, "claude");
        assert_eq!(config.budget.cap_units, 1000);
        assert_eq!(config.fix.max_iterations, 5);
    }

    #[test]
    fn test_load_from_file_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[review\nparallel = ").unwrap();
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
