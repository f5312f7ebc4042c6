//! Validation gate: lint, then build, then test, stopping at the first failure
//!
//! Stage commands come from config or are detected from the project's
//! marker files. A stage with no command counts as a pass.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::{StageSetting, ValidationConfig};

/// One validation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lint,
    Build,
    Test,
}

impl Stage {
    /// Gate order
    pub const ALL: [Stage; 3] = [Stage::Lint, Stage::Build, Stage::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lint => "lint",
            Stage::Build => "build",
            Stage::Test => "test",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a stage command reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub success: bool,
    /// stdout followed by stderr
    pub output: String,
    /// None when the process was killed or never started
    pub exit_code: Option<i32>,
}

/// Result of running the whole gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
    /// Stages that ran and passed
    pub passed: Vec<Stage>,
    /// Stages with no command
    pub skipped: Vec<Stage>,
    /// The stage that stopped the gate, with its output
    pub failed: Option<(Stage, StageOutput)>,
}

impl GateResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Something that can run the validation stages
#[async_trait]
pub trait Validator: Send + Sync {
    /// Run one stage; `None` means the stage is not configured
    async fn run_stage(&self, stage: Stage) -> Option<StageOutput>;

    /// Run lint, build and test in order, stopping at the first failure
    async fn validate(&self) -> GateResult {
        let mut result = GateResult {
            passed: Vec::new(),
            skipped: Vec::new(),
            failed: None,
        };

        for stage in Stage::ALL {
            match self.run_stage(stage).await {
                None => {
                    tracing::debug!(%stage, "Stage not configured, skipping");
                    result.skipped.push(stage);
                }
                Some(output) if output.success => {
                    tracing::debug!(%stage, "Stage passed");
                    result.passed.push(stage);
                }
                Some(output) => {
                    tracing::info!(%stage, exit_code = ?output.exit_code, "Stage failed");
                    result.failed = Some((stage, output));
                    break;
                }
            }
        }

        result
    }
}

/// Project type, detected from marker files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Cargo,
    Go,
    Node,
    Python,
}

impl ProjectKind {
    /// Detect the project kind from files in the given directory
    pub fn detect(path: &Path) -> Option<Self> {
        if path.join("Cargo.toml").exists() {
            return Some(Self::Cargo);
        }

        if path.join("go.mod").exists() {
            return Some(Self::Go);
        }

        if path.join("pyproject.toml").exists()
            || path.join("setup.py").exists()
            || path.join("setup.cfg").exists()
            || path.join("requirements.txt").exists()
            || path.join("pytest.ini").exists()
        {
            return Some(Self::Python);
        }

        if path.join("package.json").exists() {
            return Some(Self::Node);
        }

        None
    }

    /// Default command for a stage, if this kind of project has one
    pub fn default_command(&self, stage: Stage, root: &Path) -> Option<Vec<String>> {
        let argv = |args: &[&str]| -> Option<Vec<String>> {
            Some(args.iter().map(|a| a.to_string()).collect())
        };
        match (self, stage) {
            (Self::Cargo, Stage::Lint) => {
                argv(&["cargo", "clippy", "--all-targets", "--", "-D", "warnings"])
            }
            (Self::Cargo, Stage::Build) => argv(&["cargo", "build"]),
            (Self::Cargo, Stage::Test) => argv(&["cargo", "test"]),
            (Self::Go, Stage::Lint) => argv(&["go", "vet", "./..."]),
            (Self::Go, Stage::Build) => argv(&["go", "build", "./..."]),
            (Self::Go, Stage::Test) => argv(&["go", "test", "./..."]),
            (Self::Node, Stage::Lint) if has_npm_script(root, "lint") => {
                argv(&["npm", "run", "lint"])
            }
            (Self::Node, Stage::Build) if has_npm_script(root, "build") => {
                argv(&["npm", "run", "build"])
            }
            (Self::Node, Stage::Test) => argv(&["npm", "test"]),
            (Self::Python, Stage::Test) if has_pytest_config(root) => argv(&["pytest", "--tb=short"]),
            (Self::Python, Stage::Test) => argv(&["python", "-m", "unittest", "discover"]),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: std::collections::HashMap<String, String>,
}

fn has_npm_script(root: &Path, script: &str) -> bool {
    std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok())
        .is_some_and(|pkg| pkg.scripts.contains_key(script))
}

/// Check if the project configures pytest
fn has_pytest_config(root: &Path) -> bool {
    if root.join("pytest.ini").exists() || root.join("conftest.py").exists() {
        return true;
    }
    let mentions = |file: &str, marker: &str| {
        std::fs::read_to_string(root.join(file)).is_ok_and(|c| c.contains(marker))
    };
    mentions("pyproject.toml", "[tool.pytest") || mentions("setup.cfg", "[tool:pytest]")
}

/// Runs stage commands as subprocesses in the project root
#[derive(Debug, Clone)]
pub struct ValidationGate {
    root: PathBuf,
    kind: Option<ProjectKind>,
    lint: StageSetting,
    build: StageSetting,
    test: StageSetting,
    timeout: Option<Duration>,
}

impl ValidationGate {
    pub fn from_config(root: impl Into<PathBuf>, config: &ValidationConfig) -> Self {
        let root = root.into();
        let kind = ProjectKind::detect(&root);
        tracing::debug!(root = %root.display(), ?kind, "Validation gate configured");
        Self {
            root,
            kind,
            lint: config.lint.clone(),
            build: config.build.clone(),
            test: config.test.clone(),
            timeout: config.timeout,
        }
    }

    pub fn kind(&self) -> Option<ProjectKind> {
        self.kind
    }

    fn setting(&self, stage: Stage) -> &StageSetting {
        match stage {
            Stage::Lint => &self.lint,
            Stage::Build => &self.build,
            Stage::Test => &self.test,
        }
    }

    /// The command a stage would run, if any
    pub fn command_for(&self, stage: Stage) -> Option<Vec<String>> {
        let setting = self.setting(stage);
        if !setting.enabled {
            return None;
        }
        match setting.command {
            Some(ref cmd) if !cmd.is_empty() => Some(cmd.clone()),
            Some(_) => None,
            None => self.kind?.default_command(stage, &self.root),
        }
    }

    async fn execute(&self, argv: &[String]) -> StageOutput {
        let Some((program, args)) = argv.split_first() else {
            return StageOutput {
                success: true,
                output: String::new(),
                exit_code: Some(0),
            };
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = cmd.output();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    return StageOutput {
                        success: false,
                        output: format!("{} timed out after {:?}", argv.join(" "), limit),
                        exit_code: None,
                    };
                }
            },
            None => run.await,
        };

        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                StageOutput {
                    success: output.status.success(),
                    output: format!("{}\n{}", stdout, stderr),
                    exit_code: output.status.code(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StageOutput {
                success: false,
                output: format!("{}: command not found", program),
                exit_code: None,
            },
            Err(e) => StageOutput {
                success: false,
                output: format!("Failed to run {}: {}", program, e),
                exit_code: None,
            },
        }
    }
}

#[async_trait]
impl Validator for ValidationGate {
    async fn run_stage(&self, stage: Stage) -> Option<StageOutput> {
        let argv = self.command_for(stage)?;
        tracing::info!(%stage, command = %argv.join(" "), "Running validation stage");
        Some(self.execute(&argv).await)
    }
}
