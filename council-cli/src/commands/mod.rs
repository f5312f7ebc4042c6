//! CLI command implementations

pub mod apply;
pub mod fix;
pub mod plan;
pub mod review;

pub use apply::ApplyArgs;
pub use fix::FixArgs;
pub use plan::PlanArgs;
pub use review::ReviewArgs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use council_core::review::AgentReviewer;
use council_core::{
    Backend, ClaudeBackend, Config, FileSnapshot, GitRepo, Persona, ReviewDispatcher,
    TracingProgress,
};

/// Files to review, shared by the review-driven commands
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Files to review, relative to the working directory
    /// (defaults to files changed in the git working tree)
    pub paths: Vec<String>,

    /// Working directory (defaults to current directory)
    #[arg(short = 'd', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Only run these reviewers (qa, architect, librarian, warden)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<Persona>,
}

impl TargetArgs {
    /// Absolute working directory
    pub fn resolve_workdir(&self) -> anyhow::Result<PathBuf> {
        resolve(&self.workdir)
    }

    /// Load the snapshot to review, plus the root its paths are relative to
    pub fn load_snapshot(&self) -> anyhow::Result<(PathBuf, FileSnapshot)> {
        let workdir = self.resolve_workdir()?;
        if !self.paths.is_empty() {
            let snapshot = FileSnapshot::load(&workdir, &self.paths);
            return Ok((workdir, snapshot));
        }

        let repo = GitRepo::open(&workdir)?;
        let changed = repo.changed_files()?;
        tracing::info!(files = changed.len(), root = %repo.root().display(), "Using changed files");
        let root = repo.root().to_path_buf();
        let snapshot = FileSnapshot::load(&root, &changed);
        Ok((root, snapshot))
    }

    /// A human label for report headers
    pub fn label(&self) -> String {
        if self.paths.is_empty() {
            "working tree changes".to_string()
        } else {
            self.paths.join(", ")
        }
    }
}

/// Resolve a possibly relative path against the current directory
pub fn resolve(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Register the built-in council with config-driven enablement
pub fn build_dispatcher(config: &Config, workdir: &Path, only: &[Persona]) -> ReviewDispatcher {
    let backend: Arc<dyn Backend> = Arc::new(ClaudeBackend::from_config(&config.agent).read_only());

    let mut dispatcher = ReviewDispatcher::new()
        .with_timeout(config.review.timeout)
        .with_progress(Arc::new(TracingProgress));

    for persona in Persona::ALL {
        dispatcher.register(Arc::new(AgentReviewer::new(persona, backend.clone(), workdir)));
        let enabled = config.review.is_enabled(persona.name())
            && (only.is_empty() || only.contains(&persona));
        dispatcher.set_enabled(persona.name(), enabled);
    }
    dispatcher
}
