//! Apply command - Work through the correction queue one instruction at a time

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use council_core::fix::{AgentEditor, FsConventions};
use council_core::{
    Backend, BudgetLedger, ClaudeBackend, Config, FixPipeline, QueueStore, TracingProgress,
    ValidationGate,
};

use super::resolve;

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Working directory (defaults to current directory)
    #[arg(short = 'd', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Queue directory (overrides config)
    #[arg(long)]
    pub queue: Option<PathBuf>,

    /// Report what would run without invoking the editor or touching the queue
    #[arg(long)]
    pub dry_run: bool,
}

impl ApplyArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let workdir = resolve(&self.workdir)?;
        let queue_dir = self.queue.clone().unwrap_or_else(|| config.fix.queue_dir.clone());
        let store = QueueStore::new(workdir.join(queue_dir));

        let backend: Arc<dyn Backend> = Arc::new(ClaudeBackend::from_config(&config.agent).editing());
        let mut editor = AgentEditor::new(backend, &workdir);
        if let Some(timeout) = config.agent.timeout {
            editor = editor.with_timeout(timeout);
        }
        let gate = ValidationGate::from_config(&workdir, &config.validation);
        if let Some(kind) = gate.kind() {
            tracing::info!(project = ?kind, "Detected project kind");
        }
        let conventions = FsConventions::new(&workdir);
        let mut ledger = BudgetLedger::new(config.budget.cap_units);

        let report = FixPipeline::new(&store, &editor, &gate, &conventions)
            .with_dry_run(self.dry_run || config.fix.dry_run)
            .with_progress(Arc::new(TracingProgress))
            .run(&mut ledger)
            .await?;

        print!("{}", report.render());
        Ok(())
    }
}
