//! Fix command - Alternate council review with a fixing collaborator

use std::sync::Arc;

use clap::Args;
use council_core::fix::{AgentFixer, FixLoopConfig};
use council_core::{Backend, BudgetLedger, ClaudeBackend, Config, FixVerifyLoop, TracingProgress};

use super::review::print_outcome;
use super::{build_dispatcher, TargetArgs};

/// Arguments for the fix command
#[derive(Args, Debug)]
pub struct FixArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Iteration cap (overrides config)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Review only; never invoke the fixer or write files
    #[arg(long)]
    pub dry_run: bool,
}

impl FixArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (root, original) = self.target.load_snapshot()?;
        if original.is_empty() {
            println!("Nothing to fix.");
            return Ok(());
        }

        let dispatcher = build_dispatcher(config, &root, &self.target.only);
        let backend: Arc<dyn Backend> = Arc::new(ClaudeBackend::from_config(&config.agent).read_only());
        let mut fixer = AgentFixer::new(backend, &root);
        if let Some(timeout) = config.agent.timeout {
            fixer = fixer.with_timeout(timeout);
        }

        let dry_run = self.dry_run || config.fix.dry_run;
        let loop_config = FixLoopConfig {
            max_iterations: self.max_iterations.unwrap_or(config.fix.max_iterations),
            dry_run,
        };
        let mut ledger = BudgetLedger::new(config.budget.cap_units);

        let result = FixVerifyLoop::new(&dispatcher, &fixer, loop_config)
            .with_progress(Arc::new(TracingProgress))
            .run(original.clone(), &mut ledger)
            .await?;

        print_outcome(&result.outcome);
        println!();
        println!("Fixer calls: {}", result.fixer_calls);
        if result.unmatched_files > 0 {
            println!("Files the fixer did not return: {}", result.unmatched_files);
        }
        println!("Budget: {}", ledger.progress_bar(30));

        if dry_run {
            println!("[Dry run] No files written");
        } else {
            let written = result.snapshot.write_changes(&root, &original)?;
            println!("Files written: {}", written.len());
            for path in written {
                println!("  {}", path);
            }
        }

        Ok(())
    }
}
