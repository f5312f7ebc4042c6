//! Plan command - Review once and persist a correction queue

use clap::Args;
use council_core::review::DispatchMode;
use council_core::{AggregatedOutcome, Config, CorrectionInstruction, QueueStore};

use super::{build_dispatcher, TargetArgs};

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Show the instructions without writing the queue
    #[arg(long)]
    pub dry_run: bool,
}

impl PlanArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (root, snapshot) = self.target.load_snapshot()?;
        if snapshot.is_empty() {
            println!("Nothing to review.");
            return Ok(());
        }

        let dispatcher = build_dispatcher(config, &root, &self.target.only);
        let verdicts = dispatcher.run_all(&snapshot, DispatchMode::Parallel).await?;
        let outcome = AggregatedOutcome::from_verdicts(verdicts);

        let instructions = plan_instructions(&outcome);
        println!(
            "Council status: {} ({} issue(s))",
            outcome.overall_status, outcome.total_issues
        );

        if instructions.is_empty() {
            println!("No corrections to queue.");
            return Ok(());
        }

        if self.dry_run {
            for instruction in &instructions {
                println!(
                    "[{}] {}: {}",
                    instruction.priority(),
                    instruction.category(),
                    instruction.instruction()
                );
            }
            println!("[Dry run] {} instruction(s) not queued", instructions.len());
            return Ok(());
        }

        let store = QueueStore::new(root.join(&config.fix.queue_dir));
        let ids = store.enqueue(instructions)?;
        println!("Queued {} instruction(s) in {}", ids.len(), store.pending_dir().display());
        Ok(())
    }
}

/// One instruction per reported issue
fn plan_instructions(outcome: &AggregatedOutcome) -> Vec<CorrectionInstruction> {
    outcome
        .verdicts
        .iter()
        .flat_map(|verdict| {
            verdict
                .issues()
                .iter()
                .map(|issue| CorrectionInstruction::from_issue(issue, verdict.collaborator()))
        })
        .collect()
}
