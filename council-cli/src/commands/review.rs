//! Review command - Run the council once or until it converges

use clap::Args;
use std::sync::Arc;

use council_core::review::{render_markdown, DispatchMode, REPORT_FILE};
use council_core::{AggregatedOutcome, Config, ConvergenceLoop, TracingProgress};

use super::{build_dispatcher, TargetArgs};

/// Arguments for the review command
#[derive(Args, Debug)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Re-run the council until every reviewer passes
    #[arg(long = "loop")]
    pub converge: bool,

    /// Iteration cap for --loop (overrides config)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Run reviewers one after another
    #[arg(long)]
    pub sequential: bool,

    /// Write a markdown report into the working directory
    #[arg(long)]
    pub report: bool,
}

impl ReviewArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (root, snapshot) = self.target.load_snapshot()?;
        if snapshot.is_empty() {
            println!("Nothing to review.");
            return Ok(());
        }

        let dispatcher = build_dispatcher(config, &root, &self.target.only);
        let mode = if self.sequential || !config.review.parallel {
            DispatchMode::Sequential
        } else {
            DispatchMode::Parallel
        };

        let outcome = if self.converge {
            let max = self.max_iterations.unwrap_or(config.review.max_iterations);
            ConvergenceLoop::new(&dispatcher, max)
                .with_mode(mode)
                .with_progress(Arc::new(TracingProgress))
                .run(&snapshot)
                .await?
        } else {
            AggregatedOutcome::from_verdicts(dispatcher.run_all(&snapshot, mode).await?)
        };

        print_outcome(&outcome);

        if self.report {
            let path = root.join(REPORT_FILE);
            std::fs::write(&path, render_markdown(&outcome, &self.target.label()))?;
            println!();
            println!("Report written to {}", path.display());
        }

        if !outcome.is_all_passing() {
            anyhow::bail!("Review finished with status {}", outcome.overall_status);
        }
        Ok(())
    }
}

/// Print per-reviewer results and the overall status
pub fn print_outcome(outcome: &AggregatedOutcome) {
    println!("Council Review");
    println!("==============");
    println!();
    for verdict in &outcome.verdicts {
        println!(
            "{}: {} ({} issue(s))",
            verdict.collaborator(),
            verdict.status(),
            verdict.issues().len()
        );
        for issue in verdict.issues() {
            println!("  - {}", issue);
        }
    }
    println!();
    println!(
        "Overall: {}  (pass {}, warn {}, fail {}; {} issue(s))",
        outcome.overall_status, outcome.passed, outcome.warned, outcome.failed, outcome.total_issues
    );
    if let (Some(iterations), Some(max), Some(termination)) =
        (outcome.iterations, outcome.max_iterations, outcome.termination)
    {
        println!("Iterations: {} of {} ({})", iterations, max, termination);
    }
}
