//! Review-only convergence loop
//!
//! Dispatches and aggregates until every verdict passes or the iteration cap
//! is reached. Nothing changes the snapshot between iterations, so this loop
//! only converges when the reviewers themselves settle.

use std::sync::Arc;

use crate::progress::{ProgressEvent, ProgressSink};
use crate::snapshot::FileSnapshot;
use crate::Result;

use super::aggregate::{AggregatedOutcome, LoopTermination};
use super::dispatcher::{DispatchMode, ReviewDispatcher};

/// Repeats dispatch + aggregate until convergence or the iteration cap
pub struct ConvergenceLoop<'a> {
    dispatcher: &'a ReviewDispatcher,
    max_iterations: u32,
    mode: DispatchMode,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<'a> ConvergenceLoop<'a> {
    /// Create a loop; a cap of zero is treated as one iteration
    pub fn new(dispatcher: &'a ReviewDispatcher, max_iterations: u32) -> Self {
        Self {
            dispatcher,
            max_iterations: max_iterations.max(1),
            mode: DispatchMode::default(),
            progress: None,
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref sink) = self.progress {
            sink.emit(event);
        }
    }

    pub async fn run(&self, snapshot: &FileSnapshot) -> Result<AggregatedOutcome> {
        let mut iteration = 0;

        loop {
            iteration += 1;
            self.emit(ProgressEvent::IterationStarted {
                iteration,
                max_iterations: self.max_iterations,
            });

            let verdicts = self.dispatcher.run_all(snapshot, self.mode).await?;
            let outcome = AggregatedOutcome::from_verdicts(verdicts);

            self.emit(ProgressEvent::IterationCompleted {
                iteration,
                max_iterations: self.max_iterations,
                status: outcome.overall_status,
                total_issues: outcome.total_issues,
            });

            if outcome.is_all_passing() {
                tracing::info!(iteration, "Review converged");
                return Ok(outcome.with_loop(iteration, self.max_iterations, LoopTermination::Converged));
            }

            if iteration >= self.max_iterations {
                tracing::warn!(
                    iteration,
                    total_issues = outcome.total_issues,
                    "Review did not converge within the iteration cap"
                );
                return Ok(outcome.with_loop(iteration, self.max_iterations, LoopTermination::Exhausted));
            }
        }
    }
}
