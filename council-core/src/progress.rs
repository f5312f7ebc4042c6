//! Progress events emitted by the dispatcher, the loops and the fix pipeline

use std::time::Duration;

use crate::review::ReviewStatus;

/// A progress notification
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    CollaboratorStarted {
        name: String,
    },
    CollaboratorCompleted {
        name: String,
        status: ReviewStatus,
        issues: usize,
    },
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
    },
    IterationCompleted {
        iteration: u32,
        max_iterations: u32,
        status: ReviewStatus,
        total_issues: usize,
    },
    InstructionCompleted {
        index: usize,
        total: usize,
        id: String,
        outcome: String,
        elapsed: Duration,
        eta: Duration,
        budget_bar: String,
    },
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CollaboratorStarted { name } => {
                tracing::info!(collaborator = %name, "Collaborator started");
            }
            ProgressEvent::CollaboratorCompleted {
                name,
                status,
                issues,
            } => {
                tracing::info!(collaborator = %name, %status, issues, "Collaborator completed");
            }
            ProgressEvent::IterationStarted {
                iteration,
                max_iterations,
            } => {
                tracing::info!(iteration, max_iterations, "Iteration started");
            }
            ProgressEvent::IterationCompleted {
                iteration,
                max_iterations,
                status,
                total_issues,
            } => {
                tracing::info!(
                    iteration,
                    max_iterations,
                    %status,
                    total_issues,
                    "Iteration completed"
                );
            }
            ProgressEvent::InstructionCompleted {
                index,
                total,
                id,
                outcome,
                elapsed,
                eta,
                budget_bar,
            } => {
                tracing::info!(
                    index,
                    total,
                    %id,
                    %outcome,
                    elapsed = %format_duration(elapsed),
                    eta = %format_duration(eta),
                    budget = %budget_bar,
                    "Instruction completed"
                );
            }
        }
    }
}

/// Render a duration as `1h 02m`, `3m 05s` or `12s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Remaining-time estimate: average time per finished item times the items left
pub fn eta(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let remaining = total.saturating_sub(done) as u32;
    let average = elapsed / done as u32;
    average * remaining
}
