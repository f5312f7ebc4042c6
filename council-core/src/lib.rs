//! Council Core - Core library for multi-reviewer convergence
//!
//! This crate runs a council of reviewer collaborators over a set of files,
//! aggregates their verdicts, and drives two fixing strategies: a
//! fix-verify loop over an in-memory snapshot and a per-issue pipeline
//! gated by lint, build and test.

pub mod agent;
pub mod budget;
pub mod config;
pub mod error;
pub mod fix;
pub mod git;
pub mod progress;
pub mod review;
pub mod snapshot;

pub use agent::{AgentHandle, AgentRun, Backend, ClaudeBackend, Persona};
pub use budget::{BudgetLedger, BudgetSummary, EstimateComparison, Usage};
pub use config::Config;
pub use error::{Error, Result, ValidationError};
pub use fix::{
    CorrectionInstruction, FixPipeline, FixVerifyLoop, PipelineReport, Priority, QueueStore,
    ValidationGate,
};
pub use git::GitRepo;
pub use progress::{ProgressEvent, ProgressSink, TracingProgress};
pub use review::{
    AggregatedOutcome, ConvergenceLoop, Issue, LoopTermination, ReviewDispatcher, ReviewStatus,
    ReviewVerdict, Reviewer, Severity,
};
pub use snapshot::{FileEntry, FileSnapshot};
