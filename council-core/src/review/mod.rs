//! Review module: verdicts, dispatch, aggregation and the review-only loop
//!
//! Reviewers are registered with a [`ReviewDispatcher`] by name and run
//! against a [`FileSnapshot`](crate::snapshot::FileSnapshot) either one at a
//! time or all at once. Their verdicts reduce to an [`AggregatedOutcome`].

pub mod agent_reviewer;
pub mod aggregate;
pub mod convergence;
pub mod dispatcher;
pub mod report;
pub mod verdict;

pub use agent_reviewer::{parse_verdict, AgentReviewer, NO_ISSUES_SENTINEL};
pub use aggregate::{is_all_passing, total_issues, AggregatedOutcome, LoopTermination};
pub use convergence::ConvergenceLoop;
pub use dispatcher::{DispatchMode, ReviewDispatcher, Reviewer};
pub use report::{render_markdown, REPORT_FILE};
pub use verdict::{Issue, RawIssue, ReviewStatus, ReviewVerdict, Severity};
