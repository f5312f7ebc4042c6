//! Reduction of verdict lists into a single outcome

use serde::{Deserialize, Serialize};
use std::fmt;

use super::verdict::{ReviewStatus, ReviewVerdict};

/// Why a review or fix loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopTermination {
    /// Every collaborator reported pass
    Converged,
    /// The iteration cap was reached
    Exhausted,
    /// The issue count did not go down between iterations
    NoProgress,
    /// The budget ledger reached its cap
    BudgetExhausted,
}

impl fmt::Display for LoopTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopTermination::Converged => "converged",
            LoopTermination::Exhausted => "exhausted",
            LoopTermination::NoProgress => "no-progress",
            LoopTermination::BudgetExhausted => "budget-exhausted",
        };
        write!(f, "{}", s)
    }
}

/// Summary of a list of verdicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedOutcome {
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub total_issues: usize,
    pub overall_status: ReviewStatus,
    pub verdicts: Vec<ReviewVerdict>,
    /// Set when produced by a loop
    pub iterations: Option<u32>,
    pub max_iterations: Option<u32>,
    pub termination: Option<LoopTermination>,
}

impl AggregatedOutcome {
    /// Aggregate a verdict list; an empty list is a pass with zero counts
    pub fn from_verdicts(verdicts: Vec<ReviewVerdict>) -> Self {
        let mut passed = 0;
        let mut warned = 0;
        let mut failed = 0;
        let mut total_issues = 0;

        for verdict in &verdicts {
            match verdict.status() {
                ReviewStatus::Pass => passed += 1,
                ReviewStatus::Warn => warned += 1,
                ReviewStatus::Fail => failed += 1,
            }
            total_issues += verdict.issues().len();
        }

        let overall_status = if failed > 0 {
            ReviewStatus::Fail
        } else if warned > 0 {
            ReviewStatus::Warn
        } else {
            ReviewStatus::Pass
        };

        Self {
            passed,
            warned,
            failed,
            total_issues,
            overall_status,
            verdicts,
            iterations: None,
            max_iterations: None,
            termination: None,
        }
    }

    /// Annotate with loop bookkeeping
    pub fn with_loop(mut self, iterations: u32, max_iterations: u32, termination: LoopTermination) -> Self {
        self.iterations = Some(iterations);
        self.max_iterations = Some(max_iterations);
        self.termination = Some(termination);
        self
    }

    /// True iff every verdict passed
    pub fn is_all_passing(&self) -> bool {
        is_all_passing(&self.verdicts)
    }
}

/// True iff every verdict in the list has status pass
pub fn is_all_passing(verdicts: &[ReviewVerdict]) -> bool {
    verdicts.iter().all(|v| v.status().is_pass())
}

/// Sum of issue counts across verdicts
pub fn total_issues(verdicts: &[ReviewVerdict]) -> usize {
    verdicts.iter().map(|v| v.issues().len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::verdict::{Issue, Severity};

    fn verdict(name: &str, status: ReviewStatus, issues: usize) -> ReviewVerdict {
        let issues = (0..issues)
            .map(|i| Issue::new(Severity::Warning, "src/lib.rs", i as u32, "finding").unwrap())
            .collect();
        ReviewVerdict::new(name, status, issues, "").unwrap()
    }

    #[test]
    fn test_empty_is_pass() {
        let outcome = AggregatedOutcome::from_verdicts(vec![]);
        assert_eq!(outcome.overall_status, ReviewStatus::Pass);
        assert_eq!(outcome.total_issues, 0);
        assert_eq!(outcome.passed + outcome.warned + outcome.failed, 0);
        assert!(outcome.is_all_passing());
    }

    #[test]
    fn test_warn_without_fail() {
        let outcome = AggregatedOutcome::from_verdicts(vec![
            verdict("qa", ReviewStatus::Pass, 0),
            verdict("architect", ReviewStatus::Warn, 2),
            verdict("librarian", ReviewStatus::Pass, 1),
        ]);
        assert_eq!(outcome.overall_status, ReviewStatus::Warn);
        assert_eq!(outcome.total_issues, 3);
        assert_eq!(outcome.passed, 2);
        assert_eq!(outcome.warned, 1);
        assert!(!outcome.is_all_passing());
    }

    #[test]
    fn test_any_fail_wins() {
        let outcome = AggregatedOutcome::from_verdicts(vec![
            verdict("qa", ReviewStatus::Warn, 1),
            verdict("warden", ReviewStatus::Fail, 1),
        ]);
        assert_eq!(outcome.overall_status, ReviewStatus::Fail);
        assert_eq!(outcome.failed, 1);
    }

    #[test]
    fn test_order_independent() {
        let a = AggregatedOutcome::from_verdicts(vec![
            verdict("a", ReviewStatus::Fail, 1),
            verdict("b", ReviewStatus::Pass, 0),
        ]);
        let b = AggregatedOutcome::from_verdicts(vec![
            verdict("b", ReviewStatus::Pass, 0),
            verdict("a", ReviewStatus::Fail, 1),
        ]);
        assert_eq!(a.overall_status, b.overall_status);
        assert_eq!(a.total_issues, b.total_issues);
    }

    #[test]
    fn test_with_loop() {
        let outcome = AggregatedOutcome::from_verdicts(vec![]).with_loop(2, 5, LoopTermination::Converged);
        assert_eq!(outcome.iterations, Some(2));
        assert_eq!(outcome.max_iterations, Some(5));
        assert_eq!(outcome.termination, Some(LoopTermination::Converged));
    }
}
