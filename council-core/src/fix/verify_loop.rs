//! Fix-verify loop: review, fix, re-review until convergence
//!
//! Each iteration reviews the current snapshot in parallel, stops on
//! convergence or when the issue count fails to go down (ties included),
//! then hands every issue to the fixer in one payload and replaces the
//! snapshot with whatever files the fixer returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::render_fixer;
use crate::budget::{BudgetLedger, Usage};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::review::{
    AggregatedOutcome, DispatchMode, Issue, LoopTermination, ReviewDispatcher,
};
use crate::snapshot::{render_file_blocks, FileSnapshot};
use crate::Result;

use super::reply::parse_reply;

/// A fixer's free-text answer to a combined payload
#[derive(Debug, Clone, Default)]
pub struct FixerReply {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Collaborator that turns a payload of issues and files into replacement blocks
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn fix(&self, payload: &str) -> Result<FixerReply>;
}

/// Loop settings
#[derive(Debug, Clone, Copy)]
pub struct FixLoopConfig {
    pub max_iterations: u32,
    /// Review only; never invoke the fixer
    pub dry_run: bool,
}

impl Default for FixLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            dry_run: false,
        }
    }
}

/// What a finished loop produced
#[derive(Debug, Clone)]
pub struct FixLoopResult {
    /// Outcome of the last review, annotated with iteration counts
    pub outcome: AggregatedOutcome,
    /// Snapshot after the last applied fix
    pub snapshot: FileSnapshot,
    /// Requested files the fixer did not return, summed over iterations
    pub unmatched_files: usize,
    pub fixer_calls: u32,
}

/// The fix-verify loop over one snapshot
pub struct FixVerifyLoop<'a> {
    dispatcher: &'a ReviewDispatcher,
    fixer: &'a dyn Fixer,
    config: FixLoopConfig,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<'a> FixVerifyLoop<'a> {
    pub fn new(dispatcher: &'a ReviewDispatcher, fixer: &'a dyn Fixer, config: FixLoopConfig) -> Self {
        Self {
            dispatcher,
            fixer,
            config: FixLoopConfig {
                max_iterations: config.max_iterations.max(1),
                ..config
            },
            progress: None,
        }
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

    pub async fn run(&self, snapshot: FileSnapshot, ledger: &mut BudgetLedger) -> Result<FixLoopResult> {
        let max_iterations = self.config.max_iterations;
        let mut current = snapshot;
        let mut last_issue_count = usize::MAX;
        let mut unmatched_files = 0;
        let mut fixer_calls = 0;
        let mut iteration = 0;

        let finish = |outcome: AggregatedOutcome,
                      snapshot: FileSnapshot,
                      iteration: u32,
                      termination: LoopTermination,
                      unmatched_files: usize,
                      fixer_calls: u32| {
            tracing::info!(iteration, %termination, total_issues = outcome.total_issues, "Fix loop finished");
            FixLoopResult {
                outcome: outcome.with_loop(iteration, max_iterations, termination),
                snapshot,
                unmatched_files,
                fixer_calls,
            }
        };

        loop {
            iteration += 1;
            self.emit(ProgressEvent::IterationStarted {
                iteration,
                max_iterations,
            });

            let verdicts = self
                .dispatcher
                .run_all(&current, DispatchMode::Parallel)
                .await?;
            let outcome = AggregatedOutcome::from_verdicts(verdicts);

            self.emit(ProgressEvent::IterationCompleted {
                iteration,
                max_iterations,
                status: outcome.overall_status,
                total_issues: outcome.total_issues,
            });

            if outcome.is_all_passing() {
                return Ok(finish(outcome, current, iteration, LoopTermination::Converged, unmatched_files, fixer_calls));
            }

            let current_issue_count = outcome.total_issues;
            if current_issue_count >= last_issue_count {
                tracing::warn!(
                    iteration,
                    current_issue_count,
                    last_issue_count,
                    "Issue count did not go down"
                );
                return Ok(finish(outcome, current, iteration, LoopTermination::NoProgress, unmatched_files, fixer_calls));
            }
            last_issue_count = current_issue_count;

            if ledger.is_exhausted() {
                tracing::warn!(iteration, used = ledger.used_units(), cap = ledger.cap_units(), "Budget exhausted");
                return Ok(finish(outcome, current, iteration, LoopTermination::BudgetExhausted, unmatched_files, fixer_calls));
            }

            if self.config.dry_run {
                tracing::info!(iteration, "Dry run: skipping fixer");
            } else if current_issue_count == 0 {
                tracing::debug!(iteration, "No issues to hand to the fixer");
            } else {
                let (payload, requested) = build_fix_payload(&outcome, &current);
                ledger.add_estimated(&payload);
                fixer_calls += 1;

                match self.fixer.fix(&payload).await {
                    Ok(reply) => {
                        ledger.add_estimated(&reply.text);
                        if let Some(ref usage) = reply.usage {
                            ledger.add_actual(usage);
                        }
                        let parsed = parse_reply(&reply.text, &requested);
                        unmatched_files += parsed.unmatched();
                        if parsed.is_empty() {
                            tracing::warn!(iteration, "Fixer reply had no usable file blocks");
                        } else {
                            tracing::info!(iteration, files = parsed.files.len(), "Applying fixer edits");
                        }
                        current = current.replaced(&parsed.files);
                    }
                    Err(e) => {
                        // Treated like an empty reply; the next review decides
                        tracing::warn!(iteration, error = %e, "Fixer invocation failed");
                        unmatched_files += requested.len();
                    }
                }
            }

            if iteration >= max_iterations {
                return Ok(finish(outcome, current, iteration, LoopTermination::Exhausted, unmatched_files, fixer_calls));
            }
        }
    }
}

/// Render the fixer payload: issues grouped by file (path order; severity
/// then line within a file) followed by the current content of just those
/// files. Returns the payload and the paths whose content was sent.
pub fn build_fix_payload(outcome: &AggregatedOutcome, snapshot: &FileSnapshot) -> (String, Vec<String>) {
    let mut groups: BTreeMap<&str, Vec<(&Issue, &str)>> = BTreeMap::new();
    for verdict in &outcome.verdicts {
        for issue in verdict.issues() {
            groups
                .entry(issue.file())
                .or_default()
                .push((issue, verdict.collaborator()));
        }
    }

    let mut issues_text = String::new();
    for (file, issues) in groups.iter_mut() {
        issues.sort_by_key(|(issue, _)| (issue.severity(), issue.line()));
        issues_text.push_str(&format!("### {}\n\n", file));
        for (issue, collaborator) in issues.iter() {
            issues_text.push_str(&format!(
                "- [{}] line {} ({}): {}\n",
                issue.severity(),
                issue.line(),
                collaborator,
                issue.message()
            ));
            if let Some(fix) = issue.suggested_fix() {
                issues_text.push_str(&format!("  Suggested fix: {}\n", fix));
            }
        }
        issues_text.push('\n');
    }

    let affected: Vec<_> = snapshot
        .entries()
        .iter()
        .filter(|e| groups.contains_key(e.path.as_str()))
        .collect();
    let requested = affected.iter().map(|e| e.path.clone()).collect();
    let files_text = render_file_blocks(affected.into_iter());

    (render_fixer(&issues_text, &files_text), requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingProgress;
    use crate::review::dispatcher::testing::ScriptedReviewer;
    use crate::review::{ReviewStatus, ReviewVerdict, Severity};
    use crate::snapshot::FileEntry;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixer that always gives the same reply
    struct StubFixer {
        reply: String,
        usage: Option<Usage>,
        calls: AtomicUsize,
    }

    impl StubFixer {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                usage: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fixer for StubFixer {
        async fn fix(&self, _payload: &str) -> Result<FixerReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FixerReply {
                text: self.reply.clone(),
                usage: self.usage,
            })
        }
    }

    struct BrokenFixer;

    #[async_trait]
    impl Fixer for BrokenFixer {
        async fn fix(&self, _payload: &str) -> Result<FixerReply> {
            Err(Error::Agent("fixer crashed".to_string()))
        }
    }

    fn snapshot() -> FileSnapshot {
        FileSnapshot::new(vec![
            FileEntry::new("src/lib.rs", "fn broken() {}\n"),
            FileEntry::new("src/other.rs", "fn other() {}\n"),
        ])
    }

    #[tokio::test]
    async fn test_fails_once_then_passes() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 1), (ReviewStatus::Pass, 0)]));
        let fixer = StubFixer::new("<file path=\"src/lib.rs\">\nfn fixed() {}\n</file>");
        let mut ledger = BudgetLedger::new(1_000_000);

        let result = FixVerifyLoop::new(&dispatcher, &fixer, FixLoopConfig::default())
            .run(snapshot(), &mut ledger)
            .await
            .unwrap();

        assert_eq!(result.outcome.overall_status, ReviewStatus::Pass);
        assert_eq!(result.outcome.iterations, Some(2));
        assert_eq!(result.outcome.termination, Some(LoopTermination::Converged));
        assert_eq!(result.snapshot.get("src/lib.rs"), Some("fn fixed() {}\n"));
        assert_eq!(result.snapshot.get("src/other.rs"), Some("fn other() {}\n"));
        assert_eq!(result.unmatched_files, 0);
        assert!(ledger.used_units() > 0);
    }

    #[tokio::test]
    async fn test_same_issue_stops_after_two_iterations() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 1)]));
        let fixer = StubFixer::new("I could not fix it.");
        let mut ledger = BudgetLedger::new(1_000_000);

        let result = FixVerifyLoop::new(
            &dispatcher,
            &fixer,
            FixLoopConfig {
                max_iterations: 10,
                dry_run: false,
            },
        )
        .run(snapshot(), &mut ledger)
        .await
        .unwrap();

        assert_eq!(result.outcome.iterations, Some(2));
        assert_eq!(result.outcome.max_iterations, Some(10));
        assert_eq!(result.outcome.termination, Some(LoopTermination::NoProgress));
        assert_eq!(fixer.calls(), 1);
        assert_eq!(result.unmatched_files, 1);
        assert_eq!(result.snapshot, snapshot());
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_fixer() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 2)]));
        let fixer = StubFixer::new("");
        let mut ledger = BudgetLedger::new(1_000_000);

        let result = FixVerifyLoop::new(
            &dispatcher,
            &fixer,
            FixLoopConfig {
                max_iterations: 5,
                dry_run: true,
            },
        )
        .run(snapshot(), &mut ledger)
        .await
        .unwrap();

        assert_eq!(result.outcome.iterations, Some(2));
        assert_eq!(result.outcome.termination, Some(LoopTermination::NoProgress));
        assert_eq!(fixer.calls(), 0);
        assert_eq!(ledger.used_units(), 0);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let dispatcher = ReviewDispatcher::new().with_reviewer(ScriptedReviewer::new(
            "qa",
            vec![(ReviewStatus::Fail, 5), (ReviewStatus::Fail, 4), (ReviewStatus::Fail, 3)],
        ));
        let fixer = StubFixer::new("");
        let mut ledger = BudgetLedger::new(1_000_000);

        let result = FixVerifyLoop::new(
            &dispatcher,
            &fixer,
            FixLoopConfig {
                max_iterations: 2,
                dry_run: false,
            },
        )
        .run(snapshot(), &mut ledger)
        .await
        .unwrap();

        assert_eq!(result.outcome.iterations, Some(2));
        assert_eq!(result.outcome.total_issues, 4);
        assert_eq!(result.outcome.termination, Some(LoopTermination::Exhausted));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_stops_loop() {
        let dispatcher = ReviewDispatcher::new().with_reviewer(ScriptedReviewer::new(
            "qa",
            vec![(ReviewStatus::Fail, 3), (ReviewStatus::Fail, 2)],
        ));
        let mut fixer = StubFixer::new("");
        fixer.usage = Some(Usage {
            input_units: 40,
            output_units: 10,
            ..Default::default()
        });
        let mut ledger = BudgetLedger::new(10);

        let result = FixVerifyLoop::new(&dispatcher, &fixer, FixLoopConfig::default())
            .run(snapshot(), &mut ledger)
            .await
            .unwrap();

        assert_eq!(result.outcome.iterations, Some(2));
        assert_eq!(result.outcome.termination, Some(LoopTermination::BudgetExhausted));
        assert_eq!(fixer.calls(), 1);
        assert_eq!(ledger.used_units(), 50);
    }

    #[tokio::test]
    async fn test_fixer_error_is_a_no_op() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 1)]));
        let mut ledger = BudgetLedger::new(1_000_000);

        let result = FixVerifyLoop::new(&dispatcher, &BrokenFixer, FixLoopConfig::default())
            .run(snapshot(), &mut ledger)
            .await
            .unwrap();

        assert_eq!(result.outcome.termination, Some(LoopTermination::NoProgress));
        assert_eq!(result.snapshot, snapshot());
    }

    #[tokio::test]
    async fn test_progress_per_iteration() {
        let progress = Arc::new(RecordingProgress::default());
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 1)]));
        let fixer = StubFixer::new("");
        let mut ledger = BudgetLedger::new(1_000_000);

        FixVerifyLoop::new(&dispatcher, &fixer, FixLoopConfig::default())
            .with_progress(progress.clone())
            .run(snapshot(), &mut ledger)
            .await
            .unwrap();

        let iterations = progress
            .events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::IterationCompleted { .. }))
            .count();
        assert_eq!(iterations, 2);
    }

    #[test]
    fn test_payload_ordering() {
        let issue = |sev, file: &str, line| Issue::new(sev, file, line, format!("{}:{}", file, line)).unwrap();
        let verdicts = vec![
            ReviewVerdict::new(
                "librarian",
                ReviewStatus::Warn,
                vec![issue(Severity::Suggestion, "src/lib.rs", 1), issue(Severity::Warning, "src/lib.rs", 9)],
                "",
            )
            .unwrap(),
            ReviewVerdict::new(
                "warden",
                ReviewStatus::Fail,
                vec![issue(Severity::Error, "src/lib.rs", 20), issue(Severity::Error, "src/missing.rs", 3)],
                "",
            )
            .unwrap(),
        ];
        let outcome = AggregatedOutcome::from_verdicts(verdicts);

        let (payload, requested) = build_fix_payload(&outcome, &snapshot());
        assert_eq!(requested, vec!["src/lib.rs".to_string()]);

        let error = payload.find("line 20 (warden)").unwrap();
        let warning = payload.find("line 9 (librarian)").unwrap();
        let suggestion = payload.find("line 1 (librarian)").unwrap();
        assert!(error < warning && warning < suggestion);

        let lib = payload.find("### src/lib.rs").unwrap();
        let missing = payload.find("### src/missing.rs").unwrap();
        assert!(lib < missing);

        assert!(payload.contains("<file path=\"src/lib.rs\">\nfn broken() {}\n</file>"));
        assert!(!payload.contains("<file path=\"src/other.rs\">"));
    }
}
