//! Per-issue fix pipeline
//!
//! Works through the pending queue one instruction at a time: render a
//! prompt, let the editor change files, run the validation gate. Every
//! instruction lands in exactly one bucket (applied, validation failed,
//! failed). Applied instructions are moved to the completed partition.

use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::agent::{render_editor, PromptContext};
use crate::budget::{BudgetLedger, BudgetSummary, EstimateComparison, Usage};
use crate::progress::{eta, format_duration, ProgressEvent, ProgressSink};
use crate::Result;

use super::conventions::{render_conventions, ConventionsLoader};
use super::extract::extract_error_message;
use super::gate::{Stage, Validator};
use super::instruction::{CorrectionInstruction, Priority};
use super::queue::{QueueStore, QueuedInstruction};

const PROGRESS_BAR_WIDTH: usize = 20;

/// What the editor reported for one instruction
#[derive(Debug, Clone, Default)]
pub struct EditResult {
    pub success: bool,
    /// Reply text on success, diagnostics on failure
    pub output: String,
    pub usage: Option<Usage>,
}

/// Collaborator that edits files in place to carry out one instruction
#[async_trait]
pub trait Editor: Send + Sync {
    async fn apply(&self, prompt: &str, affected_files: &[String]) -> Result<EditResult>;
}

/// The bucket an instruction ended in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum InstructionOutcome {
    /// Applied and every configured stage passed
    Applied,
    /// Applied, but a validation stage failed; the edit is kept
    ValidationFailed { stage: Stage, reason: String },
    /// The editor could not apply the instruction
    Failed { reason: String },
}

impl InstructionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InstructionOutcome::Applied => "applied",
            InstructionOutcome::ValidationFailed { .. } => "validation-failed",
            InstructionOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-instruction line of the report
#[derive(Debug, Clone, Serialize)]
pub struct InstructionReport {
    pub id: String,
    pub priority: Priority,
    pub category: String,
    pub outcome: InstructionOutcome,
    pub duration_ms: u64,
}

/// Run-level summary
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub total: usize,
    pub applied: usize,
    pub validation_failed: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub duration_ms: u64,
    pub budget: BudgetSummary,
    /// Present once authoritative usage was reported
    pub comparison: Option<EstimateComparison>,
    pub instructions: Vec<InstructionReport>,
}

impl PipelineReport {
    /// Plain-text summary; every bucket is listed even when empty
    pub fn render(&self) -> String {
        let mut out = String::new();
        let title = if self.dry_run {
            "Fix pipeline summary (dry run)"
        } else {
            "Fix pipeline summary"
        };
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "  Total:                {}", self.total);
        let _ = writeln!(out, "  Applied & validated:  {}", self.applied);
        let _ = writeln!(out, "  Validation failed:    {}", self.validation_failed);
        let _ = writeln!(out, "  Failed:               {}", self.failed);
        let _ = writeln!(
            out,
            "  Duration:             {}",
            format_duration(Duration::from_millis(self.duration_ms))
        );
        let _ = writeln!(
            out,
            "  Budget:               {} / {} units ({:.1}%)",
            self.budget.used_units, self.budget.cap_units, self.budget.percentage
        );
        if self.budget.cost > 0.0 {
            let _ = writeln!(out, "  Cost:                 ${:.4}", self.budget.cost);
        }
        if let Some(ref cmp) = self.comparison {
            let _ = writeln!(
                out,
                "  Estimate vs actual:   {} estimated / {} actual ({:+} units, {:.1}% accuracy)",
                cmp.estimated_units, cmp.actual_units, cmp.difference, cmp.accuracy_percent
            );
        }

        for item in &self.instructions {
            match item.outcome {
                InstructionOutcome::Applied => {}
                InstructionOutcome::ValidationFailed {
                    ref stage,
                    ref reason,
                } => {
                    let _ = writeln!(out, "  [{}] {} failed: {}", item.id, stage, reason);
                }
                InstructionOutcome::Failed { ref reason } => {
                    let _ = writeln!(out, "  [{}] not applied: {}", item.id, reason);
                }
            }
        }
        out
    }
}

/// Render the prompt for one instruction
pub fn render_fix_prompt(instruction: &CorrectionInstruction, conventions: &str) -> String {
    let context = if instruction.context().trim().is_empty() {
        "(none)".to_string()
    } else {
        instruction.context().to_string()
    };
    let ctx = PromptContext::new()
        .with("PRIORITY", instruction.priority().as_str())
        .with("CATEGORY", instruction.category())
        .with("INSTRUCTION", instruction.instruction())
        .with("CONTEXT", context)
        .with_files("AFFECTED_FILES", instruction.affected_files())
        .with("CONVENTIONS", conventions);
    render_editor(&ctx)
}

/// The sequential per-instruction pipeline
pub struct FixPipeline<'a> {
    queue: &'a QueueStore,
    editor: &'a dyn Editor,
    validator: &'a dyn Validator,
    conventions: &'a dyn ConventionsLoader,
    dry_run: bool,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<'a> FixPipeline<'a> {
    pub fn new(
        queue: &'a QueueStore,
        editor: &'a dyn Editor,
        validator: &'a dyn Validator,
        conventions: &'a dyn ConventionsLoader,
    ) -> Self {
        Self {
            queue,
            editor,
            validator,
            conventions,
            dry_run: false,
            progress: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
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

    fn load_conventions(&self) -> String {
        match self.conventions.load() {
            Ok(conventions) => render_conventions(&conventions),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conventions; continuing without them");
                String::new()
            }
        }
    }

    /// Process every pending instruction and build the run report
    pub async fn run(&self, ledger: &mut BudgetLedger) -> Result<PipelineReport> {
        let started = Instant::now();
        let items = self.queue.load_pending()?;
        let total = items.len();
        tracing::info!(total, dry_run = self.dry_run, "Starting fix pipeline");

        // Read once, on first use
        let mut conventions: Option<String> = None;
        let mut reports = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            let item_started = Instant::now();
            let conventions_text = conventions.get_or_insert_with(|| self.load_conventions());
            let prompt = render_fix_prompt(&item.instruction, conventions_text);

            let outcome = self.process(item, &prompt, ledger).await?;
            tracing::info!(id = %item.id, outcome = outcome.label(), "Instruction processed");

            let done = index + 1;
            self.emit(ProgressEvent::InstructionCompleted {
                index: done,
                total,
                id: item.id.clone(),
                outcome: outcome.label().to_string(),
                elapsed: started.elapsed(),
                eta: eta(started.elapsed(), done, total),
                budget_bar: ledger.progress_bar(PROGRESS_BAR_WIDTH),
            });

            reports.push(InstructionReport {
                id: item.id.clone(),
                priority: item.instruction.priority(),
                category: item.instruction.category().to_string(),
                outcome,
                duration_ms: item_started.elapsed().as_millis() as u64,
            });
        }

        let count = |label: &str| reports.iter().filter(|r| r.outcome.label() == label).count();
        let report = PipelineReport {
            total,
            applied: count("applied"),
            validation_failed: count("validation-failed"),
            failed: count("failed"),
            dry_run: self.dry_run,
            duration_ms: started.elapsed().as_millis() as u64,
            budget: ledger.summary(),
            comparison: ledger.comparison(),
            instructions: reports,
        };

        tracing::info!(
            total = report.total,
            applied = report.applied,
            validation_failed = report.validation_failed,
            failed = report.failed,
            "Fix pipeline finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        item: &QueuedInstruction,
        prompt: &str,
        ledger: &mut BudgetLedger,
    ) -> Result<InstructionOutcome> {
        if self.dry_run {
            tracing::info!(id = %item.id, "Dry run: not invoking editor");
            return Ok(InstructionOutcome::Applied);
        }

        ledger.add_estimated(prompt);
        let edit = match self
            .editor
            .apply(prompt, item.instruction.affected_files())
            .await
        {
            Ok(edit) => edit,
            Err(e) => {
                return Ok(InstructionOutcome::Failed {
                    reason: extract_error_message(&e.to_string()),
                });
            }
        };

        ledger.add_estimated(&edit.output);
        if let Some(ref usage) = edit.usage {
            ledger.add_actual(usage);
        }

        if !edit.success {
            return Ok(InstructionOutcome::Failed {
                reason: extract_error_message(&edit.output),
            });
        }

        let gate = self.validator.validate().await;
        match gate.failed {
            None => {
                // The edit stands even if the record cannot be moved
                if let Err(e) = self.queue.mark_completed(item) {
                    tracing::warn!(id = %item.id, error = %e, "Failed to mark instruction completed");
                }
                Ok(InstructionOutcome::Applied)
            }
            Some((stage, output)) => Ok(InstructionOutcome::ValidationFailed {
                stage,
                reason: extract_error_message(&output.output),
            }),
        }
    }
}
