//! Fix module: the fix-verify loop and the per-issue fix pipeline
//!
//! The fix-verify loop alternates parallel review with one combined fixer
//! call over an in-memory [`FileSnapshot`](crate::snapshot::FileSnapshot).
//! The pipeline applies persisted [`CorrectionInstruction`]s one at a time,
//! each followed by the lint, build and test gate.

pub mod agent;
pub mod conventions;
pub mod extract;
pub mod gate;
pub mod instruction;
pub mod pipeline;
pub mod queue;
pub mod reply;
pub mod verify_loop;

pub use agent::{AgentEditor, AgentFixer};
pub use conventions::{render_conventions, Convention, ConventionsLoader, FsConventions};
pub use extract::{extract_error_message, NO_OUTPUT};
pub use gate::{GateResult, ProjectKind, Stage, StageOutput, ValidationGate, Validator};
pub use instruction::{CorrectionInstruction, Priority, RawInstruction};
pub use pipeline::{
    render_fix_prompt, EditResult, Editor, FixPipeline, InstructionOutcome, InstructionReport,
    PipelineReport,
};
pub use queue::{QueueStore, QueuedInstruction};
pub use reply::{parse_reply, ParsedReply};
pub use verify_loop::{build_fix_payload, FixLoopConfig, FixLoopResult, FixVerifyLoop, Fixer, FixerReply};
