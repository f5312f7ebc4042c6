//! Agent module for spawning Claude Code collaborators and parsing their output

mod backend;
mod output;
mod prompts;
mod spawn;

pub use backend::{AgentRun, Backend, ClaudeBackend};
pub use output::{
    CollectingHandler, CostInfo, OutputStreamer, ResultSummary, StreamHandler, StreamMessage,
};
pub use prompts::{
    render_editor, render_fixer, render_review, render_template, Persona, PromptContext,
};
pub use spawn::AgentHandle;
